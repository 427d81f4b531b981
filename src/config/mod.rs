mod env;
mod templates;
mod toml;

pub use self::templates::{Template, Templates};

use self::env::EnvConfig;
use self::toml::TomlConfig;
use crate::agents::{self, StoreSender};
use crate::handlers::bridge::ResumeBridge;
use crate::pipeline::Pipeline;
use crate::utils::{agent::spawn_agent, SecureRandom};
use std::{env::var as env_var, io::Error as IoError, path::Path, sync::Arc, time::Duration};
use thiserror::Error;

/// Union of all possible error types seen while parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Custom(String),
    #[error("IO error: {0}")]
    Io(#[from] IoError),
    #[error("TOML error: {0}")]
    Toml(#[from] ::toml::de::Error),
    #[error("environment error: {0}")]
    Env(#[from] ::envy::Error),
    #[error("template error in {0}: {1}")]
    Template(String, mustache::Error),
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

impl From<&'static str> for ConfigError {
    fn from(message: &'static str) -> Self {
        ConfigError::Custom(message.to_owned())
    }
}

pub type ConfigRc = Arc<Config>;

pub struct Config {
    pub listen_ip: String,
    pub listen_port: u16,

    /// Login endpoint that receives the relayed LTI launch.
    pub login_url: String,
    /// Login page for unauthenticated visitors of the continuation endpoint.
    pub host_login_url: String,
    /// Where a completed login goes when no pipeline step intervenes.
    pub login_redirect_url: String,
    /// Replay targets must be at or below this path. Never has a trailing slash.
    pub allowed_target_root: String,

    pub session_ttl: Duration,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,
    pub max_body_size: usize,

    pub store: Arc<dyn StoreSender>,
    pub pipeline: Pipeline,
    pub templates: Templates,
    pub rng: SecureRandom,
}

/// Store configuration is first translated into this intermediate enum.
enum StoreConfig {
    #[cfg(feature = "redis")]
    Redis(String),
    Memory,
}

impl StoreConfig {
    fn from_options(redis_url: Option<String>, memory_storage: bool) -> Result<Self, ConfigError> {
        match (redis_url, memory_storage) {
            #[cfg(feature = "redis")]
            (Some(redis_url), false) => Ok(StoreConfig::Redis(redis_url)),
            #[cfg(not(feature = "redis"))]
            (Some(_), false) => {
                Err("Redis storage requested, but this build does not support it.".into())
            }

            (None, true) => Ok(StoreConfig::Memory),

            (None, false) => Err("Must specify one of redis_url or memory_storage".into()),

            (Some(_), true) => Err("Can only specify one of redis_url or memory_storage".into()),
        }
    }

    async fn spawn_store(self, session_ttl: Duration) -> Result<Arc<dyn StoreSender>, ConfigError> {
        match self {
            #[cfg(feature = "redis")]
            StoreConfig::Redis(redis_url) => {
                let store = agents::RedisStore::new(redis_url, session_ttl).await?;
                Ok(Arc::new(spawn_agent(store).await))
            }
            StoreConfig::Memory => {
                let store = agents::MemoryStore::new(session_ttl);
                Ok(Arc::new(spawn_agent(store).await))
            }
        }
    }
}

pub struct ConfigBuilder {
    pub listen_ip: String,
    pub listen_port: u16,
    pub data_dir: String,

    pub login_url: String,
    pub host_login_url: String,
    pub login_redirect_url: String,
    pub allowed_target_root: String,

    pub session_ttl: Duration,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,
    pub max_body_size: usize,

    pub redis_url: Option<String>,
    pub memory_storage: bool,
}

impl ConfigBuilder {
    pub fn new() -> ConfigBuilder {
        ConfigBuilder {
            listen_ip: "127.0.0.1".to_owned(),
            listen_port: 3333,
            data_dir: String::new(),

            login_url: "/auth/login/lti/".to_owned(),
            host_login_url: "/login".to_owned(),
            login_redirect_url: "/".to_owned(),
            allowed_target_root: "/lti_provider".to_owned(),

            session_ttl: Duration::from_secs(1_209_600),
            session_cookie_name: "sessionid".to_owned(),
            session_cookie_secure: false,
            max_body_size: 65_536,

            redis_url: None,
            memory_storage: false,
        }
    }

    pub fn update_from_file(&mut self, path: &Path) -> Result<&mut ConfigBuilder, ConfigError> {
        TomlConfig::parse_and_apply(path, self)?;
        Ok(self)
    }

    pub fn update_from_common_env(&mut self) -> &mut ConfigBuilder {
        if let Some(port) = env_var("PORT").ok().and_then(|s| s.parse().ok()) {
            // If $PORT is set, also bind to 0.0.0.0. Common PaaS convention.
            self.listen_ip = "0.0.0.0".to_owned();
            self.listen_port = port;
        }

        for var in &[
            "REDISTOGO_URL",
            "REDISGREEN_URL",
            "REDISCLOUD_URL",
            "REDIS_URL",
            "OPENREDIS_URL",
        ] {
            if let Ok(val) = env_var(var) {
                self.redis_url = Some(val);
                break;
            }
        }

        self
    }

    pub fn update_from_bridge_env(&mut self) -> Result<&mut ConfigBuilder, ConfigError> {
        EnvConfig::parse_and_apply(self)?;
        Ok(self)
    }

    /// Check settings that don't need any IO.
    fn validate(&mut self) -> Result<(), ConfigError> {
        if !self.allowed_target_root.starts_with('/') {
            return Err("allowed_target_root must be an absolute path".into());
        }
        if self.allowed_target_root.contains("..") || self.allowed_target_root.contains("://") {
            return Err("allowed_target_root must be a plain path".into());
        }
        self.allowed_target_root = self.allowed_target_root.trim_end_matches('/').to_owned();

        if self.login_url.is_empty() {
            return Err("login_url must not be empty".into());
        }
        if self.host_login_url.is_empty() {
            return Err("host_login_url must not be empty".into());
        }

        let cookie_name_ok = !self.session_cookie_name.is_empty()
            && self
                .session_cookie_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !cookie_name_ok {
            return Err("session_cookie_name may only contain letters, digits, '-' and '_'".into());
        }

        if self.session_ttl.as_secs() == 0 {
            return Err("session_ttl must be at least one second".into());
        }

        Ok(())
    }

    pub async fn done(mut self) -> Result<Config, ConfigError> {
        self.validate()?;
        let store_config = StoreConfig::from_options(self.redis_url, self.memory_storage)?;

        #[cfg(feature = "insecure")]
        {
            log::warn!("INSECURE BUILD: {} logs in any LTI user_id!", self.login_url);
            log::warn!("Never use this build in production.");
        }

        let templates = Templates::new(&self.data_dir)?;
        let rng = SecureRandom::new().await;
        let store = store_config.spawn_store(self.session_ttl).await?;

        let mut pipeline = Pipeline::new();
        pipeline.register(ResumeBridge);

        Ok(Config {
            listen_ip: self.listen_ip,
            listen_port: self.listen_port,

            login_url: self.login_url,
            host_login_url: self.host_login_url,
            login_redirect_url: self.login_redirect_url,
            allowed_target_root: self.allowed_target_root,

            session_ttl: self.session_ttl,
            session_cookie_name: self.session_cookie_name,
            session_cookie_secure: self.session_cookie_secure,
            max_body_size: self.max_body_size,

            store,
            pipeline,
            templates,
            rng,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl ConfigBuilder {
    /// Builder for a config usable in tests, with templates from the source tree.
    pub fn for_tests() -> ConfigBuilder {
        let mut builder = ConfigBuilder::new();
        builder.data_dir = env!("CARGO_MANIFEST_DIR").to_owned();
        builder.memory_storage = true;
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_with_defaults() {
        let config = ConfigBuilder::for_tests().done().await.expect("config failed");
        assert_eq!(config.login_url, "/auth/login/lti/");
        assert_eq!(config.host_login_url, "/login");
        assert_eq!(config.allowed_target_root, "/lti_provider");
        assert_eq!(config.session_cookie_name, "sessionid");
        assert_eq!(config.login_redirect_url, "/");
    }

    #[tokio::test]
    async fn normalizes_target_root() {
        let mut builder = ConfigBuilder::for_tests();
        builder.allowed_target_root = "/tools/".to_owned();
        let config = builder.done().await.expect("config failed");
        assert_eq!(config.allowed_target_root, "/tools");

        let mut builder = ConfigBuilder::for_tests();
        builder.allowed_target_root = "/".to_owned();
        let config = builder.done().await.expect("config failed");
        assert_eq!(config.allowed_target_root, "");
    }

    #[test]
    fn rejects_bad_settings() {
        let mut builder = ConfigBuilder::for_tests();
        builder.allowed_target_root = "lti_provider".to_owned();
        assert!(builder.validate().is_err());

        let mut builder = ConfigBuilder::for_tests();
        builder.allowed_target_root = "/lti_provider/../admin".to_owned();
        assert!(builder.validate().is_err());

        let mut builder = ConfigBuilder::for_tests();
        builder.session_cookie_name = "session id".to_owned();
        assert!(builder.validate().is_err());

        let mut builder = ConfigBuilder::for_tests();
        builder.login_url = String::new();
        assert!(builder.validate().is_err());
    }

    #[test]
    fn requires_exactly_one_store() {
        assert!(StoreConfig::from_options(None, false).is_err());
        assert!(StoreConfig::from_options(Some("redis://localhost".to_owned()), true).is_err());
        assert!(matches!(
            StoreConfig::from_options(None, true),
            Ok(StoreConfig::Memory)
        ));
    }
}
