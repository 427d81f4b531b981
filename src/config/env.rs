use super::{ConfigBuilder, ConfigError};
use serde::Deserialize;
use std::time::Duration;

/// Intermediate structure for deserializing environment variables
///
/// Environment variable `LTI_BRIDGE_FOO_BAR` deserializes in to struct member `foo_bar`. These
/// vars have high precendence and must be prefixed to avoid collisions.
#[derive(Deserialize)]
pub struct EnvConfig {
    listen_ip: Option<String>,
    listen_port: Option<u16>,
    data_dir: Option<String>,

    login_url: Option<String>,
    host_login_url: Option<String>,
    login_redirect_url: Option<String>,
    allowed_target_root: Option<String>,

    session_ttl: Option<u64>,
    session_cookie_name: Option<String>,
    session_cookie_secure: Option<bool>,
    max_body_size: Option<usize>,

    redis_url: Option<String>,
    memory_storage: Option<bool>,
}

const PREFIX: &str = "LTI_BRIDGE_";

impl EnvConfig {
    pub fn parse_and_apply(builder: &mut ConfigBuilder) -> Result<(), ConfigError> {
        let parsed: EnvConfig = envy::prefixed(PREFIX).from_env()?;
        Self::apply(parsed, builder);
        Ok(())
    }

    fn apply(parsed: EnvConfig, builder: &mut ConfigBuilder) {
        if let Some(val) = parsed.listen_ip {
            builder.listen_ip = val;
        }
        if let Some(val) = parsed.listen_port {
            builder.listen_port = val;
        }
        if let Some(val) = parsed.data_dir {
            builder.data_dir = val;
        }

        if let Some(val) = parsed.login_url {
            builder.login_url = val;
        }
        if let Some(val) = parsed.host_login_url {
            builder.host_login_url = val;
        }
        if let Some(val) = parsed.login_redirect_url {
            builder.login_redirect_url = val;
        }
        if let Some(val) = parsed.allowed_target_root {
            builder.allowed_target_root = val;
        }

        if let Some(val) = parsed.session_ttl {
            builder.session_ttl = Duration::from_secs(val);
        }
        if let Some(val) = parsed.session_cookie_name {
            builder.session_cookie_name = val;
        }
        if let Some(val) = parsed.session_cookie_secure {
            builder.session_cookie_secure = val;
        }
        if let Some(val) = parsed.max_body_size {
            builder.max_body_size = val;
        }

        // Environment takes precedence, so a store chosen here replaces one from the file.
        if let Some(val) = parsed.redis_url {
            builder.redis_url = Some(val);
            builder.memory_storage = false;
        }
        if let Some(val) = parsed.memory_storage {
            builder.memory_storage = val;
            if val {
                builder.redis_url = None;
            }
        }
    }
}
