use crate::agents::*;
use crate::utils::agent::*;
use ::redis::{
    aio::MultiplexedConnection as RedisConn, AsyncCommands, Client as RedisClient, ErrorKind,
    IntoConnectionInfo, RedisResult,
};
use std::time::Duration;

/// Store implementation using Redis.
pub struct RedisStore {
    /// The connection.
    conn: RedisConn,
    /// TTL of sessions
    expire_sessions: Duration,
}

impl RedisStore {
    pub async fn new(url: String, expire_sessions: Duration) -> RedisResult<Self> {
        let url = Self::normalize_url(url)?;
        let info = url.as_str().into_connection_info()?;
        let conn = RedisClient::open(info)?
            .get_multiplexed_tokio_connection()
            .await?;

        log::warn!("Storing sessions in Redis at {}", url);
        log::warn!("Please always double check this Redis and the connection to it are secure!");
        log::warn!("(This warning can't be fixed; it's a friendly reminder.)");

        Ok(RedisStore {
            conn,
            expire_sessions,
        })
    }

    /// Add the `redis://` scheme where missing. TLS connections are not supported by this
    /// build, so `rediss://` is refused up front.
    fn normalize_url(url: String) -> RedisResult<String> {
        if url.starts_with("rediss://") {
            Err((
                ErrorKind::InvalidClientConfig,
                "TLS connections to Redis (rediss://) are not supported",
            )
                .into())
        } else if let Some(rest) = url.strip_prefix("http://") {
            Ok(format!("redis://{}", rest))
        } else if url.starts_with("redis://") {
            Ok(url)
        } else {
            Ok(format!("redis://{}", url))
        }
    }

    fn format_session_key(session_id: &str) -> String {
        format!("lti_bridge:session:{}", session_id)
    }
}

impl Agent for RedisStore {
    fn started(&mut self, cx: Context<Self, AgentStarted>) {
        // Ping Redis at an interval.
        let mut conn = self.conn.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(20));
            // Ignore the first (immediate) tick.
            interval.tick().await;
            loop {
                interval.tick().await;
                let res: RedisResult<String> = ::redis::cmd("PING").query_async(&mut conn).await;
                if let Err(err) = res {
                    log::error!("Redis ping failed: {}", err);
                }
            }
        });
        cx.reply(());
    }
}

impl Handler<SaveSession> for RedisStore {
    fn handle(&mut self, message: SaveSession, cx: Context<Self, SaveSession>) {
        let mut conn = self.conn.clone();
        let ttl = self.expire_sessions;
        cx.reply_later(async move {
            let key = Self::format_session_key(&message.session_id);
            let data = serde_json::to_string(&message.data)?;
            ::redis::cmd("SET")
                .arg(&key)
                .arg(data)
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async::<_, ()>(&mut conn)
                .await?;
            Ok(())
        });
    }
}

impl Handler<GetSession> for RedisStore {
    fn handle(&mut self, message: GetSession, cx: Context<Self, GetSession>) {
        let mut conn = self.conn.clone();
        cx.reply_later(async move {
            let key = Self::format_session_key(&message.session_id);
            let data: Option<String> = conn.get(&key).await?;
            if let Some(data) = data {
                Ok(Some(serde_json::from_str(&data)?))
            } else {
                Ok(None)
            }
        });
    }
}

impl Handler<DeleteSession> for RedisStore {
    fn handle(&mut self, message: DeleteSession, cx: Context<Self, DeleteSession>) {
        let mut conn = self.conn.clone();
        cx.reply_later(async move {
            let key = Self::format_session_key(&message.session_id);
            let _: () = conn.del(&key).await?;
            Ok(())
        });
    }
}

impl StoreSender for Addr<RedisStore> {}

#[cfg(test)]
mod tests {
    use super::RedisStore;

    #[test]
    fn normalizes_urls() {
        let normalize = |url: &str| RedisStore::normalize_url(url.to_owned());
        assert_eq!(normalize("localhost:6379").ok().as_deref(), Some("redis://localhost:6379"));
        assert_eq!(normalize("redis://localhost/0").ok().as_deref(), Some("redis://localhost/0"));
        assert_eq!(normalize("http://localhost").ok().as_deref(), Some("redis://localhost"));

        let err = normalize("rediss://localhost").expect_err("TLS URL accepted");
        assert_eq!(err.kind(), ::redis::ErrorKind::InvalidClientConfig);
    }

    #[test]
    fn namespaces_session_keys() {
        assert_eq!(
            RedisStore::format_session_key("abc"),
            "lti_bridge:session:abc"
        );
    }
}
