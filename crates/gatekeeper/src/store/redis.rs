//! Session store with Redis backend.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use gatekeeper_common::constants::redis_keys::SESSION_PREFIX;
use gatekeeper_common::{GatekeeperError, Session, SessionKey};

use super::{SessionStore, StoreResult};

pub struct RedisSessionStore {
    /// Redis connection manager (auto-reconnecting)
    redis: ConnectionManager,
    /// Record TTL in seconds
    session_ttl: u64,
}

impl RedisSessionStore {
    /// Connect to Redis with connection manager (handles reconnection)
    pub async fn connect(redis_url: &str, session_ttl: u64) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url).map_err(redis_error)?;
        let redis = ConnectionManager::new(client).await.map_err(redis_error)?;
        Ok(Self { redis, session_ttl })
    }
}

fn redis_error(err: redis::RedisError) -> GatekeeperError {
    GatekeeperError::Store(format!("redis: {err}"))
}

/// gatekeeper:session:{chat_id}:{user_id}
fn session_key(key: &SessionKey) -> String {
    format!("{SESSION_PREFIX}{}:{}", key.chat_id, key.user_id)
}

fn parse_session_key(raw: &str) -> Option<SessionKey> {
    let (chat, user) = raw.strip_prefix(SESSION_PREFIX)?.rsplit_once(':')?;
    Some(SessionKey::new(chat.parse().ok()?, user.parse().ok()?))
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, key: &SessionKey) -> StoreResult<Option<Session>> {
        let mut conn = self.redis.clone();
        let data: Option<String> = conn.get(session_key(key)).await.map_err(redis_error)?;

        match data {
            Some(d) => Ok(Some(serde_json::from_str(&d)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &SessionKey, session: &Session) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        let data = serde_json::to_string(session)?;

        // SET EX replaces the whole value in one command
        conn.set_ex::<_, _, ()>(session_key(key), data, self.session_ttl)
            .await
            .map_err(redis_error)
    }

    async fn delete(&self, key: &SessionKey) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(session_key(key)).await.map_err(redis_error)
    }

    async fn keys(&self) -> StoreResult<Vec<SessionKey>> {
        let mut conn = self.redis.clone();
        let raw: Vec<String> = conn
            .keys(format!("{SESSION_PREFIX}*"))
            .await
            .map_err(redis_error)?;

        Ok(raw.iter().filter_map(|k| parse_session_key(k)).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_format() {
        let key = SessionKey::new(-1001234, 99);
        let raw = session_key(&key);
        assert_eq!(raw, "gatekeeper:session:-1001234:99");
        assert_eq!(parse_session_key(&raw), Some(key));
        assert_eq!(parse_session_key("gatekeeper:other:-1:2"), None);
        assert_eq!(parse_session_key("gatekeeper:session:nope"), None);
    }
}
