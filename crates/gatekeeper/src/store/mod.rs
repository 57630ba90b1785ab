//! Session persistence.
//!
//! One record per `(chat_id, user_id)`. Every backend writes a record in a
//! single atomic step, so readers never observe a torn session, and
//! reports a missing record as `None` rather than a default value.

mod file;
mod memory;
mod redis;

pub use self::file::FileSessionStore;
pub use self::memory::MemorySessionStore;
pub use self::redis::RedisSessionStore;

use async_trait::async_trait;
use gatekeeper_common::{GatekeeperError, Session, SessionKey};

pub type StoreResult<T> = Result<T, GatekeeperError>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for `key`, `None` if no session exists
    async fn load(&self, key: &SessionKey) -> StoreResult<Option<Session>>;

    /// Create or replace the session for `key`
    async fn save(&self, key: &SessionKey, session: &Session) -> StoreResult<()>;

    /// Remove the session; deleting a missing key is not an error
    async fn delete(&self, key: &SessionKey) -> StoreResult<()>;

    /// Keys of every stored session
    async fn keys(&self) -> StoreResult<Vec<SessionKey>>;

    /// Backend reachability check
    async fn ping(&self) -> StoreResult<()>;

    /// Backend name for logs and health output
    fn name(&self) -> &'static str;
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every backend must share.

    use super::*;

    pub fn sample_session() -> Session {
        let mut session = Session::awaiting_link("Rust (@rustlang)".into(), "@ferris".into(), 2);
        session.welcome_message_id = Some(10);
        session
    }

    pub async fn check_contract(store: &dyn SessionStore) {
        let key = SessionKey::new(-100200, 7);
        let other = SessionKey::new(-100200, 8);

        assert!(store.load(&key).await.unwrap().is_none());

        let mut session = sample_session();
        store.save(&key, &session).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), Some(session.clone()));

        session.begin_challenge("1234", 2, 99);
        session.push_digit('1');
        store.save(&key, &session).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), Some(session.clone()));

        store.save(&other, &sample_session()).await.unwrap();
        let mut keys = store.keys().await.unwrap();
        keys.sort_by_key(|k| k.user_id);
        assert_eq!(keys, vec![key, other]);

        store.delete(&key).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
        store.delete(&key).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec![other]);

        store.ping().await.unwrap();
    }
}
