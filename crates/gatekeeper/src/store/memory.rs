//! In-memory session store (tests and throwaway runs).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use gatekeeper_common::{Session, SessionKey};

use super::{SessionStore, StoreResult};

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &SessionKey) -> StoreResult<Option<Session>> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn save(&self, key: &SessionKey, session: &Session) -> StoreResult<()> {
        self.sessions.write().await.insert(*key, session.clone());
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> StoreResult<()> {
        self.sessions.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<SessionKey>> {
        Ok(self.sessions.read().await.keys().copied().collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
