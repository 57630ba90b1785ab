//! Per-session lock manager.
//!
//! Serializes every load → compute → save → side-effect sequence for one
//! `SessionKey`. Locks are process-local, created on first use and evicted
//! as soon as nobody holds or waits on them; different keys never contend.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use gatekeeper_common::SessionKey;

#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<SessionKey, Arc<Mutex<()>>>,
}

/// Held for the duration of `with_lock`; releases and evicts on drop
struct Held<'a> {
    locks: &'a SessionLocks,
    key: SessionKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.evict_idle(self.key);
    }
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the exclusive lock for `key`.
    ///
    /// The guard is dropped and the entry evicted on every exit path,
    /// including cancellation and panics inside `work`.
    pub async fn with_lock<F, T>(&self, key: SessionKey, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let mut held = Held {
            locks: self,
            key,
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);

        work.await
    }

    /// Number of keys with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    fn evict_idle(&self, key: SessionKey) {
        // Only the map holds a reference once every holder and waiter is gone
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(SessionLocks::new());
        let in_flight = Arc::new(AtomicU32::new(0));
        let counter = Arc::new(tokio::sync::Mutex::new(0u32));
        let key = SessionKey::new(-1, 1);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                locks
                    .with_lock(key, async {
                        assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                        // read-modify-write with a suspension point in between
                        let value = *counter.lock().await;
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        *counter.lock().await = value + 1;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*counter.lock().await, 16);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = SessionLocks::new();
        let a = SessionKey::new(-1, 1);
        let b = SessionKey::new(-1, 2);

        let nested = locks
            .with_lock(a, async { locks.with_lock(b, async { 7 }).await })
            .await;
        assert_eq!(nested, 7);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_released_after_panic() {
        let locks = Arc::new(SessionLocks::new());
        let key = SessionKey::new(-1, 1);

        let inner = locks.clone();
        let result = tokio::spawn(async move {
            inner
                .with_lock(key, async {
                    panic!("boom");
                })
                .await
        })
        .await;
        assert!(result.is_err());

        let value = tokio::time::timeout(Duration::from_secs(1), locks.with_lock(key, async { 1 }))
            .await
            .expect("lock still held after panic");
        assert_eq!(value, 1);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_evicted_after_panic() {
        let locks = Arc::new(SessionLocks::new());
        let key = SessionKey::new(-1, 1);

        let inner = locks.clone();
        let result = tokio::spawn(async move {
            inner
                .with_lock(key, async {
                    panic!("boom");
                })
                .await
        })
        .await;

        assert!(result.is_err());
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_evicted_after_cancellation() {
        let locks = SessionLocks::new();
        let key = SessionKey::new(-1, 1);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            locks.with_lock(key, std::future::pending::<()>()),
        )
        .await;

        assert!(cancelled.is_err());
        assert_eq!(locks.len(), 0);
    }
}
