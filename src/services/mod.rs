//! User lifecycle, session recording and profile search
//!
//! Services sit between the HTTP handlers and the two adapters. They own the
//! multi-step workflows and the per-user serialization those workflows need.

pub mod profile;
pub mod sessions;
pub mod users;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use profile::ProfileService;
pub use sessions::{RecordedSession, SessionRecorder};
pub use users::{DeletionReport, DeletionStatus, UserService};

/// One async mutex per key, created on demand.
///
/// An entry lives only while some caller holds or awaits its lock, so the map
/// does not grow with the number of users ever seen.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let mutex = self.locks.entry(key.to_string()).or_default().value().clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Release first so the guard's own reference is gone before counting.
        self.guard.take();
        self.owner
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.lock("u1").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let guard = locks.lock("u1").await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _guard = locks.lock("u1").await;
                order.lock().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().push("first");
        drop(guard);
        waiter.await.unwrap();

        assert_eq!(*order.lock(), vec!["first", "second"]);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("u1").await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock("u2")).await;
        assert!(b.is_ok());
    }
}
