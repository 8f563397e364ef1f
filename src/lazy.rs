//! Lazily constructed, explicitly closable client holder
//!
//! Both backing adapters keep exactly one underlying client for the life of the
//! process. The client is built on first use and reused afterwards; `close()`
//! drops the cached instance so the next call builds a fresh one.

use parking_lot::RwLock;
use std::sync::Arc;

pub struct LazyClient<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> Default for LazyClient<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LazyClient<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Return the cached client, building it with `init` if none exists yet.
    ///
    /// Concurrent first callers race on the write lock; only one `init` runs.
    pub fn get_or_try_init<E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(client) = self.slot.read().as_ref() {
            return Ok(Arc::clone(client));
        }

        let mut slot = self.slot.write();
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(init()?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Clear the cache, handing back the previous client if there was one.
    pub fn close(&self) -> Option<Arc<T>> {
        self.slot.write().take()
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.read().is_some()
    }
}
