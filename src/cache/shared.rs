//! Thread-safe handle around a [`Cache`].

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;

use crate::cache::{Cache, CacheStats};
use crate::error::Result;

/// Cloneable handle sharing one cache between threads and tasks.
///
/// A single mutex guards the whole namespace map, so every operation,
/// including the memory admission check and the write it guards, runs
/// without interleaving.
#[derive(Debug, Clone)]
pub struct SharedCache {
    inner: Arc<Mutex<Cache>>,
}

impl SharedCache {
    pub fn new(cache: Cache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Locks the cache for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, Cache> {
        self.inner.lock()
    }

    /// Runs `f` with exclusive access to the cache.
    pub fn with<R>(&self, f: impl FnOnce(&mut Cache) -> R) -> R {
        let mut cache = self.inner.lock();
        f(&mut *cache)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock().has(key)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.lock().set(key, value)
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }
}

impl From<Cache> for SharedCache {
    fn from(cache: Cache) -> Self {
        Self::new(cache)
    }
}
