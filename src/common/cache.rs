//! In-memory cache for storing key-value pairs.
//!
//! Uses moka's high-performance concurrent cache implementation.

use std::sync::Arc;

use moka::sync::Cache;

/// Thread-safe in-memory cache with configurable capacity.
///
/// The engine caches settled runs in it (`MemCache<ExecuteId, Arc<RunSlot>>`).
/// Entries beyond the capacity are evicted; the engine falls back to the
/// durable execution record for evicted runs.
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity as u64),
        }
    }

    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    /// Get the value for `key`, or insert the one produced by `init`.
    ///
    /// Concurrent callers for the same key share a single `init` call.
    pub fn try_get_with<E, F>(
        &self,
        key: K,
        init: F,
    ) -> std::result::Result<V, Arc<E>>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: Send + Sync + 'static,
    {
        self.entries.try_get_with(key, init)
    }

    pub fn remove(
        &self,
        key: &K,
    ) {
        self.entries.remove(key);
    }

    /// Return an iterator over the entries of the cache.
    pub fn iter(&self) -> moka::sync::Iter<'_, K, V> {
        self.entries.iter()
    }
}
