use async_trait::async_trait;
use std::time::Duration;

use crate::entry::Entry;
use crate::error::CacheError;

/// A store is a common interface for reading and writing key-value pairs.
///
/// The engines treat a store as a performance optimization rather than a
/// source of truth: read and write failures are logged, never surfaced.
#[async_trait]
pub trait Store<V>: Send + Sync {
    /// A name for metrics/tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    /// - "kv:redis"
    fn name(&self) -> &'static str;

    /// Return the cached value.
    ///
    /// The response must be `Ok(None)` for cache misses; `Err` is reserved for
    /// failures other than "not found".
    async fn get(&self, key: &str) -> Result<Option<V>, CacheError>;

    /// Sets the value for the given key.
    async fn set(&self, key: &str, value: V) -> Result<(), CacheError>;
}

/// A cross-process refresh lock keyed by cache key.
///
/// Stores living entirely inside one process implement this as a no-op that
/// always grants the lock.
#[async_trait]
pub trait RefreshLock: Send + Sync {
    /// Try to take the refresh lock for `key` on behalf of `token`.
    ///
    /// Returns `Ok(false)` when another owner holds a lock younger than `ttl`.
    /// Calling again with the same token renews the lock.
    async fn try_acquire_refresh_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Release the refresh lock for `key` if it is held by `token`.
    ///
    /// Releasing an absent lock or a lock held by someone else succeeds
    /// without touching it.
    async fn release_refresh_lock(&self, key: &str, token: &str) -> Result<(), CacheError>;
}

/// A store usable by [`LazyCache`](crate::LazyCache): timestamped values plus a refresh lock.
pub trait SwrStore<V>: Store<Entry<V>> + RefreshLock {}

impl<V, T> SwrStore<V> for T where T: Store<Entry<V>> + RefreshLock + ?Sized {}
