use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use crate::error::CacheError;
use crate::store::{RefreshLock, Store};

/// Configuration for MokaStore.
#[derive(Debug, Clone)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold.
    pub max_capacity: u64,

    /// Time to live: entries are expired after this duration from insertion.
    /// `None` means entries never expire based on time (only by size limit).
    pub time_to_live: Option<Duration>,

    /// Time to idle: entries are expired if not accessed within this duration.
    /// `None` means entries don't expire based on idle time.
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
            time_to_live: None,
            time_to_idle: None,
        }
    }
}

/// Bounded concurrent cache store using Moka.
///
/// With only `max_capacity` set this is a size-bounded LRU-style cache; adding
/// `time_to_live` turns it into an expiring LRU. Moka handles eviction on
/// its own, so the store never reports errors.
pub struct MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<String, V>,
}

impl<V> MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let config = MokaStoreConfig {
    ///     max_capacity: 10_000,
    ///     time_to_live: Some(Duration::from_secs(300)),
    ///     time_to_idle: None,
    /// };
    /// let store = MokaStore::new(config);
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);

        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaStore {
            cache: builder.build(),
        }
    }

    /// Get cache statistics (for monitoring/debugging).
    pub fn stats(&self) -> (u64, u64) {
        let entry_count = self.cache.entry_count();
        let weighted_size = self.cache.weighted_size();
        (entry_count, weighted_size)
    }

    /// Apply pending evictions so `stats` reflects them.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl<V> Store<V> for MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "moka"
    }

    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }
}

#[async_trait]
impl<V> RefreshLock for MokaStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn try_acquire_refresh_lock(
        &self,
        _key: &str,
        _token: &str,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Ok(true)
    }

    async fn release_refresh_lock(&self, _key: &str, _token: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
