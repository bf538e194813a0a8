use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::store::{RefreshLock, Store};
use crate::utils::{duration_ms, now_ms};

/// Configuration for eviction on set operations.
#[derive(Debug, Clone)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each set.
    ///
    /// - `1.0` -> run eviction on every `set`
    /// - `0.5` -> run eviction on every 2nd `set` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is lower than `max_items`.
    pub max_items: usize,
}

/// Configuration for HashMapStore.
#[derive(Debug, Clone, Default)]
pub struct HashMapStoreConfig {
    /// Entries are dropped this long after being written. `None` keeps them forever.
    pub ttl: Option<Duration>,

    /// Remove expired and surplus entries on `set` operations.
    pub evict_on_set: Option<EvictOnSetConfig>,
}

/// Internal stored value with write and expiration times.
#[derive(Clone)]
struct Slot<V> {
    written: i64,
    expires: Option<i64>,
    value: V,
}

/// Thread-safe in-memory cache store using HashMap with RwLock.
///
/// This is a simple store suitable for:
/// - Low to moderate concurrency (<8 threads)
/// - Small to medium cache sizes (<1000 items)
/// - Applications prioritizing simplicity over performance
///
/// For high-concurrency scenarios, consider using `MokaStore` instead.
pub struct HashMapStore<V>
where
    V: Clone + Send + Sync,
{
    state: RwLock<HashMap<String, Slot<V>>>,
    ttl: Option<Duration>,
    evict_on_set: Option<EvictOnSetConfig>,
}

impl<V> HashMapStore<V>
where
    V: Clone + Send + Sync,
{
    /// Create a new HashMapStore with the given configuration.
    pub fn new(config: HashMapStoreConfig) -> Self {
        HashMapStore {
            state: RwLock::new(HashMap::new()),
            ttl: config.ttl,
            evict_on_set: config.evict_on_set,
        }
    }

    /// Number of stored entries, expired ones included until they are evicted.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run eviction if configured and random check passes.
    async fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_set else {
            return;
        };

        // Check frequency
        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = if config.frequency >= 1.0 {
            true
        } else {
            rand::random::<f64>() < config.frequency
        };

        if !should_evict {
            return;
        }

        let mut state = self.state.write().await;
        let now = now_ms();

        // First delete all expired entries
        state.retain(|_, slot| slot.expires.is_none_or(|expires| expires > now));

        // If still over max_items, remove the oldest writes
        if state.len() > config.max_items {
            let mut entries: Vec<_> = state
                .iter()
                .map(|(k, slot)| (k.clone(), slot.written))
                .collect();
            entries.sort_by_key(|(_, written)| *written);

            let to_remove = state.len() - config.max_items;
            for (key, _) in entries.into_iter().take(to_remove) {
                state.remove(&key);
            }
        }
    }
}

#[async_trait]
impl<V> Store<V> for HashMapStore<V>
where
    V: Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        "hashmap"
    }

    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let state = self.state.read().await;

        let Some(slot) = state.get(key) else {
            return Ok(None);
        };

        let now = now_ms();
        if slot.expires.is_some_and(|expires| expires <= now) {
            // Entry is expired, remove it
            drop(state);
            let mut state = self.state.write().await;
            if state
                .get(key)
                .is_some_and(|slot| slot.expires.is_some_and(|expires| expires <= now))
            {
                state.remove(key);
            }
            return Ok(None);
        }

        Ok(Some(slot.value.clone()))
    }

    async fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        let now = now_ms();

        {
            let mut state = self.state.write().await;
            state.insert(
                key.to_string(),
                Slot {
                    written: now,
                    expires: self.ttl.map(|ttl| now.saturating_add(duration_ms(ttl))),
                    value,
                },
            );
        }

        self.maybe_evict().await;
        Ok(())
    }
}

#[async_trait]
impl<V> RefreshLock for HashMapStore<V>
where
    V: Clone + Send + Sync,
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
