use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::store::{RefreshLock, Store};

/// Configuration for SingleEntryStore.
#[derive(Debug, Clone)]
pub struct SingleEntryStoreConfig {
    /// How long the held value stays valid after being written.
    pub ttl: Duration,
}

impl Default for SingleEntryStoreConfig {
    fn default() -> Self {
        SingleEntryStoreConfig {
            ttl: Duration::from_secs(60),
        }
    }
}

/// A store holding exactly one value, whatever key it is asked for.
///
/// Useful for caching a single expensive resource (a config document, a token)
/// behind the same engines as keyed data.
pub struct SingleEntryStore<V> {
    slot: RwLock<Option<(V, Instant)>>,
    ttl: Duration,
}

impl<V> SingleEntryStore<V>
where
    V: Clone + Send + Sync,
{
    pub fn new(config: SingleEntryStoreConfig) -> Self {
        SingleEntryStore {
            slot: RwLock::new(None),
            ttl: config.ttl,
        }
    }
}

#[async_trait]
impl<V> Store<V> for SingleEntryStore<V>
where
    V: Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        "single"
    }

    async fn get(&self, _key: &str) -> Result<Option<V>, CacheError> {
        {
            let slot = self.slot.read().await;
            match slot.as_ref() {
                None => return Ok(None),
                Some((value, written)) if written.elapsed() <= self.ttl => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => {}
            }
        }

        let mut slot = self.slot.write().await;
        if slot
            .as_ref()
            .is_some_and(|(_, written)| written.elapsed() > self.ttl)
        {
            *slot = None;
        }
        Ok(None)
    }

    async fn set(&self, _key: &str, value: V) -> Result<(), CacheError> {
        let mut slot = self.slot.write().await;
        *slot = Some((value, Instant::now()));
        Ok(())
    }
}

#[async_trait]
impl<V> RefreshLock for SingleEntryStore<V>
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_is_ignored() {
        let store = SingleEntryStore::new(SingleEntryStoreConfig::default());

        store.set("a", 1u32).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(1));
        assert_eq!(store.get("b").await.unwrap(), Some(1));

        store.set("b", 2u32).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_value_expires() {
        let store = SingleEntryStore::new(SingleEntryStoreConfig {
            ttl: Duration::from_millis(20),
        });

        assert!(store.get("a").await.unwrap().is_none());
        store.set("a", "v".to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get("a").await.unwrap().is_none());
    }
}
