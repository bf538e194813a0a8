use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;
use crate::lock::{self, LOCK_KEY_PREFIX};
use crate::store::{RefreshLock, Store};
use crate::utils::build_cache_key;

/// A raw byte key-value backend shared between processes.
///
/// Implementations must make [`create`](KvBackend::create) atomic: of several
/// concurrent creates for an absent key, exactly one may return `true`.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// A name for metrics/tracing.
    fn name(&self) -> &'static str;

    /// Read the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
    -> Result<(), CacheError>;

    /// Write `value` under `key` only if the key is absent. Returns whether it was written.
    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[async_trait]
impl<B> KvBackend for Arc<B>
where
    B: KvBackend + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        (**self).put(key, value, ttl).await
    }

    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        (**self).create(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        (**self).delete(key).await
    }
}

/// Configuration for KvStore.
#[derive(Debug, Clone, Default)]
pub struct KvStoreConfig {
    /// Prepended to every key as `{prefix}:{key}`. Empty means no prefix.
    pub prefix: String,

    /// Expiry handed to the backend for cached values.
    /// `None` keeps values until they are overwritten.
    pub ttl: Option<Duration>,
}

/// JSON-serializing store on top of a [`KvBackend`].
///
/// Values live under `{prefix}:{key}` and refresh locks under
/// `{prefix}:lock:{key}`. Unlike the in-process stores, the refresh lock is
/// real: it excludes other processes sharing the same backend.
pub struct KvStore<V, B> {
    backend: B,
    prefix: String,
    ttl: Option<Duration>,
    _marker: PhantomData<fn() -> V>,
}

impl<V, B> KvStore<V, B>
where
    B: KvBackend,
{
    /// Create a new KvStore over `backend`.
    ///
    /// # Example
    /// ```ignore
    /// let backend = RedisBackend::new(RedisBackendConfig::default()).await?;
    /// let store: KvStore<Entry<User>, _> = KvStore::new(backend, KvStoreConfig {
    ///     prefix: "users".to_string(),
    ///     ttl: Some(Duration::from_secs(3600)),
    /// });
    /// ```
    pub fn new(backend: B, config: KvStoreConfig) -> Self {
        KvStore {
            backend,
            prefix: config.prefix,
            ttl: config.ttl,
            _marker: PhantomData,
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend key for the value cached under `key`.
    pub fn value_key(&self, key: &str) -> String {
        build_cache_key(&self.prefix, key)
    }

    /// Backend key for the refresh lock of `key`.
    pub fn lock_key(&self, key: &str) -> String {
        build_cache_key(&self.prefix, &format!("{}{}", LOCK_KEY_PREFIX, key))
    }
}

#[async_trait]
impl<V, B> Store<V> for KvStore<V, B>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: KvBackend,
{
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let Some(bytes) = self.backend.get(&self.value_key(key)).await? else {
            return Ok(None);
        };

        let value = serde_json::from_slice(&bytes).map_err(|e| {
            CacheError::Serialization(format!("Deserialization failed for '{}': {}", key, e))
        })?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&value).map_err(|e| {
            CacheError::Serialization(format!("Serialization failed for '{}': {}", key, e))
        })?;
        self.backend.put(&self.value_key(key), bytes, self.ttl).await
    }
}

#[async_trait]
impl<V, B> RefreshLock for KvStore<V, B>
where
    V: Send + Sync,
    B: KvBackend,
{
    async fn try_acquire_refresh_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        lock::try_acquire(&self.backend, &self.lock_key(key), token, ttl).await
    }

    async fn release_refresh_lock(&self, key: &str, token: &str) -> Result<(), CacheError> {
        lock::release(&self.backend, &self.lock_key(key), token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::stores::memory_kv::MemoryBackend;

    fn store(prefix: &str) -> KvStore<Entry<String>, Arc<MemoryBackend>> {
        KvStore::new(
            Arc::new(MemoryBackend::new()),
            KvStoreConfig {
                prefix: prefix.to_string(),
                ttl: None,
            },
        )
    }

    #[tokio::test]
    async fn test_get_set_roundtrip_through_json() {
        let store = store("users");

        assert!(store.get("user:1").await.unwrap().is_none());

        let entry = Entry::with_created_at("Alice".to_string(), 1_000);
        store.set("user:1", entry.clone()).await.unwrap();

        assert_eq!(store.get("user:1").await.unwrap(), Some(entry));

        let raw = store.backend().get("users:user:1").await.unwrap().unwrap();
        assert_eq!(raw, br#"{"value":"Alice","created_at":1000}"#.to_vec());
    }

    #[tokio::test]
    async fn test_undecodable_value_is_an_error() {
        let store = store("users");
        store
            .backend()
            .put("users:user:1", b"not json".to_vec(), None)
            .await
            .unwrap();

        let err = store.get("user:1").await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_lock_key_layout() {
        let store = store("users");
        assert_eq!(store.lock_key("user:1"), "users:lock:user:1");

        assert!(
            store
                .try_acquire_refresh_lock("user:1", "tok", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(
            store
                .backend()
                .get("users:lock:user:1")
                .await
                .unwrap()
                .is_some()
        );

        store.release_refresh_lock("user:1", "tok").await.unwrap();
        assert!(
            store
                .backend()
                .get("users:lock:user:1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_stores_sharing_a_backend_share_locks() {
        let backend = Arc::new(MemoryBackend::new());
        let config = KvStoreConfig {
            prefix: "users".to_string(),
            ttl: None,
        };
        let a: KvStore<Entry<String>, _> = KvStore::new(backend.clone(), config.clone());
        let b: KvStore<Entry<String>, _> = KvStore::new(backend, config);
        let ttl = Duration::from_secs(10);

        assert!(a.try_acquire_refresh_lock("k", "proc-a", ttl).await.unwrap());
        assert!(!b.try_acquire_refresh_lock("k", "proc-b", ttl).await.unwrap());
    }
}
