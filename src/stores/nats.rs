use async_nats::jetstream;
use async_nats::jetstream::kv::{self, CreateErrorKind};
use async_trait::async_trait;
use std::fmt::Write;
use std::time::Duration;

use crate::error::CacheError;
use crate::stores::kv::KvBackend;

/// Configuration for NatsBackend.
#[derive(Debug, Clone)]
pub struct NatsBackendConfig {
    /// NATS server URL, e.g. `nats://localhost:4222`.
    pub url: String,

    /// JetStream key-value bucket. Created if it does not exist yet.
    pub bucket: String,

    /// Bucket-wide expiry applied when this backend creates the bucket.
    ///
    /// JetStream has no per-key TTL, so the `ttl` passed to
    /// [`KvBackend::put`] and [`KvBackend::create`] is not used; this is the
    /// only expiry keys get.
    pub max_age: Option<Duration>,
}

impl Default for NatsBackendConfig {
    fn default() -> Self {
        NatsBackendConfig {
            url: "nats://localhost:4222".to_string(),
            bucket: "flight-cache".to_string(),
            max_age: None,
        }
    }
}

/// [`KvBackend`] on a NATS JetStream key-value bucket.
///
/// `create` maps to the bucket's create-if-absent operation, which makes the
/// refresh lock safe across processes. Keys are escaped into the character
/// set JetStream accepts (see [`NatsBackend::bucket_key`]).
#[derive(Clone)]
pub struct NatsBackend {
    kv: kv::Store,
}

impl NatsBackend {
    /// Connect to NATS and open (or create) the configured bucket.
    ///
    /// # Example
    /// ```ignore
    /// let backend = NatsBackend::new(NatsBackendConfig {
    ///     bucket: "profiles".to_string(),
    ///     max_age: Some(Duration::from_secs(3600)),
    ///     ..Default::default()
    /// })
    /// .await?;
    /// let store = KvStore::new(backend, KvStoreConfig::default());
    /// ```
    pub async fn new(config: NatsBackendConfig) -> Result<Self, CacheError> {
        let client = async_nats::connect(config.url.as_str()).await.map_err(|e| {
            CacheError::operation(
                "nats",
                "",
                format!("Failed to connect to NATS at {}: {}", config.url, e),
            )
        })?;
        let context = jetstream::new(client);

        let kv = match context.get_key_value(config.bucket.as_str()).await {
            Ok(kv) => kv,
            Err(_) => {
                tracing::info!(bucket = %config.bucket, "Creating NATS key-value bucket");
                context
                    .create_key_value(kv::Config {
                        bucket: config.bucket.clone(),
                        history: 1,
                        max_age: config.max_age.unwrap_or_default(),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| {
                        CacheError::operation(
                            "nats",
                            "",
                            format!("Failed to open bucket '{}': {}", config.bucket, e),
                        )
                    })?
            }
        };

        Ok(Self::from_store(kv))
    }

    /// Wrap an already opened bucket.
    pub fn from_store(kv: kv::Store) -> Self {
        NatsBackend { kv }
    }

    /// Escape `key` into a valid bucket key.
    ///
    /// Letters, digits, `-`, `/` and `=` are kept. Every other byte, `_` and
    /// `.` included, becomes `_XX` (uppercase hex), so distinct keys never
    /// collide. The empty key maps to `_`.
    pub fn bucket_key(key: &str) -> String {
        if key.is_empty() {
            return "_".to_string();
        }

        let mut escaped = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'/' | b'=') {
                escaped.push(byte as char);
            } else {
                let _ = write!(escaped, "_{:02X}", byte);
            }
        }
        escaped
    }
}

#[async_trait]
impl KvBackend for NatsBackend {
    fn name(&self) -> &'static str {
        "kv:nats"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let value = self
            .kv
            .get(Self::bucket_key(key))
            .await
            .map_err(|e| CacheError::operation("nats", key, format!("GET failed: {}", e)))?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.kv
            .put(Self::bucket_key(key), value.into())
            .await
            .map_err(|e| CacheError::operation("nats", key, format!("PUT failed: {}", e)))?;
        Ok(())
    }

    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        _ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        match self.kv.create(Self::bucket_key(key), value.into()).await {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), CreateErrorKind::AlreadyExists) => Ok(false),
            Err(e) => Err(CacheError::operation(
                "nats",
                key,
                format!("CREATE failed: {}", e),
            )),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.kv
            .delete(Self::bucket_key(key))
            .await
            .map_err(|e| CacheError::operation("nats", key, format!("DELETE failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::store::{RefreshLock, Store};
    use crate::stores::kv::{KvStore, KvStoreConfig};

    // Note: These tests require a running NATS server with JetStream enabled.
    // Run with: cargo test -- --ignored

    async fn nats_store(prefix: &str) -> KvStore<Entry<String>, NatsBackend> {
        let backend = NatsBackend::new(NatsBackendConfig::default())
            .await
            .unwrap();
        KvStore::new(
            backend,
            KvStoreConfig {
                prefix: prefix.to_string(),
                ttl: Some(Duration::from_secs(60)),
            },
        )
    }

    #[test]
    fn test_bucket_key_escaping() {
        assert_eq!(NatsBackend::bucket_key("user-42"), "user-42");
        assert_eq!(NatsBackend::bucket_key("cache:lock:k"), "cache_3Alock_3Ak");
        assert_eq!(NatsBackend::bucket_key("a.b"), "a_2Eb");
        assert_eq!(NatsBackend::bucket_key(""), "_");
        assert_ne!(
            NatsBackend::bucket_key("a_3A"),
            NatsBackend::bucket_key("a:")
        );
    }

    #[tokio::test]
    #[ignore = "requires running NATS instance"]
    async fn test_nats_get_set() {
        let store = nats_store("flight-cache-test").await;
        store.backend().delete("flight-cache-test:test_key").await.unwrap();

        assert!(store.get("test_key").await.unwrap().is_none());

        let entry = Entry::new("test_value".to_string());
        store.set("test_key", entry.clone()).await.unwrap();

        assert_eq!(store.get("test_key").await.unwrap(), Some(entry));

        store.backend().delete("flight-cache-test:test_key").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running NATS instance"]
    async fn test_nats_create_is_exclusive() {
        let store = nats_store("flight-cache-test").await;
        let backend = store.backend();
        backend.delete("exclusive").await.unwrap();

        assert!(backend.create("exclusive", b"a".to_vec(), None).await.unwrap());
        assert!(!backend.create("exclusive", b"b".to_vec(), None).await.unwrap());
        assert_eq!(backend.get("exclusive").await.unwrap(), Some(b"a".to_vec()));

        // A deleted key can be created again.
        backend.delete("exclusive").await.unwrap();
        assert!(backend.create("exclusive", b"c".to_vec(), None).await.unwrap());
        backend.delete("exclusive").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running NATS instance"]
    async fn test_nats_refresh_lock() {
        let store = nats_store("flight-cache-test").await;
        let ttl = Duration::from_secs(10);
        store.release_refresh_lock("locked", "first").await.unwrap();

        assert!(store.try_acquire_refresh_lock("locked", "first", ttl).await.unwrap());
        assert!(store.try_acquire_refresh_lock("locked", "first", ttl).await.unwrap());
        assert!(!store.try_acquire_refresh_lock("locked", "second", ttl).await.unwrap());

        store.release_refresh_lock("locked", "second").await.unwrap();
        assert!(!store.try_acquire_refresh_lock("locked", "second", ttl).await.unwrap());

        store.release_refresh_lock("locked", "first").await.unwrap();
        assert!(store.try_acquire_refresh_lock("locked", "second", ttl).await.unwrap());
        store.release_refresh_lock("locked", "second").await.unwrap();
    }
}
