//! flight-cache - A deduplicating, stale-while-revalidate cache library for Rust
//!
//! This library puts in-process maps, LRU caches and remote key-value stores
//! behind one `Store` interface and layers two engines on top:
//! - [`FetchCache`]: read-through caching where concurrent misses for the
//!   same key share a single computation
//! - [`LazyCache`]: stale-while-revalidate caching with a bounded background
//!   refresh queue and a cross-process refresh lock
//!
//! # Example
//!
//! ```ignore
//! use flight_cache::{FetchCache, LazyCache, LazyCacheConfig, MokaStore, MokaStoreConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let users = FetchCache::<String, String>::new(Arc::new(MokaStore::new(
//!         MokaStoreConfig::default(),
//!     )));
//!     let user = users
//!         .fetch_with_cache("user:123", || async { Ok("User 123".to_string()) })
//!         .await
//!         .unwrap();
//!
//!     let feeds = LazyCache::<String, String>::new(
//!         Arc::new(MokaStore::new(MokaStoreConfig::default())),
//!         LazyCacheConfig::default(),
//!     );
//!     let feed = feeds
//!         .fetch_with_lazy_refresh(
//!             "feed:123",
//!             |_token| async { Ok("latest posts".to_string()) },
//!             Duration::from_secs(60),
//!         )
//!         .await
//!         .unwrap();
//!
//!     feeds.shutdown().await;
//! }
//! ```

mod cache;
mod entry;
mod error;
mod lazy;
mod lock;
mod queue;
mod singleflight;
mod store;
pub mod stores;
mod utils;

// Re-export public API
pub use cache::FetchCache;
pub use entry::Entry;
pub use error::CacheError;
pub use lazy::{LazyCache, LazyCacheConfig};
pub use lock::LockRecord;
pub use singleflight::{Flight, Group};
pub use store::{RefreshLock, Store, SwrStore};
pub use stores::kv::{KvBackend, KvStore, KvStoreConfig};
pub use stores::memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use stores::memory_kv::MemoryBackend;
pub use stores::metrics::{CacheMetric, MetricsSink, MetricsStore};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::nats::{NatsBackend, NatsBackendConfig};
pub use stores::redis::{RedisBackend, RedisBackendConfig};
pub use stores::single::{SingleEntryStore, SingleEntryStoreConfig};
