//! Store implementations for the cache library.

pub mod kv;
pub mod memory;
pub mod memory_kv;
pub mod metrics;
pub mod moka;
pub mod nats;
pub mod redis;
pub mod single;

pub use kv::{KvBackend, KvStore, KvStoreConfig};
pub use memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use memory_kv::MemoryBackend;
pub use metrics::{CacheMetric, MetricsSink, MetricsStore};
pub use moka::{MokaStore, MokaStoreConfig};
pub use nats::{NatsBackend, NatsBackendConfig};
pub use redis::{RedisBackend, RedisBackendConfig};
pub use single::{SingleEntryStore, SingleEntryStoreConfig};
