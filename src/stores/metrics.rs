//! Metrics middleware for cache stores.
//!
//! This module provides a `MetricsStore` wrapper that emits metrics for all
//! store operations (reads, writes, refresh lock attempts) to a user-provided sink.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flight_cache::{Entry, LazyCache, LazyCacheConfig, MokaStore, MokaStoreConfig};
//! use flight_cache::{CacheMetric, MetricsSink, MetricsStore};
//!
//! // Create metrics sink
//! let sink = Arc::new(MyMetricsSink::new());
//!
//! // Wrap store with metrics
//! let moka: MokaStore<Entry<String>> = MokaStore::new(MokaStoreConfig::default());
//! let store = Arc::new(MetricsStore::new(moka, sink.clone()));
//!
//! // Use in an engine - metrics emitted automatically
//! let cache: LazyCache<String, MyError> = LazyCache::new(store, LazyCacheConfig::default());
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CacheError;
use crate::store::{RefreshLock, Store};

/// Metrics emitted by the MetricsStore wrapper.
#[derive(Debug, Clone)]
pub enum CacheMetric {
    /// Emitted on every store read (get) operation.
    Read {
        /// The cache key that was read.
        key: String,
        /// Whether the key was found in the store.
        hit: bool,
        /// Whether the store reported an error.
        failed: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the store tier (from Store::name()).
        tier: String,
    },
    /// Emitted on every store write (set) operation.
    Write {
        /// The cache key that was written.
        key: String,
        /// Whether the store reported an error.
        failed: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the store tier (from Store::name()).
        tier: String,
    },
    /// Emitted on every refresh lock acquisition attempt.
    LockAcquire {
        /// The cache key whose lock was requested.
        key: String,
        /// Whether the lock was granted. `false` on errors too.
        acquired: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
    },
}

/// Trait for receiving cache metrics.
///
/// Implement this trait to collect metrics from `MetricsStore`.
///
/// # Example
///
/// ```ignore
/// use std::sync::Mutex;
/// use async_trait::async_trait;
/// use flight_cache::{CacheMetric, MetricsSink};
///
/// struct BufferedSink {
///     buffer: Mutex<Vec<CacheMetric>>,
/// }
///
/// #[async_trait]
/// impl MetricsSink for BufferedSink {
///     fn emit(&self, metric: CacheMetric) {
///         self.buffer.lock().unwrap().push(metric);
///     }
///
///     async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///         // Send buffered metrics to your backend
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit a single metric.
    ///
    /// This is called synchronously in the hot path of cache operations.
    /// Implementations should be fast (e.g., buffer metrics in memory).
    fn emit(&self, metric: CacheMetric);

    /// Flush any buffered metrics.
    ///
    /// Called when the caller wants to ensure all metrics are persisted.
    /// This is typically called at shutdown or at periodic intervals.
    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A store wrapper that emits metrics for all operations.
///
/// `MetricsStore` wraps any `Store` implementation and emits metrics for
/// read and write operations to a user-provided sink. When the inner store
/// implements `RefreshLock`, so does the wrapper, and lock attempts are
/// reported as well.
pub struct MetricsStore<S> {
    inner: S,
    sink: Arc<dyn MetricsSink>,
}

impl<S> MetricsStore<S> {
    /// Create a new MetricsStore wrapping the given store.
    ///
    /// # Arguments
    /// * `inner` - The store to wrap
    /// * `sink` - The metrics sink to emit metrics to
    pub fn new(inner: S, sink: Arc<dyn MetricsSink>) -> Self {
        MetricsStore { inner, sink }
    }

    /// Get a reference to the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a reference to the metrics sink.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    fn elapsed_ms(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl<V, S> Store<V> for MetricsStore<S>
where
    V: Send + 'static,
    S: Store<V>,
{
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Read {
            key: key.to_string(),
            hit: matches!(result, Ok(Some(_))),
            failed: result.is_err(),
            latency_ms,
            tier: self.inner.name().to_string(),
        });

        result
    }

    async fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.set(key, value).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Write {
            key: key.to_string(),
            failed: result.is_err(),
            latency_ms,
            tier: self.inner.name().to_string(),
        });

        result
    }
}

#[async_trait]
impl<S> RefreshLock for MetricsStore<S>
where
    S: RefreshLock,
{
    async fn try_acquire_refresh_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let start = Instant::now();
        let result = self.inner.try_acquire_refresh_lock(key, token, ttl).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::LockAcquire {
            key: key.to_string(),
            acquired: matches!(result, Ok(true)),
            latency_ms,
        });

        result
    }

    async fn release_refresh_lock(&self, key: &str, token: &str) -> Result<(), CacheError> {
        self.inner.release_refresh_lock(key, token).await
    }
}
