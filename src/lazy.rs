use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::entry::Entry;
use crate::queue::{ComputeFn, RefreshQueue, RefreshTask, boxed_compute};
use crate::singleflight::Group;
use crate::store::SwrStore;
use crate::utils::{duration_ms, now_ms, request_id};

/// Configuration for LazyCache.
#[derive(Debug, Clone)]
pub struct LazyCacheConfig {
    /// Upper bound on one background refresh, lock handling excluded.
    pub refresh_timeout: Duration,

    /// Number of refresh tasks that may wait for the worker. Further stale
    /// reads are served without scheduling a refresh.
    pub queue_capacity: usize,

    /// How long a refresh lock is honoured before other owners may take it over.
    pub lock_ttl: Duration,
}

impl Default for LazyCacheConfig {
    fn default() -> Self {
        LazyCacheConfig {
            refresh_timeout: Duration::from_secs(30),
            queue_capacity: 1000,
            lock_ttl: Duration::from_secs(60),
        }
    }
}

/// State shared between the foreground path and the refresh worker.
struct Refresher<V, E> {
    store: Arc<dyn SwrStore<V>>,
    flights: Group<V, E>,
    config: LazyCacheConfig,
}

impl<V, E> Refresher<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Display + Send + Sync + 'static,
{
    /// Run `compute` through the dedup group. The round that computes the
    /// value also persists it, stamped with the round's `created_at`.
    async fn compute_and_store(
        &self,
        key: &str,
        request_id: &str,
        compute: ComputeFn<V, E>,
        token: CancellationToken,
    ) -> Result<V, E> {
        let store = Arc::clone(&self.store);
        let owned_key = key.to_string();
        let write_back = move |value: V, created_at: i64| async move {
            let entry = Entry::with_created_at(value, created_at);
            if let Err(e) = store.set(&owned_key, entry).await {
                tracing::warn!(
                    key = %owned_key,
                    tier = store.name(),
                    error = %e,
                    "Failed to store computed value"
                );
            }
        };

        let flight = self
            .flights
            .run_with_write_back(key, request_id, move || compute(token), write_back)
            .await;
        let value = flight.result?;

        Ok(value)
    }

    async fn refresh(&self, task: RefreshTask<V, E>, shutdown: &CancellationToken) {
        let RefreshTask {
            key,
            request_id,
            freshness,
            compute,
        } = task;

        match self
            .store
            .try_acquire_refresh_lock(&key, &request_id, self.config.lock_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(key = %key, "Refresh lock held elsewhere, skipping refresh");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    tier = self.store.name(),
                    error = %e,
                    "Cannot acquire refresh lock, skipping refresh"
                );
                return;
            }
        }

        self.refresh_locked(&key, &request_id, freshness, compute, shutdown)
            .await;

        if let Err(e) = self.store.release_refresh_lock(&key, &request_id).await {
            tracing::warn!(
                key = %key,
                tier = self.store.name(),
                error = %e,
                "Failed to release refresh lock"
            );
        }
    }

    async fn refresh_locked(
        &self,
        key: &str,
        request_id: &str,
        freshness: Duration,
        compute: ComputeFn<V, E>,
        shutdown: &CancellationToken,
    ) {
        // Someone else may have refreshed while the task was queued.
        if let Ok(Some(entry)) = self.store.get(key).await
            && entry.is_fresh(freshness, now_ms())
        {
            tracing::debug!(key, "Entry already fresh, skipping refresh");
            return;
        }

        let token = shutdown.child_token();
        let refresh = self.compute_and_store(key, request_id, compute, token.clone());

        match tokio::time::timeout(self.config.refresh_timeout, refresh).await {
            Ok(Ok(_)) => tracing::debug!(key, "Refreshed entry"),
            Ok(Err(e)) => tracing::error!(key, error = %e, "Failed to refresh entry"),
            Err(_) => {
                token.cancel();
                tracing::error!(
                    key,
                    timeout_ms = duration_ms(self.config.refresh_timeout),
                    "Refresh timed out"
                );
            }
        }
    }
}

/// Stale-while-revalidate cache.
///
/// Values are stored as [`Entry`] with the time they were computed. A read
/// within the caller's freshness window is served as-is; an older value is
/// still served immediately while a refresh is queued for the background
/// worker. Only a miss makes the caller wait for `compute`.
///
/// Background refreshes take the store's refresh lock first, so when several
/// processes share a remote store only one of them recomputes a given key.
pub struct LazyCache<V, E> {
    refresher: Arc<Refresher<V, E>>,
    queue: RefreshQueue<V, E>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<V, E> LazyCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Display + Send + Sync + 'static,
{
    /// Create a new cache over `store` and start its refresh worker.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Example
    /// ```ignore
    /// let backend = RedisBackend::new(RedisBackendConfig::default()).await?;
    /// let store = Arc::new(KvStore::new(backend, KvStoreConfig::default()));
    /// let cache: LazyCache<Profile, ApiError> = LazyCache::new(store, LazyCacheConfig::default());
    /// ```
    pub fn new(store: Arc<dyn SwrStore<V>>, config: LazyCacheConfig) -> Self {
        let shutdown = CancellationToken::new();
        let refresher = Arc::new(Refresher {
            store,
            flights: Group::new(),
            config,
        });

        let worker_refresher = Arc::clone(&refresher);
        let worker_shutdown = shutdown.clone();
        let (queue, worker) = RefreshQueue::spawn(
            refresher.config.queue_capacity,
            shutdown.clone(),
            move |task| {
                let refresher = Arc::clone(&worker_refresher);
                let shutdown = worker_shutdown.clone();
                async move { refresher.refresh(task, &shutdown).await }
            },
        );

        LazyCache {
            refresher,
            queue,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn SwrStore<V>> {
        &self.refresher.store
    }

    /// Get the value for `key`, refreshing it in the background once it is
    /// older than `freshness`.
    ///
    /// `compute` receives a cancellation token. It is cancelled when a
    /// background refresh times out or the cache shuts down; on the
    /// foreground path it is never cancelled, drop the returned future instead.
    ///
    /// # Example
    /// ```ignore
    /// let profile = cache
    ///     .fetch_with_lazy_refresh(
    ///         "profile:42",
    ///         move |token| async move { api.profile(42, token).await },
    ///         Duration::from_secs(300),
    ///     )
    ///     .await?;
    /// ```
    pub async fn fetch_with_lazy_refresh<F, Fut>(
        &self,
        key: &str,
        compute: F,
        freshness: Duration,
    ) -> Result<V, E>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let store = &self.refresher.store;

        match store.get(key).await {
            Ok(Some(entry)) => {
                if entry.is_stale(freshness, now_ms()) {
                    let task = RefreshTask::new(key, compute, freshness);
                    if self.queue.try_enqueue(task) {
                        tracing::debug!(key, "Queued background refresh");
                    }
                }
                return Ok(entry.value);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    key,
                    tier = store.name(),
                    error = %e,
                    "Cannot read entry from store, computing"
                );
            }
        }

        let request_id = request_id();
        self.refresher
            .compute_and_store(
                key,
                &request_id,
                boxed_compute(compute),
                CancellationToken::new(),
            )
            .await
    }

    /// Stop the refresh worker and wait for it to exit.
    ///
    /// Stale reads after shutdown are still served but no longer refreshed.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            tracing::warn!(error = %e, "Refresh worker exited abnormally");
        }
    }
}

impl<V, E> Drop for LazyCache<V, E> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
