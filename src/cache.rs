use std::future::Future;
use std::sync::Arc;

use crate::singleflight::Group;
use crate::store::Store;
use crate::utils::request_id;

/// Read-through cache that deduplicates concurrent computations per key.
///
/// A hit is returned as-is and never revalidated. On a miss the compute
/// callback runs once per key no matter how many callers are waiting, every
/// waiter gets the same result, and the round writes the value back to the
/// store once, even if the caller that started it has gone away.
pub struct FetchCache<V, E> {
    store: Arc<dyn Store<V>>,
    flights: Group<V, E>,
}

impl<V, E> Clone for FetchCache<V, E> {
    fn clone(&self) -> Self {
        FetchCache {
            store: Arc::clone(&self.store),
            flights: self.flights.clone(),
        }
    }
}

impl<V, E> FetchCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a new cache over `store`.
    ///
    /// # Example
    /// ```ignore
    /// let store = Arc::new(MokaStore::new(MokaStoreConfig::default()));
    /// let cache: FetchCache<User, DbError> = FetchCache::new(store);
    /// ```
    pub fn new(store: Arc<dyn Store<V>>) -> Self {
        FetchCache {
            store,
            flights: Group::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store<V>> {
        &self.store
    }

    /// Get the cached value for `key` or compute it.
    ///
    /// Store read errors count as misses and store write errors are only
    /// logged; the returned error is always the one `compute` produced, shared
    /// with every caller of the same round. Errors are never cached.
    ///
    /// # Example
    /// ```ignore
    /// let user = cache
    ///     .fetch_with_cache("user:123", || async move { db.get_user(123).await })
    ///     .await?;
    /// ```
    pub async fn fetch_with_cache<F, Fut>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        match self.store.get(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    key,
                    tier = self.store.name(),
                    error = %e,
                    "Cannot read value from store, computing"
                );
            }
        }

        let store = Arc::clone(&self.store);
        let owned_key = key.to_string();
        let write_back = move |value: V, _created_at: i64| async move {
            if let Err(e) = store.set(&owned_key, value).await {
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
            .run_with_write_back(key, &request_id(), compute, write_back)
            .await;
        let value = flight.result?;

        Ok(value)
    }
}
