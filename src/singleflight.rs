//! Per-key deduplication of in-flight computations.
//!
//! The first caller for a key starts a round: its computation is wrapped in a
//! [`Shared`] future and registered under the key. Callers arriving while the
//! round is in flight await a clone of the same future and observe the same
//! [`Flight`]. The table only keeps a [`WeakShared`] handle, so when every
//! waiter of a round has been dropped the computation is dropped with them,
//! its entry is removed and the next caller starts over.
//!
//! A round may carry a write-back step. It runs inside the shared future once
//! the computation succeeds, so the value is persisted exactly once per round
//! as long as any waiter is still polling, whichever caller started it.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::utils::now_ms;

type SharedFlight<V, E> = Shared<BoxFuture<'static, Flight<V, E>>>;
type Calls<V, E> = Arc<Mutex<HashMap<String, Call<V, E>>>>;

/// Outcome of one dedup round, cloned to every waiter.
#[derive(Debug, Clone)]
pub struct Flight<V, E> {
    /// What the computation returned.
    pub result: Result<V, E>,
    /// Request identifier of the caller that started the round.
    pub request_id: String,
    /// Unix milliseconds at which the computation finished.
    pub created_at: i64,
}

impl<V, E> Flight<V, E> {
    /// Whether the caller holding `request_id` started this round.
    pub fn started_by(&self, request_id: &str) -> bool {
        self.request_id == request_id
    }
}

struct Call<V, E> {
    request_id: String,
    flight: WeakShared<BoxFuture<'static, Flight<V, E>>>,
}

/// Removes a round's table entry when the round finishes or is dropped.
struct Deregister<V, E> {
    calls: Calls<V, E>,
    key: String,
    request_id: String,
}

impl<V, E> Drop for Deregister<V, E> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock();
        if calls
            .get(&self.key)
            .is_some_and(|call| call.request_id == self.request_id)
        {
            calls.remove(&self.key);
        }
    }
}

/// Table of in-flight computations, one per key.
pub struct Group<V, E> {
    calls: Calls<V, E>,
}

impl<V, E> Clone for Group<V, E> {
    fn clone(&self) -> Self {
        Group {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<V, E> Default for Group<V, E> {
    fn default() -> Self {
        Group {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<V, E> Group<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `compute` for `key`, or join the round already in flight for it.
    ///
    /// `compute` is only called when this caller starts a new round, and only
    /// once the round is first polled.
    pub async fn run<F, Fut>(&self, key: &str, request_id: &str, compute: F) -> Flight<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.run_with_write_back(key, request_id, compute, |_, _| futures::future::ready(()))
            .await
    }

    /// Like [`Group::run`], but a round started here hands a successful value
    /// and its `created_at` to `write_back` before any waiter is released.
    ///
    /// `write_back` is dropped unused when this caller joins an existing round.
    pub async fn run_with_write_back<F, Fut, W, WFut>(
        &self,
        key: &str,
        request_id: &str,
        compute: F,
        write_back: W,
    ) -> Flight<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        W: FnOnce(V, i64) -> WFut + Send + 'static,
        WFut: Future<Output = ()> + Send + 'static,
    {
        let flight = {
            let mut calls = self.calls.lock();
            match calls.get(key).and_then(|call| call.flight.upgrade()) {
                Some(flight) => flight,
                None => {
                    let flight = self.start(key, request_id, compute, write_back);
                    if let Some(weak) = flight.downgrade() {
                        calls.insert(
                            key.to_string(),
                            Call {
                                request_id: request_id.to_string(),
                                flight: weak,
                            },
                        );
                    }
                    flight
                }
            }
        };

        flight.await
    }

    /// Number of keys with a round in flight.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Whether no round is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start<F, Fut, W, WFut>(
        &self,
        key: &str,
        request_id: &str,
        compute: F,
        write_back: W,
    ) -> SharedFlight<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        W: FnOnce(V, i64) -> WFut + Send + 'static,
        WFut: Future<Output = ()> + Send + 'static,
    {
        // Moved into the future so it also fires if the round is never polled.
        let deregister = Deregister {
            calls: Arc::clone(&self.calls),
            key: key.to_string(),
            request_id: request_id.to_string(),
        };
        let request_id = request_id.to_string();

        async move {
            let result = compute().await;
            let created_at = now_ms();

            if let Ok(value) = &result {
                write_back(value.clone(), created_at).await;
            }

            // Callers arriving after this point start a new round.
            drop(deregister);

            Flight {
                result,
                request_id,
                created_at,
            }
        }
        .boxed()
        .shared()
    }
}
