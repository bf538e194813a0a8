use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::utils::request_id;

pub(crate) type ComputeFn<V, E> =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<V, E>> + Send>;

pub(crate) fn boxed_compute<V, E, F, Fut>(compute: F) -> ComputeFn<V, E>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    Box::new(move |token| compute(token).boxed())
}

/// A request to recompute one key in the background.
pub(crate) struct RefreshTask<V, E> {
    pub key: String,
    pub request_id: String,
    pub freshness: Duration,
    pub compute: ComputeFn<V, E>,
}

impl<V, E> RefreshTask<V, E> {
    pub fn new<F, Fut>(key: &str, compute: F, freshness: Duration) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        RefreshTask {
            key: key.to_string(),
            request_id: request_id(),
            freshness,
            compute: boxed_compute(compute),
        }
    }
}

/// Producer side of the bounded refresh queue.
///
/// Enqueueing never waits: when the buffer is full the task is dropped.
pub(crate) struct RefreshQueue<V, E> {
    sender: mpsc::Sender<RefreshTask<V, E>>,
}

impl<V, E> RefreshQueue<V, E>
where
    V: Send + 'static,
    E: Send + 'static,
{
    /// Create a queue holding up to `capacity` tasks and spawn its single consumer.
    ///
    /// The consumer runs `handler` for one task at a time until `shutdown` is
    /// cancelled or every producer is gone. Cancelling `shutdown` also drops the
    /// task in progress. A panicking task is logged and the worker moves on to
    /// the next one.
    pub fn spawn<H, Fut>(
        capacity: usize,
        shutdown: CancellationToken,
        handler: H,
    ) -> (Self, JoinHandle<()>)
    where
        H: Fn(RefreshTask<V, E>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<RefreshTask<V, E>>(capacity.max(1));

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    task = receiver.recv() => match task {
                        Some(task) => {
                            let key = task.key.clone();
                            let handled = AssertUnwindSafe(handler(task)).catch_unwind();
                            tokio::select! {
                                biased;
                                _ = shutdown.cancelled() => {
                                    tracing::debug!(key = %key, "Refresh interrupted by shutdown");
                                    break;
                                }
                                outcome = handled => {
                                    if outcome.is_err() {
                                        tracing::error!(key = %key, "Refresh task panicked");
                                    }
                                }
                            }
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!("Refresh worker stopped");
        });

        (RefreshQueue { sender }, worker)
    }

    /// Hand `task` to the worker. Returns `false` if it was dropped.
    pub fn try_enqueue(&self, task: RefreshTask<V, E>) -> bool {
        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) => {
                tracing::warn!(key = %task.key, "Refresh queue is full, task dropped");
                false
            }
            Err(TrySendError::Closed(task)) => {
                tracing::debug!(key = %task.key, "Refresh worker stopped, task dropped");
                false
            }
        }
    }
}
