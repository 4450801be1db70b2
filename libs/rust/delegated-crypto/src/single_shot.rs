//! Single-shot asynchronous operation.
//!
//! Each call submits one finalize or verify to the worker pool and returns
//! at once. Overlapping calls on the same session are serialized on the
//! operation but may run in any order; use
//! [`OrderedCryptoQueue`](crate::queue::OrderedCryptoQueue) for streams.

use crate::error::CryptoResult;
use crate::event::{CryptoListener, Discriminator, ListenerSet, SessionId};
use crate::metrics::CryptoMetrics;
use crate::operation::CombinedOperation;
use crate::pool::{TaskHandle, WorkerPool};
use crate::task::{Task, TaskKind, TaskOutcome};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

struct Shared {
    id: SessionId,
    operation: Arc<tokio::sync::Mutex<CombinedOperation>>,
    listeners: ListenerSet,
    metrics: CryptoMetrics,
}

/// Asynchronous wrapper running whole operations on the worker pool.
pub struct AsyncCryptoOperation {
    shared: Arc<Shared>,
    pool: WorkerPool,
    latest: Mutex<Option<TaskHandle<TaskOutcome>>>,
}

impl AsyncCryptoOperation {
    /// Wrap `operation`.
    #[must_use]
    pub fn new(operation: CombinedOperation, pool: WorkerPool) -> Self {
        Self::with_metrics(operation, pool, CryptoMetrics::disabled())
    }

    /// Same as [`new`](Self::new) with a metrics recorder.
    #[must_use]
    pub fn with_metrics(operation: CombinedOperation, pool: WorkerPool, metrics: CryptoMetrics) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: SessionId::next(),
                operation: Arc::new(tokio::sync::Mutex::new(operation)),
                listeners: ListenerSet::new(),
                metrics,
            }),
            pool,
            latest: Mutex::new(None),
        }
    }

    /// Session id carried by every event of this session.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn CryptoListener>) {
        self.shared.listeners.add(listener);
    }

    /// Deregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn CryptoListener>) -> bool {
        self.shared.listeners.remove(listener)
    }

    /// Submit a finalize of `input`.
    pub fn finalize(&self, input: &[u8], discriminator: Option<Discriminator>) {
        self.finalize_range(input, 0, input.len(), discriminator);
    }

    /// Submit a finalize of `input[off..off + len]`.
    pub fn finalize_range(
        &self,
        input: &[u8],
        off: usize,
        len: usize,
        discriminator: Option<Discriminator>,
    ) {
        self.submit(Task::new(TaskKind::Finalize, input, off, len, discriminator));
    }

    /// Submit a verify of `input`.
    pub fn verify(&self, input: &[u8], discriminator: Option<Discriminator>) {
        self.verify_range(input, 0, input.len(), discriminator);
    }

    /// Submit a verify of `input[off..off + len]`.
    pub fn verify_range(
        &self,
        input: &[u8],
        off: usize,
        len: usize,
        discriminator: Option<Discriminator>,
    ) {
        self.submit(Task::new(TaskKind::Verify, input, off, len, discriminator));
    }

    fn submit(&self, task: Task) {
        let shared = Arc::clone(&self.shared);
        let task_id = task.id;
        let kind = task.kind;
        let task = Arc::new(task);
        let handle = self.pool.submit(async move {
            let result = Arc::clone(&task)
                .run_isolated(Arc::clone(&shared.operation))
                .await;
            let outcome = if result.is_ok() { "success" } else { "failure" };
            shared.metrics.record_task(task.kind.label(), outcome);
            shared.listeners.dispatch(&task.event(shared.id, &result));
            result
        });
        debug!(session = %self.shared.id, task = task_id, kind = kind.label(), "Task submitted");

        // Only the latest handle is kept; earlier tasks still run.
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn latest(&self) -> Option<TaskHandle<TaskOutcome>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel the latest submitted task. False when nothing was submitted.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.latest().is_some_and(|h| h.cancel(may_interrupt))
    }

    /// Whether the latest task finished. True when nothing was submitted.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.latest().is_none_or(|h| h.is_done())
    }

    /// Whether the latest task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.latest().is_some_and(|h| h.is_cancelled())
    }

    /// Wait for the latest task. `Ok(None)` when nothing was submitted.
    ///
    /// # Errors
    ///
    /// Returns the task's error, or [`CryptoError::Cancelled`](crate::CryptoError::Cancelled).
    pub async fn get(&self) -> CryptoResult<Option<TaskOutcome>> {
        match self.latest() {
            Some(handle) => handle.get().await.map(Some),
            None => Ok(None),
        }
    }

    /// Same as [`get`](Self::get), waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Timeout`](crate::CryptoError::Timeout) if the
    /// task did not finish in time, or the errors of [`get`](Self::get).
    pub async fn get_timeout(&self, timeout: Duration) -> CryptoResult<Option<TaskOutcome>> {
        match self.latest() {
            Some(handle) => handle.get_timeout(timeout).await.map(Some),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for AsyncCryptoOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCryptoOperation")
            .field("id", &self.shared.id)
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}
