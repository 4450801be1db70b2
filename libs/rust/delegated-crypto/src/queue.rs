//! Ordered asynchronous session.
//!
//! Tasks run one at a time, in submission order, on the shared worker pool.
//! The head of the queue stays queued while its task runs and is removed
//! only when the task completes. When an update fails, every following
//! update is discarded together with the first non-update task after them,
//! because their output would depend on the lost state.

use crate::error::{CryptoError, CryptoResult};
use crate::event::{CryptoListener, Discriminator, ListenerSet, SessionId};
use crate::metrics::CryptoMetrics;
use crate::operation::CombinedOperation;
use crate::pool::{TaskHandle, WorkerPool};
use crate::task::{Task, TaskKind, TaskOutcome};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

/// Whether a session has a task in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// No task submitted to the pool
    Idle,
    /// The head task is submitted or running
    Running,
}

struct InFlight {
    task_id: u64,
    handle: TaskHandle<TaskOutcome>,
    cancel: Arc<Notify>,
    // Claimed once, either by the finishing task or by `cancel`.
    settled: Arc<AtomicBool>,
    cancelled: bool,
}

struct QueueInner {
    tasks: VecDeque<Arc<Task>>,
    state: QueueState,
    // Latest submitted task. Kept after completion so its result stays readable.
    current: Option<InFlight>,
}

impl QueueInner {
    fn is_in_flight(&self, task_id: u64) -> bool {
        self.state == QueueState::Running
            && self.current.as_ref().is_some_and(|c| c.task_id == task_id)
    }
}

struct Shared {
    id: SessionId,
    operation: Arc<tokio::sync::Mutex<CombinedOperation>>,
    inner: Mutex<QueueInner>,
    listeners: ListenerSet,
    pool: WorkerPool,
    reconfigurable: AtomicBool,
    metrics: CryptoMetrics,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit the head of the queue, or go idle when the queue is empty.
    fn submit_head(self: &Arc<Self>, inner: &mut QueueInner) {
        let Some(task) = inner.tasks.front().cloned() else {
            inner.state = QueueState::Idle;
            debug!(session = %self.id, "Queue drained");
            return;
        };

        let cancel = Arc::new(Notify::new());
        let settled = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(self);
        let signal = Arc::clone(&cancel);
        let claim = Arc::clone(&settled);
        let running = Arc::clone(&task);
        let handle = self.pool.submit(async move {
            let work = Arc::clone(&running).run_isolated(Arc::clone(&shared.operation));
            let result = tokio::select! {
                biased;
                () = signal.notified() => Err(CryptoError::Cancelled),
                result = work => result,
            };
            // `cancel` won the claim after the work finished
            let result = if claim.swap(true, Ordering::SeqCst) {
                Err(CryptoError::Cancelled)
            } else {
                result
            };
            shared.complete(&running, &result);
            result
        });

        debug!(session = %self.id, task = task.id, kind = task.kind.label(), "Task submitted");
        inner.state = QueueState::Running;
        inner.current = Some(InFlight {
            task_id: task.id,
            handle,
            cancel,
            settled,
            cancelled: false,
        });
    }

    /// Bookkeeping for a finished task: pop it, apply the failure cascade,
    /// notify listeners, then start the next task.
    fn complete(self: &Arc<Self>, task: &Task, result: &CryptoResult<TaskOutcome>) {
        let outcome = if result.is_ok() { "success" } else { "failure" };
        self.metrics.record_task(task.kind.label(), outcome);

        {
            let mut inner = self.lock();
            let head = inner.tasks.pop_front();
            let consistent = head.as_ref().is_some_and(|h| h.id == task.id);
            debug_assert!(
                consistent,
                "queue head does not match completed task {}",
                task.id
            );
            if !consistent {
                error!(
                    session = %self.id,
                    task = task.id,
                    head = head.as_ref().map(|h| h.id),
                    "Queue head does not match completed task, dropping queued tasks"
                );
                for dropped in inner.tasks.drain(..) {
                    self.metrics.record_discarded(dropped.kind.label());
                }
            } else if result.is_err() && task.kind == TaskKind::Update {
                let discarded = self.discard_dependents(&mut inner);
                if discarded > 0 {
                    warn!(
                        session = %self.id,
                        task = task.id,
                        discarded,
                        "Update failed, discarded dependent tasks"
                    );
                }
            }
        }

        self.listeners.dispatch(&task.event(self.id, result));

        let mut inner = self.lock();
        self.submit_head(&mut inner);
    }

    fn discard_dependents(&self, inner: &mut QueueInner) -> usize {
        let mut discarded = 0;
        while let Some(next) = inner.tasks.front() {
            let kind = next.kind;
            inner.tasks.pop_front();
            self.metrics.record_discarded(kind.label());
            discarded += 1;
            if kind != TaskKind::Update {
                break;
            }
        }
        discarded
    }
}

/// Session executing its tasks strictly in order on the worker pool.
///
/// Results are delivered to registered listeners, one event per task that
/// ran. Tasks discarded by cancellation or by a failed update produce no
/// event.
#[derive(Clone)]
pub struct OrderedCryptoQueue {
    shared: Arc<Shared>,
}

impl OrderedCryptoQueue {
    /// Wrap `operation` in an ordered session on `pool`.
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
                inner: Mutex::new(QueueInner {
                    tasks: VecDeque::new(),
                    state: QueueState::Idle,
                    current: None,
                }),
                listeners: ListenerSet::new(),
                pool,
                reconfigurable: AtomicBool::new(true),
                metrics,
            }),
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

    /// Queue an update of `input`.
    pub fn update(&self, input: &[u8], discriminator: Option<Discriminator>) {
        self.update_range(input, 0, input.len(), discriminator);
    }

    /// Queue an update of `input[off..off + len]`.
    ///
    /// An invalid range is reported as a failure event when the task runs.
    pub fn update_range(
        &self,
        input: &[u8],
        off: usize,
        len: usize,
        discriminator: Option<Discriminator>,
    ) {
        self.enqueue(Task::new(TaskKind::Update, input, off, len, discriminator));
    }

    /// Queue a finalize of `input`.
    pub fn finalize(&self, input: &[u8], discriminator: Option<Discriminator>) {
        self.finalize_range(input, 0, input.len(), discriminator);
    }

    /// Queue a finalize of `input[off..off + len]`.
    pub fn finalize_range(
        &self,
        input: &[u8],
        off: usize,
        len: usize,
        discriminator: Option<Discriminator>,
    ) {
        self.enqueue(Task::new(TaskKind::Finalize, input, off, len, discriminator));
    }

    /// Queue a verify of `input`.
    pub fn verify(&self, input: &[u8], discriminator: Option<Discriminator>) {
        self.verify_range(input, 0, input.len(), discriminator);
    }

    /// Queue a verify of `input[off..off + len]`.
    pub fn verify_range(
        &self,
        input: &[u8],
        off: usize,
        len: usize,
        discriminator: Option<Discriminator>,
    ) {
        self.enqueue(Task::new(TaskKind::Verify, input, off, len, discriminator));
    }

    fn enqueue(&self, task: Task) {
        // An update leaves a stream open; finalize and verify close it.
        self.shared
            .reconfigurable
            .store(task.kind != TaskKind::Update, Ordering::SeqCst);

        let mut inner = self.shared.lock();
        debug!(session = %self.shared.id, task = task.id, kind = task.kind.label(), "Task queued");
        inner.tasks.push_back(Arc::new(task));
        if inner.state == QueueState::Idle {
            self.shared.submit_head(&mut inner);
        }
    }

    /// Cancel the session's pending work.
    ///
    /// Queued tasks that were not yet submitted are dropped without events.
    /// The in-flight task is cancelled if it has not started, or if
    /// `may_interrupt` is set, unless it already finished; a cancelled task
    /// reports a [`CryptoError::Cancelled`] failure. Returns whether
    /// anything was cancelled.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let mut inner = self.shared.lock();
        let keep = usize::from(
            inner
                .tasks
                .front()
                .is_some_and(|head| inner.is_in_flight(head.id)),
        );
        let dropped = inner.tasks.len().saturating_sub(keep);
        inner.tasks.truncate(keep);

        let mut cancelled = dropped > 0;
        if keep == 1 {
            if let Some(current) = inner.current.as_mut() {
                let allowed = may_interrupt || !current.handle.is_started();
                if allowed && !current.settled.swap(true, Ordering::SeqCst) {
                    current.cancel.notify_one();
                    current.cancelled = true;
                    cancelled = true;
                }
            }
        }

        debug!(session = %self.shared.id, dropped, may_interrupt, cancelled, "Queue cancel");
        cancelled
    }

    /// Whether the latest submitted task has finished. True when nothing
    /// was ever submitted.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.shared
            .lock()
            .current
            .as_ref()
            .is_none_or(|c| c.handle.is_done())
    }

    /// Whether the latest submitted task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared
            .lock()
            .current
            .as_ref()
            .is_some_and(|c| c.cancelled)
    }

    /// Wait for the latest submitted task. `Ok(None)` when nothing was
    /// ever submitted.
    ///
    /// # Errors
    ///
    /// Returns the task's error.
    pub async fn get(&self) -> CryptoResult<Option<TaskOutcome>> {
        let handle = self.current_handle();
        match handle {
            Some(handle) => handle.get().await.map(Some),
            None => Ok(None),
        }
    }

    /// Same as [`get`](Self::get), waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Timeout`] if the task did not finish in time,
    /// or the task's error.
    pub async fn get_timeout(&self, timeout: Duration) -> CryptoResult<Option<TaskOutcome>> {
        let handle = self.current_handle();
        match handle {
            Some(handle) => handle.get_timeout(timeout).await.map(Some),
            None => Ok(None),
        }
    }

    fn current_handle(&self) -> Option<TaskHandle<TaskOutcome>> {
        self.shared.lock().current.as_ref().map(|c| c.handle.clone())
    }

    /// Number of queued tasks, including the one in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    /// Current scheduling state.
    #[must_use]
    pub fn state(&self) -> QueueState {
        self.shared.lock().state
    }

    /// Whether the last submitted task ended a stream, so the session's
    /// settings may be changed.
    #[must_use]
    pub fn is_reconfigurable(&self) -> bool {
        self.shared.reconfigurable.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for OrderedCryptoQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedCryptoQueue")
            .field("id", &self.shared.id)
            .field("pending", &self.pending())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
