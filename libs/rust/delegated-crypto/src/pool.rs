//! Bounded worker pool shared by all sessions.
//!
//! Tasks are spawned on a tokio runtime; a semaphore sized at construction
//! caps how many of them run at once. The pool never resizes.

use crate::error::{CryptoError, CryptoResult};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio::task::AbortHandle;
use tracing::debug;

/// Fixed-size pool executing tasks from every session.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] if `size` is zero or no
    /// runtime is running.
    pub fn new(size: usize) -> CryptoResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| CryptoError::configuration(format!("no tokio runtime: {e}")))?;
        Self::with_runtime(runtime, size)
    }

    /// Create a pool on the given runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] if `size` is zero.
    pub fn with_runtime(runtime: Handle, size: usize) -> CryptoResult<Self> {
        if size == 0 {
            return Err(CryptoError::configuration(
                "worker pool size must be greater than 0",
            ));
        }
        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Number of tasks that may run at once.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of idle workers.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Submit a unit of work.
    pub fn submit<F, T>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = CryptoResult<T>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let state = Arc::new(TaskState::default());
        let permits = Arc::clone(&self.permits);
        let task_state = Arc::clone(&state);

        let join = self.runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                let _ = tx.send(Some(Err(CryptoError::internal("worker pool closed"))));
                return;
            };
            task_state.started.store(true, Ordering::SeqCst);
            let result = work.await;
            let _ = tx.send(Some(result));
        });

        TaskHandle {
            abort: join.abort_handle(),
            result: rx,
            state,
        }
    }
}

#[derive(Debug, Default)]
struct TaskState {
    started: AtomicBool,
    cancelled: AtomicBool,
}

/// Handle to a submitted task.
///
/// Clones share the same task. The result can be read any number of times.
#[derive(Debug)]
pub struct TaskHandle<T> {
    abort: AbortHandle,
    result: watch::Receiver<Option<CryptoResult<T>>>,
    state: Arc<TaskState>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            abort: self.abort.clone(),
            result: self.result.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Attempt to cancel the task.
    ///
    /// A task that has not started is always cancelled and never runs. A
    /// running task is only interrupted when `may_interrupt` is set, and
    /// then only at its next suspension point; a remote round trip in
    /// progress may still complete. Returns whether cancellation was
    /// requested.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        if self.is_done() {
            return false;
        }
        if self.state.started.load(Ordering::SeqCst) && !may_interrupt {
            return false;
        }
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
        debug!(may_interrupt, "Task cancellation requested");
        true
    }

    /// Whether the task produced a result or was cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.result.borrow().is_some()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the task acquired a worker.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Wait for the result.
    ///
    /// # Errors
    ///
    /// Returns the task's error, or [`CryptoError::Cancelled`] if the task
    /// was aborted before producing a result.
    pub async fn get(&self) -> CryptoResult<T> {
        let mut rx = self.result.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(result) => result.clone().unwrap_or(Err(CryptoError::Cancelled)),
            Err(_) => Err(CryptoError::Cancelled),
        }
    }

    /// Wait for the result at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Timeout`] if no result arrived in time, or
    /// the errors of [`get`](Self::get).
    pub async fn get_timeout(&self, timeout: Duration) -> CryptoResult<T> {
        tokio::time::timeout(timeout, self.get())
            .await
            .map_err(|_| CryptoError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_submit_and_get() {
        let pool = WorkerPool::new(2).unwrap();
        let handle = pool.submit(async { Ok(42u32) });
        assert_eq!(handle.get().await.unwrap(), 42);
        assert!(handle.is_done());
        assert!(!handle.is_cancelled());
        // result can be read again
        assert_eq!(handle.clone().get().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_errors_are_returned() {
        let pool = WorkerPool::new(1).unwrap();
        let handle = pool.submit(async { Err::<u32, _>(CryptoError::data_length("bad")) });
        assert!(matches!(handle.get().await, Err(CryptoError::DataLength(_))));
    }

    #[tokio::test]
    async fn test_zero_size_rejected() {
        assert!(WorkerPool::new(0).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_concurrency() {
        let pool = WorkerPool::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.get().await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancel_before_start_prevents_run() {
        let pool = WorkerPool::new(1).unwrap();
        let (release, gate) = oneshot::channel::<()>();
        let blocker = pool.submit(async move {
            let _ = gate.await;
            Ok(())
        });

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let queued = pool.submit(async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        tokio::task::yield_now().await;
        assert!(queued.cancel(false));
        assert!(queued.is_cancelled());
        assert!(queued.is_done());

        release.send(()).unwrap();
        blocker.get().await.unwrap();
        assert!(matches!(queued.get().await, Err(CryptoError::Cancelled)));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_running_task_needs_interrupt() {
        let pool = WorkerPool::new(1).unwrap();
        let (_release, gate) = oneshot::channel::<()>();
        let handle = pool.submit(async move {
            let _ = gate.await;
            Ok(())
        });

        while !handle.is_started() {
            tokio::task::yield_now().await;
        }
        assert!(!handle.cancel(false));
        assert!(handle.cancel(true));
        assert!(matches!(
            handle.get_timeout(Duration::from_secs(1)).await,
            Err(CryptoError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_get_timeout_elapses() {
        let pool = WorkerPool::new(1).unwrap();
        let (_release, gate) = oneshot::channel::<()>();
        let handle = pool.submit(async move {
            let _ = gate.await;
            Ok(())
        });
        assert!(matches!(
            handle.get_timeout(Duration::from_millis(10)).await,
            Err(CryptoError::Timeout)
        ));
    }
}
