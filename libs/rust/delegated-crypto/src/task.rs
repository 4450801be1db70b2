//! Units of asynchronous work and their outcomes.

use crate::error::{CryptoError, CryptoResult};
use crate::event::{CryptoEvent, Discriminator, EventKind, SessionId};
use crate::operation::{CombinedOperation, CryptoOperation};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::error;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Streaming update
    Update,
    /// Terminating finalize
    Finalize,
    /// Terminating verify
    Verify,
}

impl TaskKind {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Finalize => "finalize",
            Self::Verify => "verify",
        }
    }
}

/// Successful result of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Output of an update
    Update(Vec<u8>),
    /// Output of a finalize
    Final(Vec<u8>),
    /// Outcome of a verify
    Verify(bool),
}

impl From<TaskOutcome> for EventKind {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Update(bytes) => Self::UpdateResult(bytes),
            TaskOutcome::Final(output) => Self::FinalResult {
                output,
                accumulated: None,
            },
            TaskOutcome::Verify(valid) => Self::VerifyResult(valid),
        }
    }
}

/// One queued unit of work.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) id: u64,
    pub(crate) kind: TaskKind,
    input: Vec<u8>,
    offset: usize,
    len: usize,
    discriminator: Option<Discriminator>,
}

impl Task {
    pub(crate) fn new(
        kind: TaskKind,
        input: &[u8],
        offset: usize,
        len: usize,
        discriminator: Option<Discriminator>,
    ) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            input: input.to_vec(),
            offset,
            len,
            discriminator,
        }
    }

    /// Run the task against the session's operation.
    pub(crate) async fn run(
        &self,
        operation: &Mutex<CombinedOperation>,
    ) -> CryptoResult<TaskOutcome> {
        let mut op = operation.lock().await;
        match self.kind {
            TaskKind::Update => op
                .update_range(&self.input, self.offset, self.len)
                .await
                .map(TaskOutcome::Update),
            TaskKind::Finalize => op
                .finalize_range(&self.input, self.offset, self.len)
                .await
                .map(TaskOutcome::Final),
            TaskKind::Verify => op
                .verify_range(&self.input, self.offset, self.len)
                .await
                .map(TaskOutcome::Verify),
        }
    }

    /// Run the task on its own tokio task.
    ///
    /// A panic in the primitive is reported as [`CryptoError::Internal`].
    /// Dropping the returned future aborts the inner task.
    pub(crate) async fn run_isolated(
        self: Arc<Self>,
        operation: Arc<Mutex<CombinedOperation>>,
    ) -> CryptoResult<TaskOutcome> {
        let id = self.id;
        let kind = self.kind;
        let worker = tokio::spawn(async move { self.run(&operation).await });
        let _abort = AbortOnDrop(worker.abort_handle());

        match worker.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                let message = panic_message(&*payload);
                error!(task = id, kind = kind.label(), panic = message, "Task panicked");
                Err(CryptoError::internal(format!("{} task panicked: {message}", kind.label())))
            }
            Err(_) => Err(CryptoError::Cancelled),
        }
    }

    /// Event reporting `result` for this task.
    pub(crate) fn event(&self, session: SessionId, result: &CryptoResult<TaskOutcome>) -> CryptoEvent {
        let kind = match result {
            Ok(outcome) => EventKind::from(outcome.clone()),
            Err(e) => EventKind::Failure(e.clone()),
        };
        CryptoEvent {
            session,
            discriminator: self.discriminator.clone(),
            kind,
        }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
