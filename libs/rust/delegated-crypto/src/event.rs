//! Result events and listeners for asynchronous operations.

use crate::error::CryptoError;
use crate::task::panic_message;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::error;
use uuid::Uuid;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Non-owning reference to the session that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Caller-supplied tag correlating an event with the call that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Discriminator(String);

impl Discriminator {
    /// Create a discriminator.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Create a unique discriminator.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Discriminator {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for Discriminator {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an event reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Output of an update
    UpdateResult(Vec<u8>),
    /// Output of a finalize
    FinalResult {
        /// Final output
        output: Vec<u8>,
        /// All output of the stream, when an accumulating listener added it
        accumulated: Option<Vec<u8>>,
    },
    /// Outcome of a verify
    VerifyResult(bool),
    /// The task failed
    Failure(CryptoError),
}

impl EventKind {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UpdateResult(_) => "update",
            Self::FinalResult { .. } => "final",
            Self::VerifyResult(_) => "verify",
            Self::Failure(_) => "failure",
        }
    }
}

/// Result of one asynchronous task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoEvent {
    /// Session that ran the task
    pub session: SessionId,
    /// Discriminator supplied with the task
    pub discriminator: Option<Discriminator>,
    /// What happened
    pub kind: EventKind,
}

impl CryptoEvent {
    /// Whether the event reports a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.kind, EventKind::Failure(_))
    }
}

/// Receives events from asynchronous operations.
///
/// Called on a worker thread. Implementations must not block for long.
pub trait CryptoListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &CryptoEvent);
}

impl<F> CryptoListener for F
where
    F: Fn(&CryptoEvent) + Send + Sync,
{
    fn on_event(&self, event: &CryptoEvent) {
        self(event);
    }
}

/// Registered listeners, notified in registration order.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn CryptoListener>>>,
}

impl ListenerSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add(&self, listener: Arc<dyn CryptoListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Deregister a listener by identity. Returns whether it was registered.
    pub fn remove(&self, listener: &Arc<dyn CryptoListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still receive the event.
    pub fn dispatch(&self, event: &CryptoEvent) {
        let snapshot = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                error!(
                    session = %event.session,
                    panic = panic_message(&*payload),
                    "Listener panicked"
                );
            }
        }
    }
}

/// Listener that collects a stream's update output and attaches it to the
/// final result.
///
/// Every event is forwarded to the inner listener. A `FinalResult` is
/// forwarded with `accumulated` set to all update output followed by the
/// final output. The buffer is cleared after a final result, a verify
/// result or a failure.
pub struct AccumulatingListener<L> {
    inner: L,
    buffer: Mutex<Vec<u8>>,
}

impl<L: CryptoListener> AccumulatingListener<L> {
    /// Wrap `inner`.
    pub const fn new(inner: L) -> Self {
        Self {
            inner,
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Bytes collected so far for the current stream.
    pub fn accumulated(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<L: CryptoListener> CryptoListener for AccumulatingListener<L> {
    fn on_event(&self, event: &CryptoEvent) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        match &event.kind {
            EventKind::UpdateResult(chunk) => {
                buffer.extend_from_slice(chunk);
                drop(buffer);
                self.inner.on_event(event);
            }
            EventKind::FinalResult { output, .. } => {
                let mut accumulated = std::mem::take(&mut *buffer);
                drop(buffer);
                accumulated.extend_from_slice(output);
                let event = CryptoEvent {
                    session: event.session,
                    discriminator: event.discriminator.clone(),
                    kind: EventKind::FinalResult {
                        output: output.clone(),
                        accumulated: Some(accumulated),
                    },
                };
                self.inner.on_event(&event);
            }
            EventKind::VerifyResult(_) | EventKind::Failure(_) => {
                buffer.clear();
                drop(buffer);
                self.inner.on_event(event);
            }
        }
    }
}
