//! Error types for delegated crypto operations.
//!
//! Every failure is classified by where it originates: the caller's
//! configuration, the input data, the transport, or the remote endpoint.
//! Errors are `Clone` because a single failure is delivered to every
//! registered listener and may also be returned from a task handle.

use crate::key::KeyHandle;
use thiserror::Error;

/// Result type for delegated crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failure reported by the remote call transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// Endpoint did not answer in time
    #[error("request timed out")]
    Timeout,

    /// I/O failure while exchanging the request
    #[error("i/o failure: {0}")]
    Io(String),
}

/// Errors from delegated crypto operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Session or engine is wired incorrectly
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation is not supported by the bound primitive
    #[error("Unsupported operation {operation} for {primitive}")]
    UnsupportedOperation {
        /// The rejected operation
        operation: &'static str,
        /// The primitive bound to the session
        primitive: &'static str,
    },

    /// Remote endpoint could not be reached
    #[error("Transport failed for key {handle}: {source}")]
    Transport {
        /// Key handle of the failed request
        handle: KeyHandle,
        /// Underlying transport failure
        source: TransportError,
    },

    /// Remote endpoint reported an integrity or structure check failure
    #[error("Integrity check failed for key {handle}: {message}")]
    Integrity {
        /// Key handle of the failed request
        handle: KeyHandle,
        /// Failure detail
        message: String,
    },

    /// Remote endpoint does not know the key handle
    #[error("Invalid key handle {handle}")]
    InvalidKeyHandle {
        /// The rejected key handle
        handle: KeyHandle,
    },

    /// Padding is malformed
    #[error("Padding error: {0}")]
    Padding(String),

    /// Remote endpoint returned an unrecognized status code
    #[error("Remote endpoint returned status {status} for key {handle}")]
    RemoteStatus {
        /// Key handle of the failed request
        handle: KeyHandle,
        /// Raw status code
        status: u32,
    },

    /// Input has the wrong size or magnitude
    #[error("Data length error: {0}")]
    DataLength(String),

    /// Task was cancelled before producing a result
    #[error("Operation cancelled")]
    Cancelled,

    /// Waiting for a result or a remote round trip timed out
    #[error("Operation timed out")]
    Timeout,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CryptoError {
    /// Check if error is transient.
    ///
    /// Transient errors come from reaching the endpoint, not from the
    /// request itself. This crate never retries; the classification is
    /// for callers and transport collaborators that do.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout)
    }

    /// Check if error is a fatal configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::UnsupportedOperation { .. }
        )
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unsupported operation error.
    #[must_use]
    pub const fn unsupported(operation: &'static str, primitive: &'static str) -> Self {
        Self::UnsupportedOperation {
            operation,
            primitive,
        }
    }

    /// Create a data length error.
    #[must_use]
    pub fn data_length(msg: impl Into<String>) -> Self {
        Self::DataLength(msg.into())
    }

    /// Create an integrity error.
    #[must_use]
    pub fn integrity(handle: KeyHandle, msg: impl Into<String>) -> Self {
        Self::Integrity {
            handle,
            message: msg.into(),
        }
    }

    /// Create a padding error.
    #[must_use]
    pub fn padding(msg: impl Into<String>) -> Self {
        Self::Padding(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::Transport { .. } => "transport",
            Self::Integrity { .. } => "integrity",
            Self::InvalidKeyHandle { .. } => "invalid_key_handle",
            Self::Padding(_) => "padding",
            Self::RemoteStatus { .. } => "remote_status",
            Self::DataLength(_) => "data_length",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}
