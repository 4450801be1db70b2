//! Remote call transport contract.
//!
//! The transport performs one request against the key-holding endpoint.
//! Connection management, envelope protection and the wire format all live
//! behind this trait.

use crate::error::{CryptoError, TransportError};
use crate::key::KeyHandle;
use async_trait::async_trait;

/// Status codes returned by the remote endpoint.
pub mod status {
    /// Operation succeeded
    pub const SUCCESS: u32 = 0;
    /// Key handle unknown to the endpoint
    pub const INVALID_KEY_HANDLE: u32 = 1;
    /// Request failed an integrity or structure check
    pub const INTEGRITY_CHECK_FAILED: u32 = 2;
    /// Padding check failed on the endpoint
    pub const PADDING_ERROR: u32 = 3;
    /// Block has the wrong length for the key
    pub const DATA_LENGTH: u32 = 4;
}

/// Response of one remote block operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    /// Status code, [`status::SUCCESS`] on success
    pub status: u32,
    /// Processed block
    pub block: Vec<u8>,
}

impl RemoteResponse {
    /// Create a successful response.
    #[must_use]
    pub const fn success(block: Vec<u8>) -> Self {
        Self {
            status: status::SUCCESS,
            block,
        }
    }

    /// Create a failed response carrying only a status.
    #[must_use]
    pub const fn failure(status: u32) -> Self {
        Self {
            status,
            block: Vec::new(),
        }
    }

    /// Return the block on success, or the mapped error for `handle`.
    ///
    /// # Errors
    ///
    /// Returns the domain error matching the status code.
    pub fn into_block(self, handle: KeyHandle) -> Result<Vec<u8>, CryptoError> {
        match self.status {
            status::SUCCESS => Ok(self.block),
            status::INVALID_KEY_HANDLE => Err(CryptoError::InvalidKeyHandle { handle }),
            status::INTEGRITY_CHECK_FAILED => Err(CryptoError::integrity(
                handle,
                "endpoint rejected the request",
            )),
            status::PADDING_ERROR => Err(CryptoError::padding(format!(
                "endpoint reported bad padding for key {handle}"
            ))),
            status::DATA_LENGTH => Err(CryptoError::data_length(format!(
                "endpoint rejected block length for key {handle}"
            ))),
            other => Err(CryptoError::RemoteStatus {
                handle,
                status: other,
            }),
        }
    }
}

/// Performs one remote block operation.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Send `block` for processing with the key behind `handle`.
    async fn perform(
        &self,
        handle: KeyHandle,
        block: &[u8],
    ) -> Result<RemoteResponse, TransportError>;
}
