//! Remote block engines.
//!
//! An engine performs exactly one primitive operation per remote round
//! trip: one cipher block for symmetric keys, one modulus-sized block for
//! the RSA core transform.

pub mod rsa;
pub mod symmetric;

pub use rsa::RsaEngine;
pub use symmetric::SymmetricBlockEngine;

use crate::error::{CryptoError, CryptoResult, TransportError};
use crate::key::{KeyHandle, KeyUsage};
use crate::metrics::CryptoMetrics;
use crate::transport::RemoteTransport;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

/// Fixed-size block transform backed by the remote endpoint.
#[async_trait]
pub trait BlockEngine: Send + Sync {
    /// Block size in bytes.
    fn block_size(&self) -> usize;

    /// Remote handle used for every block.
    fn key_handle(&self) -> KeyHandle;

    /// Direction the engine was initialized for.
    fn usage(&self) -> KeyUsage;

    /// Process one block from `input[in_off..]` into `output[out_off..]`.
    ///
    /// Returns the number of bytes written, always one block.
    async fn process_block(
        &self,
        input: &[u8],
        in_off: usize,
        output: &mut [u8],
        out_off: usize,
    ) -> CryptoResult<usize>;
}

/// Transport plus the per-request policy shared by all engines.
#[derive(Clone)]
pub struct RemoteContext {
    transport: Arc<dyn RemoteTransport>,
    request_timeout: Duration,
    metrics: CryptoMetrics,
}

impl RemoteContext {
    /// Create a context with a 30 second request timeout and no metrics.
    #[must_use]
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            request_timeout: Duration::from_secs(30),
            metrics: CryptoMetrics::disabled(),
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set metrics recorder.
    #[must_use]
    pub const fn with_metrics(mut self, metrics: CryptoMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// One remote round trip with status mapping. Never retried.
    #[instrument(skip(self, block), fields(handle = %handle, len = block.len()))]
    pub(crate) async fn round_trip(
        &self,
        engine: &'static str,
        handle: KeyHandle,
        block: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let start = Instant::now();
        let result =
            match tokio::time::timeout(self.request_timeout, self.transport.perform(handle, block))
                .await
            {
                Ok(Ok(response)) => response.into_block(handle),
                Ok(Err(source)) => Err(CryptoError::Transport { handle, source }),
                Err(_) => Err(CryptoError::Transport {
                    handle,
                    source: TransportError::Timeout,
                }),
            };

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.metrics
            .record_remote_operation(engine, status, start.elapsed());

        if let Err(e) = &result {
            warn!(error = %e, engine, "Remote block operation failed");
        }
        result
    }
}
