//! Entry point wiring transport, engines, primitives and sessions.

use crate::config::DelegationConfig;
use crate::engine::{RemoteContext, RsaEngine, SymmetricBlockEngine};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{KeyUsage, RemoteKey};
use crate::metrics::CryptoMetrics;
use crate::operation::{CombinedOperation, SignerMode};
use crate::pool::WorkerPool;
use crate::primitives::{BlockMode, BlockModeCipher, Cmac, RsaCipher, RsaPkcs1Signer};
use crate::queue::OrderedCryptoQueue;
use crate::single_shot::AsyncCryptoOperation;
use crate::transport::RemoteTransport;
use std::sync::Arc;
use tracing::info;

/// Builds operations against one remote endpoint and owns the worker pool
/// their asynchronous sessions share.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct DelegationClient {
    config: DelegationConfig,
    context: RemoteContext,
    pool: WorkerPool,
    metrics: CryptoMetrics,
}

impl DelegationClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] if the config is invalid or no
    /// tokio runtime is running.
    pub fn new(config: DelegationConfig, transport: Arc<dyn RemoteTransport>) -> CryptoResult<Self> {
        config
            .validate()
            .map_err(|e| CryptoError::configuration(e.to_string()))?;

        let metrics = CryptoMetrics::new(config.metrics_enabled);
        let pool = WorkerPool::new(config.worker_pool_size)?;
        let context = RemoteContext::new(transport)
            .with_request_timeout(config.request_timeout)
            .with_metrics(metrics);

        info!(
            worker_pool_size = config.worker_pool_size,
            request_timeout_ms = u64::try_from(config.request_timeout.as_millis()).unwrap_or(u64::MAX),
            metrics_enabled = config.metrics_enabled,
            "Delegation client initialized"
        );

        Ok(Self {
            config,
            context,
            pool,
            metrics,
        })
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &DelegationConfig {
        &self.config
    }

    /// Shared worker pool.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Transport and request policy handed to engines.
    #[must_use]
    pub const fn context(&self) -> &RemoteContext {
        &self.context
    }

    /// Symmetric engine for `key` in direction `usage`.
    ///
    /// # Errors
    ///
    /// See [`SymmetricBlockEngine::new`].
    pub fn symmetric_engine(&self, key: &RemoteKey, usage: KeyUsage) -> CryptoResult<SymmetricBlockEngine> {
        SymmetricBlockEngine::new(self.context.clone(), key, usage)
    }

    /// RSA engine for `key` in direction `usage`.
    ///
    /// # Errors
    ///
    /// See [`RsaEngine::new`].
    pub fn rsa_engine(&self, key: &RemoteKey, usage: KeyUsage) -> CryptoResult<RsaEngine> {
        RsaEngine::new(self.context.clone(), key, usage)
    }

    /// Block cipher in ECB or CBC mode.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] on a key, direction or IV
    /// mismatch.
    pub fn block_cipher(
        &self,
        key: &RemoteKey,
        usage: KeyUsage,
        mode: BlockMode,
        padding: bool,
    ) -> CryptoResult<CombinedOperation> {
        let engine = self.symmetric_engine(key, usage)?;
        Ok(CombinedOperation::cipher(BlockModeCipher::new(
            engine, mode, padding,
        )?))
    }

    /// CMAC over a symmetric key. Generation and verification both run the
    /// forward cipher.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] if no handle serves encryption
    /// or the block size is unsupported.
    pub fn cmac(&self, key: &RemoteKey) -> CryptoResult<CombinedOperation> {
        let engine = self.symmetric_engine(key, KeyUsage::Encrypt)?;
        Ok(CombinedOperation::authenticator(Cmac::new(engine)?))
    }

    /// Raw RSA cipher.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] on a key mismatch.
    pub fn rsa_cipher(&self, key: &RemoteKey, usage: KeyUsage) -> CryptoResult<CombinedOperation> {
        let engine = self.rsa_engine(key, usage)?;
        Ok(CombinedOperation::cipher(RsaCipher::new(engine)))
    }

    /// SHA-256 RSA PKCS#1 v1.5 signer or verifier.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] on a key mismatch or a modulus
    /// too short for the encoded digest.
    pub fn rsa_signer(&self, key: &RemoteKey, mode: SignerMode) -> CryptoResult<CombinedOperation> {
        let usage = match mode {
            SignerMode::Sign => KeyUsage::Sign,
            SignerMode::Verify => KeyUsage::Verify,
        };
        let engine = self.rsa_engine(key, usage)?;
        Ok(CombinedOperation::signer(RsaPkcs1Signer::new(engine, mode)?))
    }

    /// Ordered asynchronous session over `operation`.
    #[must_use]
    pub fn ordered(&self, operation: CombinedOperation) -> OrderedCryptoQueue {
        OrderedCryptoQueue::with_metrics(operation, self.pool.clone(), self.metrics)
    }

    /// Single-shot asynchronous session over `operation`.
    #[must_use]
    pub fn single_shot(&self, operation: CombinedOperation) -> AsyncCryptoOperation {
        AsyncCryptoOperation::with_metrics(operation, self.pool.clone(), self.metrics)
    }
}

impl std::fmt::Debug for DelegationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationClient")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyHandle;
    use crate::operation::CryptoOperation;
    use crate::test_support::XorTransport;

    fn client() -> DelegationClient {
        DelegationClient::new(
            DelegationConfig::default().with_metrics_enabled(false),
            Arc::new(XorTransport),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = DelegationClient::new(
            DelegationConfig::default().with_worker_pool_size(0),
            Arc::new(XorTransport),
        );
        assert!(matches!(result, Err(CryptoError::Configuration(_))));
    }

    #[test]
    fn test_requires_runtime() {
        let result = DelegationClient::new(DelegationConfig::default(), Arc::new(XorTransport));
        assert!(matches!(result, Err(CryptoError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_cmac_uses_inverse_handle() {
        // decrypt key whose inverse serves encryption
        let key = RemoteKey::aes("k", KeyUsage::Decrypt, KeyHandle::new(0x11))
            .with_inverse(RemoteKey::aes("k", KeyUsage::Encrypt, KeyHandle::new(0x22)));
        let mut mac = client().cmac(&key).unwrap();
        assert_eq!(mac.finalize(b"abc").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_signer_rejects_symmetric_key() {
        let key = RemoteKey::aes("k", KeyUsage::Sign, KeyHandle::new(1));
        assert!(matches!(
            client().rsa_signer(&key, SignerMode::Sign),
            Err(CryptoError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_block_cipher_round_trip() {
        let key = RemoteKey::aes("k", KeyUsage::Encrypt, KeyHandle::new(0x33))
            .with_inverse(RemoteKey::aes("k", KeyUsage::Decrypt, KeyHandle::new(0x33)));
        let client = client();
        let mut enc = client
            .block_cipher(&key, KeyUsage::Encrypt, BlockMode::Ecb, true)
            .unwrap();
        let mut dec = client
            .block_cipher(&key, KeyUsage::Decrypt, BlockMode::Ecb, true)
            .unwrap();

        let ciphertext = enc.finalize(b"hello").await.unwrap();
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(dec.finalize(&ciphertext).await.unwrap(), b"hello");
    }
}
