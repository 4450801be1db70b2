//! Symmetric block engine.

use super::{BlockEngine, RemoteContext};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{KeyHandle, KeyMaterial, KeyUsage, RemoteKey};
use async_trait::async_trait;
use tracing::debug;

/// Block cipher whose block transform runs on the remote endpoint.
pub struct SymmetricBlockEngine {
    context: RemoteContext,
    handle: KeyHandle,
    usage: KeyUsage,
    block_size: usize,
}

impl SymmetricBlockEngine {
    /// Initialize the engine for `usage`.
    ///
    /// The handle is resolved here once, substituting the inverse key's
    /// handle when needed.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] if the key is not symmetric,
    /// the usage is not a cipher direction, or no handle serves `usage`.
    pub fn new(context: RemoteContext, key: &RemoteKey, usage: KeyUsage) -> CryptoResult<Self> {
        let KeyMaterial::Symmetric { block_size } = *key.material() else {
            return Err(CryptoError::configuration(format!(
                "key {} is not a symmetric key",
                key.label()
            )));
        };
        if block_size == 0 {
            return Err(CryptoError::configuration("block size must not be zero"));
        }
        if !matches!(usage, KeyUsage::Encrypt | KeyUsage::Decrypt) {
            return Err(CryptoError::configuration(format!(
                "{usage:?} is not a block cipher direction"
            )));
        }

        let handle = key.resolve(usage)?;
        debug!(key = key.label(), handle = %handle, ?usage, "Symmetric engine initialized");

        Ok(Self {
            context,
            handle,
            usage,
            block_size,
        })
    }

    /// Whether the engine runs the forward cipher direction.
    #[must_use]
    pub const fn is_encrypting(&self) -> bool {
        matches!(self.usage, KeyUsage::Encrypt)
    }
}

#[async_trait]
impl BlockEngine for SymmetricBlockEngine {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn key_handle(&self) -> KeyHandle {
        self.handle
    }

    fn usage(&self) -> KeyUsage {
        self.usage
    }

    async fn process_block(
        &self,
        input: &[u8],
        in_off: usize,
        output: &mut [u8],
        out_off: usize,
    ) -> CryptoResult<usize> {
        let bs = self.block_size;
        if in_off.checked_add(bs).is_none_or(|end| end > input.len()) {
            return Err(CryptoError::data_length("input buffer too short"));
        }
        if out_off.checked_add(bs).is_none_or(|end| end > output.len()) {
            return Err(CryptoError::data_length("output buffer too short"));
        }

        let block = self
            .context
            .round_trip("symmetric", self.handle, &input[in_off..in_off + bs])
            .await?;

        if block.len() != bs {
            return Err(CryptoError::integrity(
                self.handle,
                format!("expected {bs} byte block, endpoint returned {}", block.len()),
            ));
        }

        output[out_off..out_off + bs].copy_from_slice(&block);
        Ok(bs)
    }
}
