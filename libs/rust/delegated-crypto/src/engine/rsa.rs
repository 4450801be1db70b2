//! RSA core engine.
//!
//! Converts opaque blocks to and from integers modulo `n` and hands the
//! modular exponentiation to the remote endpoint, one block per round trip.

use super::RemoteContext;
use crate::error::{CryptoError, CryptoResult};
use crate::key::{KeyHandle, KeyMaterial, KeyUsage, RemoteKey};
use num_bigint::BigUint;
use tracing::debug;

/// RSA transform delegated to the remote endpoint.
pub struct RsaEngine {
    context: RemoteContext,
    handle: KeyHandle,
    usage: KeyUsage,
    modulus: BigUint,
    modulus_len: usize,
}

impl RsaEngine {
    /// Initialize the engine for `usage`.
    ///
    /// `Encrypt` and `Verify` run the public (encryption path) operation,
    /// `Decrypt` and `Sign` the private one.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] if the key is not an RSA key
    /// or no handle serves `usage`.
    pub fn new(context: RemoteContext, key: &RemoteKey, usage: KeyUsage) -> CryptoResult<Self> {
        let KeyMaterial::Rsa { modulus } = key.material() else {
            return Err(CryptoError::configuration(format!(
                "key {} is not an RSA key",
                key.label()
            )));
        };
        if modulus.bits() < 2 {
            return Err(CryptoError::configuration("RSA modulus is too small"));
        }

        let handle = key.resolve(usage)?;
        let modulus_len = usize::try_from(modulus.bits().div_ceil(8))
            .map_err(|_| CryptoError::configuration("RSA modulus is too large"))?;
        debug!(key = key.label(), handle = %handle, ?usage, bits = modulus.bits(), "RSA engine initialized");

        Ok(Self {
            context,
            handle,
            usage,
            modulus: modulus.clone(),
            modulus_len,
        })
    }

    /// Modulus length in bytes.
    #[must_use]
    pub const fn modulus_len(&self) -> usize {
        self.modulus_len
    }

    /// Remote handle used for every block.
    #[must_use]
    pub const fn key_handle(&self) -> KeyHandle {
        self.handle
    }

    /// Whether the engine runs the public operation.
    #[must_use]
    pub const fn is_public_path(&self) -> bool {
        self.usage.is_public_path()
    }

    /// Maximum accepted input length in bytes.
    #[must_use]
    pub const fn max_input_len(&self) -> usize {
        if self.is_public_path() {
            self.modulus_len + 1
        } else {
            self.modulus_len
        }
    }

    /// Transform one block.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DataLength`] before any remote call when the
    /// block is too long or its value is not below the modulus.
    pub async fn process(&self, block: &[u8]) -> CryptoResult<Vec<u8>> {
        let value = self.convert_input(block)?;
        let request = left_pad(value.to_bytes_be(), self.modulus_len);

        let response = self
            .context
            .round_trip("rsa", self.handle, &request)
            .await?;

        self.convert_output(&response)
    }

    /// Process `input[in_off..in_off + len]`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DataLength`] when the range is out of bounds.
    pub async fn process_range(
        &self,
        input: &[u8],
        in_off: usize,
        len: usize,
    ) -> CryptoResult<Vec<u8>> {
        let end = in_off
            .checked_add(len)
            .filter(|end| *end <= input.len())
            .ok_or_else(|| CryptoError::data_length("input range out of bounds"))?;
        self.process(&input[in_off..end]).await
    }

    fn convert_input(&self, block: &[u8]) -> CryptoResult<BigUint> {
        let mut block = block;

        if block.len() == self.modulus_len + 1 && self.is_public_path() && block[0] == 0 {
            block = &block[1..];
        }
        if block.len() > self.modulus_len {
            return Err(CryptoError::data_length("input too large for RSA cipher"));
        }

        let value = BigUint::from_bytes_be(block);
        if value >= self.modulus {
            return Err(CryptoError::data_length("input too large for RSA cipher"));
        }
        Ok(value)
    }

    fn convert_output(&self, response: &[u8]) -> CryptoResult<Vec<u8>> {
        if response.len() > self.modulus_len + 1 {
            return Err(CryptoError::integrity(
                self.handle,
                "RSA result longer than the modulus",
            ));
        }

        let value = BigUint::from_bytes_be(response);
        if value >= self.modulus {
            return Err(CryptoError::integrity(
                self.handle,
                "RSA result not reduced modulo n",
            ));
        }

        let bytes = if value.bits() == 0 {
            Vec::new()
        } else {
            value.to_bytes_be()
        };

        if self.is_public_path() {
            Ok(left_pad(bytes, self.modulus_len))
        } else if bytes.len() + 1 == self.modulus_len {
            Ok(left_pad(bytes, self.modulus_len))
        } else {
            Ok(bytes)
        }
    }
}

pub(crate) fn left_pad(bytes: Vec<u8>, len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes;
    }
    let mut padded = vec![0u8; len - bytes.len()];
    padded.extend_from_slice(&bytes);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingTransport, EchoTransport};
    use std::sync::Arc;

    fn key(usage: KeyUsage) -> RemoteKey {
        // 0x00ff_0001 is not prime-based, only the magnitude checks matter here.
        RemoteKey::rsa(
            "rsa",
            usage,
            KeyHandle::new(3),
            BigUint::from(0xff_0001u32),
        )
    }

    #[tokio::test]
    async fn test_rejects_value_at_modulus_without_remote_call() {
        let transport = Arc::new(CountingTransport::new(EchoTransport));
        let engine = RsaEngine::new(
            RemoteContext::new(transport.clone()),
            &key(KeyUsage::Encrypt),
            KeyUsage::Encrypt,
        )
        .unwrap();

        let err = engine.process(&[0xff, 0x00, 0x01]).await.unwrap_err();
        assert!(matches!(err, CryptoError::DataLength(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_accepts_modulus_minus_one() {
        let transport = Arc::new(CountingTransport::new(EchoTransport));
        let engine = RsaEngine::new(
            RemoteContext::new(transport.clone()),
            &key(KeyUsage::Encrypt),
            KeyUsage::Encrypt,
        )
        .unwrap();

        let out = engine.process(&[0xff, 0x00, 0x00]).await.unwrap();
        assert_eq!(out, vec![0xff, 0x00, 0x00]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_encryption_path_strips_one_leading_zero() {
        let engine = RsaEngine::new(
            RemoteContext::new(Arc::new(EchoTransport)),
            &key(KeyUsage::Encrypt),
            KeyUsage::Encrypt,
        )
        .unwrap();

        let out = engine.process(&[0x00, 0x01, 0x02, 0x03]).await.unwrap();
        assert_eq!(out, vec![0x01, 0x02, 0x03]);
    }

    #[tokio::test]
    async fn test_decryption_path_rejects_oversized_block() {
        let engine = RsaEngine::new(
            RemoteContext::new(Arc::new(EchoTransport)),
            &key(KeyUsage::Decrypt),
            KeyUsage::Decrypt,
        )
        .unwrap();

        let err = engine.process(&[0x00, 0x01, 0x02, 0x03]).await.unwrap_err();
        assert!(matches!(err, CryptoError::DataLength(_)));
    }

    #[tokio::test]
    async fn test_decryption_path_pads_short_output_by_one() {
        let engine = RsaEngine::new(
            RemoteContext::new(Arc::new(EchoTransport)),
            &key(KeyUsage::Decrypt),
            KeyUsage::Decrypt,
        )
        .unwrap();

        let out = engine.process(&[0x00, 0x12, 0x34]).await.unwrap();
        assert_eq!(out, vec![0x00, 0x12, 0x34]);

        let out = engine.process(&[0x00, 0x00, 0x34]).await.unwrap();
        assert_eq!(out, vec![0x34]);
    }

    #[test]
    fn test_rejects_symmetric_key() {
        let key = RemoteKey::aes("aes", KeyUsage::Encrypt, KeyHandle::new(1));
        let result = RsaEngine::new(
            RemoteContext::new(Arc::new(EchoTransport)),
            &key,
            KeyUsage::Encrypt,
        );
        assert!(matches!(result, Err(CryptoError::Configuration(_))));
    }
}
