//! RSASSA-PKCS1-v1_5 with SHA-256.

use crate::engine::RsaEngine;
use crate::engine::rsa::left_pad;
use crate::error::{CryptoError, CryptoResult};
use crate::operation::{SignerMode, SignerPrimitive};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// DER prefix of the SHA-256 `DigestInfo`.
const SHA256_DIGEST_INFO: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
    0x00, 0x04, 0x20,
];

/// PKCS#1 v1.5 signer. The digest is computed locally, the RSA transform
/// runs on the remote endpoint.
pub struct RsaPkcs1Signer {
    engine: RsaEngine,
    mode: SignerMode,
    digest: Sha256,
}

impl RsaPkcs1Signer {
    /// Create a signer.
    ///
    /// The engine must run the private operation for [`SignerMode::Sign`]
    /// and the public operation for [`SignerMode::Verify`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] if the engine direction does
    /// not match `mode` or the modulus cannot hold the encoded digest.
    pub fn new(engine: RsaEngine, mode: SignerMode) -> CryptoResult<Self> {
        let public = engine.is_public_path();
        if public != (mode == SignerMode::Verify) {
            return Err(CryptoError::configuration(format!(
                "RSA engine direction does not match signer mode {mode:?}"
            )));
        }
        if engine.modulus_len() < SHA256_DIGEST_INFO.len() + 32 + 11 {
            return Err(CryptoError::configuration(
                "RSA modulus too short for SHA-256 PKCS#1 signatures",
            ));
        }

        Ok(Self {
            engine,
            mode,
            digest: Sha256::new(),
        })
    }

    fn encoded_message(&mut self) -> Vec<u8> {
        let hash = self.digest.finalize_reset();
        let k = self.engine.modulus_len();
        let t_len = SHA256_DIGEST_INFO.len() + hash.len();

        let mut em = Vec::with_capacity(k);
        em.extend_from_slice(&[0x00, 0x01]);
        em.resize(k - t_len - 1, 0xff);
        em.push(0x00);
        em.extend_from_slice(&SHA256_DIGEST_INFO);
        em.extend_from_slice(&hash);
        em
    }
}

#[async_trait]
impl SignerPrimitive for RsaPkcs1Signer {
    fn name(&self) -> &'static str {
        "SHA256withRSA"
    }

    fn mode(&self) -> SignerMode {
        self.mode
    }

    fn update(&mut self, input: &[u8]) {
        self.digest.update(input);
    }

    async fn generate_signature(&mut self) -> CryptoResult<Vec<u8>> {
        let em = self.encoded_message();
        let signature = self.engine.process(&em).await?;
        Ok(left_pad(signature, self.engine.modulus_len()))
    }

    async fn verify_signature(&mut self, signature: &[u8]) -> CryptoResult<bool> {
        let expected = self.encoded_message();
        if signature.len() != self.engine.modulus_len() {
            return Ok(false);
        }

        let recovered = match self.engine.process(signature).await {
            Ok(recovered) => recovered,
            Err(CryptoError::DataLength(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(recovered.len() == expected.len() && bool::from(recovered.ct_eq(&expected)))
    }
}
