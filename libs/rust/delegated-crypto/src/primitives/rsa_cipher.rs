//! Raw RSA cipher.

use crate::engine::RsaEngine;
use crate::error::{CryptoError, CryptoResult};
use crate::operation::CipherPrimitive;
use async_trait::async_trait;
use zeroize::Zeroizing;

/// Single-block raw RSA cipher. Input is buffered until `do_final`.
pub struct RsaCipher {
    engine: RsaEngine,
    buffer: Zeroizing<Vec<u8>>,
}

impl RsaCipher {
    /// Create a cipher over `engine`.
    #[must_use]
    pub fn new(engine: RsaEngine) -> Self {
        Self {
            engine,
            buffer: Zeroizing::new(Vec::new()),
        }
    }

    fn absorb(&mut self, input: &[u8]) -> CryptoResult<()> {
        if self.buffer.len() + input.len() > self.engine.max_input_len() {
            self.buffer.clear();
            return Err(CryptoError::data_length("too much data for RSA block"));
        }
        self.buffer.extend_from_slice(input);
        Ok(())
    }
}

#[async_trait]
impl CipherPrimitive for RsaCipher {
    fn name(&self) -> &'static str {
        "RSA"
    }

    async fn update(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.absorb(input)?;
        Ok(Vec::new())
    }

    async fn do_final(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.absorb(input)?;
        let result = self.engine.process(&self.buffer).await;
        self.buffer.clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RemoteContext;
    use crate::key::{KeyHandle, KeyUsage, RemoteKey};
    use crate::test_support::{CountingTransport, EchoTransport};
    use num_bigint::BigUint;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_buffers_until_final() {
        let transport = Arc::new(CountingTransport::new(EchoTransport));
        let key = RemoteKey::rsa(
            "rsa",
            KeyUsage::Encrypt,
            KeyHandle::new(4),
            BigUint::from(0xff_ff_ffu32),
        );
        let engine =
            RsaEngine::new(RemoteContext::new(transport.clone()), &key, KeyUsage::Encrypt).unwrap();
        let mut cipher = RsaCipher::new(engine);

        assert!(cipher.update(&[0x01]).await.unwrap().is_empty());
        assert_eq!(transport.calls(), 0);
        assert_eq!(cipher.do_final(&[0x02]).await.unwrap(), vec![0x00, 0x01, 0x02]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_overflow_is_data_length() {
        let key = RemoteKey::rsa(
            "rsa",
            KeyUsage::Decrypt,
            KeyHandle::new(4),
            BigUint::from(0xff_ff_ffu32),
        );
        let engine =
            RsaEngine::new(RemoteContext::new(Arc::new(EchoTransport)), &key, KeyUsage::Decrypt)
                .unwrap();
        let mut cipher = RsaCipher::new(engine);

        cipher.update(&[0x01, 0x02]).await.unwrap();
        let err = cipher.update(&[0x03, 0x04]).await.unwrap_err();
        assert!(matches!(err, CryptoError::DataLength(_)));
    }
}
