//! ECB and CBC block cipher modes over a remote block engine.

use crate::engine::BlockEngine;
use crate::error::{CryptoError, CryptoResult};
use crate::key::KeyUsage;
use crate::operation::CipherPrimitive;
use async_trait::async_trait;
use zeroize::Zeroizing;

/// Block chaining mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockMode {
    /// Electronic codebook
    Ecb,
    /// Cipher block chaining with the given IV
    Cbc {
        /// Initialization vector, one block long
        iv: Vec<u8>,
    },
}

/// Streaming block cipher with optional PKCS#7 padding.
///
/// Whole blocks are sent to the engine as soon as they are available.
/// When decrypting with padding the last whole block is held back until
/// `do_final`, since it may carry the padding.
pub struct BlockModeCipher {
    engine: Box<dyn BlockEngine>,
    mode: BlockMode,
    padding: bool,
    encrypting: bool,
    buffer: Zeroizing<Vec<u8>>,
    chain: Vec<u8>,
}

impl BlockModeCipher {
    /// Create a cipher. Direction follows the engine's key usage.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] if the IV is not one block
    /// long.
    pub fn new(
        engine: impl BlockEngine + 'static,
        mode: BlockMode,
        padding: bool,
    ) -> CryptoResult<Self> {
        let bs = engine.block_size();
        let chain = match &mode {
            BlockMode::Ecb => Vec::new(),
            BlockMode::Cbc { iv } if iv.len() == bs => iv.clone(),
            BlockMode::Cbc { iv } => {
                return Err(CryptoError::configuration(format!(
                    "IV must be {bs} bytes, got {}",
                    iv.len()
                )));
            }
        };

        Ok(Self {
            encrypting: engine.usage() == KeyUsage::Encrypt,
            engine: Box::new(engine),
            mode,
            padding,
            buffer: Zeroizing::new(Vec::new()),
            chain,
        })
    }

    fn block_size(&self) -> usize {
        self.engine.block_size()
    }

    fn reset(&mut self) {
        self.buffer.clear();
        if let BlockMode::Cbc { iv } = &self.mode {
            self.chain.clone_from(iv);
        }
    }

    async fn process_blocks(&mut self, count: usize) -> CryptoResult<Vec<u8>> {
        let bs = self.block_size();
        let mut output = vec![0u8; count * bs];
        let mut block = Zeroizing::new(vec![0u8; bs]);

        for i in 0..count {
            let src = &self.buffer[i * bs..(i + 1) * bs];
            let dst = &mut output[i * bs..(i + 1) * bs];

            match (&self.mode, self.encrypting) {
                (BlockMode::Ecb, _) => {
                    self.engine.process_block(src, 0, dst, 0).await?;
                }
                (BlockMode::Cbc { .. }, true) => {
                    for (b, (s, c)) in block.iter_mut().zip(src.iter().zip(&self.chain)) {
                        *b = s ^ c;
                    }
                    self.engine.process_block(&block, 0, dst, 0).await?;
                    self.chain.copy_from_slice(dst);
                }
                (BlockMode::Cbc { .. }, false) => {
                    self.engine.process_block(src, 0, dst, 0).await?;
                    for (d, c) in dst.iter_mut().zip(&self.chain) {
                        *d ^= c;
                    }
                    self.chain.copy_from_slice(src);
                }
            }
        }

        self.buffer.drain(..count * bs);
        Ok(output)
    }

    async fn finish(&mut self) -> CryptoResult<Vec<u8>> {
        let bs = self.block_size();

        if self.encrypting {
            if self.padding {
                let pad = bs - self.buffer.len() % bs;
                let pad_byte = u8::try_from(pad)
                    .map_err(|_| CryptoError::configuration("block size too large for PKCS#7"))?;
                self.buffer.extend(std::iter::repeat_n(pad_byte, pad));
            } else if self.buffer.len() % bs != 0 {
                return Err(CryptoError::data_length("data not block size aligned"));
            }
            let count = self.buffer.len() / bs;
            return self.process_blocks(count).await;
        }

        if self.buffer.len() % bs != 0 {
            return Err(CryptoError::data_length("data not block size aligned"));
        }
        if self.padding && self.buffer.is_empty() {
            return Err(CryptoError::data_length("no padded block to decrypt"));
        }

        let count = self.buffer.len() / bs;
        let mut output = self.process_blocks(count).await?;
        if self.padding {
            let len = pkcs7_unpadded_len(&output, bs)?;
            output.truncate(len);
        }
        Ok(output)
    }
}

fn pkcs7_unpadded_len(data: &[u8], bs: usize) -> CryptoResult<usize> {
    let pad = usize::from(*data.last().ok_or_else(|| CryptoError::padding("empty block"))?);
    if pad == 0 || pad > bs || pad > data.len() {
        return Err(CryptoError::padding("pad block corrupted"));
    }
    if data[data.len() - pad..].iter().any(|b| usize::from(*b) != pad) {
        return Err(CryptoError::padding("pad block corrupted"));
    }
    Ok(data.len() - pad)
}

#[async_trait]
impl CipherPrimitive for BlockModeCipher {
    fn name(&self) -> &'static str {
        match self.mode {
            BlockMode::Ecb => "block-cipher/ECB",
            BlockMode::Cbc { .. } => "block-cipher/CBC",
        }
    }

    async fn update(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        let bs = self.block_size();
        self.buffer.extend_from_slice(input);

        let mut count = self.buffer.len() / bs;
        if !self.encrypting && self.padding && count > 0 && self.buffer.len() % bs == 0 {
            count -= 1;
        }

        match self.process_blocks(count).await {
            Ok(output) => Ok(output),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    async fn do_final(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.buffer.extend_from_slice(input);
        let result = self.finish().await;
        self.reset();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RemoteContext, SymmetricBlockEngine};
    use crate::key::{KeyHandle, RemoteKey};
    use crate::test_support::XorTransport;
    use std::sync::Arc;

    fn engine(usage: KeyUsage) -> SymmetricBlockEngine {
        let key = RemoteKey::aes("xor", KeyUsage::Encrypt, KeyHandle::new(0x5a))
            .with_inverse(RemoteKey::aes("xor", KeyUsage::Decrypt, KeyHandle::new(0x5a)));
        SymmetricBlockEngine::new(RemoteContext::new(Arc::new(XorTransport)), &key, usage)
            .unwrap()
    }

    #[tokio::test]
    async fn test_cbc_padded_round_trip() {
        let iv = vec![7u8; 16];
        let mut enc = BlockModeCipher::new(
            engine(KeyUsage::Encrypt),
            BlockMode::Cbc { iv: iv.clone() },
            true,
        )
        .unwrap();
        let mut dec =
            BlockModeCipher::new(engine(KeyUsage::Decrypt), BlockMode::Cbc { iv }, true).unwrap();

        let plaintext = b"thirty-three bytes of plain text!";
        let mut ciphertext = enc.update(&plaintext[..20]).await.unwrap();
        assert_eq!(ciphertext.len(), 16);
        ciphertext.extend(enc.do_final(&plaintext[20..]).await.unwrap());
        assert_eq!(ciphertext.len(), 48);

        let mut recovered = dec.update(&ciphertext[..32]).await.unwrap();
        assert_eq!(recovered.len(), 16);
        recovered.extend(dec.do_final(&ciphertext[32..]).await.unwrap());
        assert_eq!(recovered, plaintext);
    }

    #[tokio::test]
    async fn test_unpadded_requires_alignment() {
        let mut enc = BlockModeCipher::new(engine(KeyUsage::Encrypt), BlockMode::Ecb, false).unwrap();
        let err = enc.do_final(b"short").await.unwrap_err();
        assert!(matches!(err, CryptoError::DataLength(_)));

        // state was reset, a fresh aligned message still works
        let out = enc.do_final(&[1u8; 32]).await.unwrap();
        assert_eq!(out.len(), 32);
    }

    #[tokio::test]
    async fn test_bad_padding_is_reported() {
        let mut dec = BlockModeCipher::new(engine(KeyUsage::Decrypt), BlockMode::Ecb, true).unwrap();
        // XOR with 0x5a maps 0x5a to a zero pad byte
        let err = dec.do_final(&[0x5a; 16]).await.unwrap_err();
        assert!(matches!(err, CryptoError::Padding(_)));
    }

    #[test]
    fn test_iv_length_checked() {
        let result = BlockModeCipher::new(
            engine(KeyUsage::Encrypt),
            BlockMode::Cbc { iv: vec![0; 8] },
            true,
        );
        assert!(matches!(result, Err(CryptoError::Configuration(_))));
    }
}
