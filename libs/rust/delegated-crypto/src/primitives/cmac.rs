//! CMAC (RFC 4493 / SP 800-38B) over a remote block engine.

use crate::engine::BlockEngine;
use crate::error::{CryptoError, CryptoResult};
use crate::key::KeyUsage;
use crate::operation::Authenticator;
use async_trait::async_trait;
use zeroize::Zeroizing;

/// CMAC whose block encryptions run on the remote endpoint.
///
/// Subkeys are derived on first use from a remote encryption of the zero
/// block and kept for the lifetime of the authenticator.
pub struct Cmac {
    engine: Box<dyn BlockEngine>,
    subkeys: Option<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>)>,
    state: Zeroizing<Vec<u8>>,
    buffer: Zeroizing<Vec<u8>>,
}

impl Cmac {
    /// Create a CMAC.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] unless the engine encrypts
    /// 64- or 128-bit blocks.
    pub fn new(engine: impl BlockEngine + 'static) -> CryptoResult<Self> {
        if engine.usage() != KeyUsage::Encrypt {
            return Err(CryptoError::configuration(
                "CMAC requires an encryption engine",
            ));
        }
        let bs = engine.block_size();
        if rb(bs).is_none() {
            return Err(CryptoError::configuration(format!(
                "CMAC does not support {bs} byte blocks"
            )));
        }

        Ok(Self {
            engine: Box::new(engine),
            subkeys: None,
            state: Zeroizing::new(vec![0u8; bs]),
            buffer: Zeroizing::new(Vec::with_capacity(bs)),
        })
    }

    async fn encrypt_block(&self, block: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let mut out = Zeroizing::new(vec![0u8; block.len()]);
        self.engine.process_block(block, 0, &mut out, 0).await?;
        Ok(out)
    }

    async fn absorb(&mut self, block: &[u8]) -> CryptoResult<()> {
        let mut x = Zeroizing::new(self.state.to_vec());
        for (s, b) in x.iter_mut().zip(block) {
            *s ^= b;
        }
        self.state = self.encrypt_block(&x).await?;
        Ok(())
    }

    async fn subkeys(&mut self) -> CryptoResult<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>)> {
        if let Some((k1, k2)) = &self.subkeys {
            return Ok((k1.clone(), k2.clone()));
        }
        let bs = self.engine.block_size();
        let l = self.encrypt_block(&vec![0u8; bs]).await?;
        let k1 = Zeroizing::new(double(&l));
        let k2 = Zeroizing::new(double(&k1));
        self.subkeys = Some((k1.clone(), k2.clone()));
        Ok((k1, k2))
    }

    fn reset(&mut self) {
        self.state.iter_mut().for_each(|b| *b = 0);
        self.buffer.clear();
    }

    async fn finish(&mut self) -> CryptoResult<Vec<u8>> {
        let bs = self.engine.block_size();
        let (k1, k2) = self.subkeys().await?;

        let mut last = Zeroizing::new(self.buffer.to_vec());
        let subkey = if last.len() == bs {
            k1
        } else {
            last.push(0x80);
            last.resize(bs, 0);
            k2
        };
        for (l, k) in last.iter_mut().zip(subkey.iter()) {
            *l ^= k;
        }

        self.absorb(&last).await?;
        Ok(self.state.to_vec())
    }
}

fn rb(block_size: usize) -> Option<u8> {
    match block_size {
        8 => Some(0x1b),
        16 => Some(0x87),
        _ => None,
    }
}

/// Multiply by x in GF(2^n).
fn double(block: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; block.len()];
    let mut carry = 0u8;
    for i in (0..block.len()).rev() {
        out[i] = (block[i] << 1) | carry;
        carry = block[i] >> 7;
    }
    if carry == 1 {
        if let (Some(last), Some(r)) = (out.last_mut(), rb(block.len())) {
            *last ^= r;
        }
    }
    out
}

#[async_trait]
impl Authenticator for Cmac {
    fn name(&self) -> &'static str {
        "CMAC"
    }

    async fn update(&mut self, input: &[u8]) -> CryptoResult<()> {
        let bs = self.engine.block_size();
        self.buffer.extend_from_slice(input);

        // the final block is only known at do_final, keep at least one byte back
        while self.buffer.len() > bs {
            let block = Zeroizing::new(self.buffer[..bs].to_vec());
            if let Err(e) = self.absorb(&block).await {
                self.reset();
                return Err(e);
            }
            self.buffer.drain(..bs);
        }
        Ok(())
    }

    async fn do_final(&mut self) -> CryptoResult<Vec<u8>> {
        let result = self.finish().await;
        self.reset();
        result
    }
}
