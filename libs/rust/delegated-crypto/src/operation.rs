//! Unified crypto operation facade.
//!
//! Ciphers, authenticators and signers are driven through one streaming
//! contract: zero or more `update` calls terminated by `finalize` or
//! `verify`. Every call shape (whole buffer, byte range, caller-supplied
//! output buffer, `process_data`) derives from three range-taking
//! operations.

use crate::error::{CryptoError, CryptoResult};
use async_trait::async_trait;
use subtle::ConstantTimeEq;

/// Check `input[off..off + len]` and return it.
///
/// # Errors
///
/// Returns [`CryptoError::DataLength`] when the range is out of bounds.
pub fn checked_range(input: &[u8], off: usize, len: usize) -> CryptoResult<&[u8]> {
    off.checked_add(len)
        .filter(|end| *end <= input.len())
        .map(|end| &input[off..end])
        .ok_or_else(|| {
            CryptoError::data_length(format!(
                "range {off}+{len} exceeds input of {} bytes",
                input.len()
            ))
        })
}

fn copy_into(bytes: &[u8], output: &mut [u8], out_off: usize) -> CryptoResult<usize> {
    let end = out_off
        .checked_add(bytes.len())
        .filter(|end| *end <= output.len())
        .ok_or_else(|| CryptoError::data_length("output buffer too short"))?;
    output[out_off..end].copy_from_slice(bytes);
    Ok(bytes.len())
}

/// Primitive-agnostic streaming crypto operation.
#[async_trait]
pub trait CryptoOperation: Send {
    /// Feed `input[off..off + len]`, returning any output available now.
    async fn update_range(&mut self, input: &[u8], off: usize, len: usize)
    -> CryptoResult<Vec<u8>>;

    /// Feed the final bytes and terminate, returning the final output.
    async fn finalize_range(
        &mut self,
        input: &[u8],
        off: usize,
        len: usize,
    ) -> CryptoResult<Vec<u8>>;

    /// Terminate in verification mode; `input[off..off + len]` is the
    /// expected tag or signature.
    async fn verify_range(&mut self, input: &[u8], off: usize, len: usize) -> CryptoResult<bool>;

    /// Feed a whole buffer.
    async fn update(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.update_range(input, 0, input.len()).await
    }

    /// Feed a range and write the output into `output[out_off..]`.
    async fn update_into(
        &mut self,
        input: &[u8],
        off: usize,
        len: usize,
        output: &mut [u8],
        out_off: usize,
    ) -> CryptoResult<usize> {
        let bytes = self.update_range(input, off, len).await?;
        copy_into(&bytes, output, out_off)
    }

    /// Feed a whole buffer and terminate.
    async fn finalize(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.finalize_range(input, 0, input.len()).await
    }

    /// Terminate and write the final output into `output[out_off..]`.
    async fn finalize_into(
        &mut self,
        input: &[u8],
        off: usize,
        len: usize,
        output: &mut [u8],
        out_off: usize,
    ) -> CryptoResult<usize> {
        let bytes = self.finalize_range(input, off, len).await?;
        copy_into(&bytes, output, out_off)
    }

    /// Terminate in verification mode against a whole buffer.
    async fn verify(&mut self, input: &[u8]) -> CryptoResult<bool> {
        self.verify_range(input, 0, input.len()).await
    }

    /// Single call shape shared by ciphers, MACs and signers; same as
    /// [`finalize`](Self::finalize).
    async fn process_data(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.finalize(input).await
    }

    /// Range form of [`process_data`](Self::process_data).
    async fn process_data_range(
        &mut self,
        input: &[u8],
        off: usize,
        len: usize,
    ) -> CryptoResult<Vec<u8>> {
        self.finalize_range(input, off, len).await
    }
}

/// Streaming cipher.
#[async_trait]
pub trait CipherPrimitive: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Process bytes, returning output that is ready.
    async fn update(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Process the final bytes and reset.
    async fn do_final(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Message authentication code.
#[async_trait]
pub trait Authenticator: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Absorb bytes.
    async fn update(&mut self, input: &[u8]) -> CryptoResult<()>;

    /// Produce the tag and reset.
    async fn do_final(&mut self) -> CryptoResult<Vec<u8>>;
}

/// Mode a signer was initialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerMode {
    /// Generate signatures
    Sign,
    /// Check signatures
    Verify,
}

/// Digital signature primitive.
#[async_trait]
pub trait SignerPrimitive: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Mode chosen at initialization.
    fn mode(&self) -> SignerMode;

    /// Absorb message bytes.
    fn update(&mut self, input: &[u8]);

    /// Sign the absorbed message and reset.
    async fn generate_signature(&mut self) -> CryptoResult<Vec<u8>>;

    /// Check `signature` against the absorbed message and reset.
    async fn verify_signature(&mut self, signature: &[u8]) -> CryptoResult<bool>;
}

/// Exactly one concrete primitive.
pub enum Primitive {
    /// Cipher
    Cipher(Box<dyn CipherPrimitive>),
    /// Message authentication code
    Authenticator(Box<dyn Authenticator>),
    /// Signer or verifier
    Signer(Box<dyn SignerPrimitive>),
}

impl Primitive {
    /// Name of the bound primitive.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cipher(c) => c.name(),
            Self::Authenticator(a) => a.name(),
            Self::Signer(s) => s.name(),
        }
    }
}

/// Facade bound to exactly one primitive.
pub struct CombinedOperation {
    primitive: Primitive,
}

impl CombinedOperation {
    /// Bind a primitive.
    #[must_use]
    pub const fn new(primitive: Primitive) -> Self {
        Self { primitive }
    }

    /// Bind a cipher.
    #[must_use]
    pub fn cipher(cipher: impl CipherPrimitive + 'static) -> Self {
        Self::new(Primitive::Cipher(Box::new(cipher)))
    }

    /// Bind an authenticator.
    #[must_use]
    pub fn authenticator(mac: impl Authenticator + 'static) -> Self {
        Self::new(Primitive::Authenticator(Box::new(mac)))
    }

    /// Bind a signer.
    #[must_use]
    pub fn signer(signer: impl SignerPrimitive + 'static) -> Self {
        Self::new(Primitive::Signer(Box::new(signer)))
    }

    /// Start a builder that checks the exactly-one-primitive rule.
    #[must_use]
    pub fn builder() -> CombinedOperationBuilder {
        CombinedOperationBuilder::default()
    }

    /// The bound primitive.
    #[must_use]
    pub const fn primitive(&self) -> &Primitive {
        &self.primitive
    }
}

#[async_trait]
impl CryptoOperation for CombinedOperation {
    async fn update_range(
        &mut self,
        input: &[u8],
        off: usize,
        len: usize,
    ) -> CryptoResult<Vec<u8>> {
        let input = checked_range(input, off, len)?;
        match &mut self.primitive {
            Primitive::Cipher(cipher) => cipher.update(input).await,
            Primitive::Authenticator(mac) => {
                mac.update(input).await?;
                Ok(Vec::new())
            }
            Primitive::Signer(signer) => {
                signer.update(input);
                Ok(Vec::new())
            }
        }
    }

    async fn finalize_range(
        &mut self,
        input: &[u8],
        off: usize,
        len: usize,
    ) -> CryptoResult<Vec<u8>> {
        let input = checked_range(input, off, len)?;
        match &mut self.primitive {
            Primitive::Cipher(cipher) => cipher.do_final(input).await,
            Primitive::Authenticator(mac) => {
                mac.update(input).await?;
                mac.do_final().await
            }
            Primitive::Signer(signer) => {
                if signer.mode() != SignerMode::Sign {
                    return Err(CryptoError::unsupported("finalize", signer.name()));
                }
                signer.update(input);
                signer.generate_signature().await
            }
        }
    }

    async fn verify_range(&mut self, input: &[u8], off: usize, len: usize) -> CryptoResult<bool> {
        let expected = checked_range(input, off, len)?;
        match &mut self.primitive {
            Primitive::Cipher(cipher) => Err(CryptoError::unsupported("verify", cipher.name())),
            Primitive::Authenticator(mac) => {
                let tag = mac.do_final().await?;
                Ok(tag.len() == expected.len() && bool::from(tag.ct_eq(expected)))
            }
            Primitive::Signer(signer) => {
                if signer.mode() != SignerMode::Verify {
                    return Err(CryptoError::unsupported("verify", signer.name()));
                }
                signer.verify_signature(expected).await
            }
        }
    }
}

/// Collects primitives and enforces that exactly one is bound.
#[derive(Default)]
pub struct CombinedOperationBuilder {
    primitives: Vec<Primitive>,
}

impl CombinedOperationBuilder {
    /// Add a cipher.
    #[must_use]
    pub fn cipher(mut self, cipher: impl CipherPrimitive + 'static) -> Self {
        self.primitives.push(Primitive::Cipher(Box::new(cipher)));
        self
    }

    /// Add an authenticator.
    #[must_use]
    pub fn authenticator(mut self, mac: impl Authenticator + 'static) -> Self {
        self.primitives
            .push(Primitive::Authenticator(Box::new(mac)));
        self
    }

    /// Add a signer.
    #[must_use]
    pub fn signer(mut self, signer: impl SignerPrimitive + 'static) -> Self {
        self.primitives.push(Primitive::Signer(Box::new(signer)));
        self
    }

    /// Build the facade.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] unless exactly one primitive
    /// was added.
    pub fn build(mut self) -> CryptoResult<CombinedOperation> {
        match self.primitives.len() {
            1 => self
                .primitives
                .pop()
                .map(CombinedOperation::new)
                .ok_or_else(|| CryptoError::internal("primitive vanished")),
            0 => Err(CryptoError::configuration("no primitive bound")),
            n => Err(CryptoError::configuration(format!(
                "{n} primitives bound, expected exactly one"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{EchoCipher, FixedTagMac, RecordingSigner};

    #[test]
    fn test_checked_range() {
        assert_eq!(checked_range(b"abcdef", 2, 3).unwrap(), b"cde");
        assert!(checked_range(b"abc", 2, 2).is_err());
        assert!(checked_range(b"abc", usize::MAX, 2).is_err());
    }

    #[test]
    fn test_builder_requires_exactly_one() {
        assert!(matches!(
            CombinedOperation::builder().build(),
            Err(CryptoError::Configuration(_))
        ));
        assert!(matches!(
            CombinedOperation::builder()
                .cipher(EchoCipher::default())
                .authenticator(FixedTagMac::new(b"tag"))
                .build(),
            Err(CryptoError::Configuration(_))
        ));
        assert!(
            CombinedOperation::builder()
                .signer(RecordingSigner::new(SignerMode::Sign))
                .build()
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_cipher_rejects_verify() {
        let mut op = CombinedOperation::cipher(EchoCipher::default());
        let err = op.verify(b"sig").await.unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_update_into_and_process_data() {
        let mut op = CombinedOperation::cipher(EchoCipher::default());
        let mut out = [0u8; 8];
        let written = op.update_into(b"xxabcx", 2, 3, &mut out, 1).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(&out[1..4], b"abc");

        assert_eq!(op.process_data(b"de").await.unwrap(), b"de");

        let err = op.finalize_into(b"abc", 0, 3, &mut [0u8; 2], 0).await.unwrap_err();
        assert!(matches!(err, CryptoError::DataLength(_)));
    }

    #[tokio::test]
    async fn test_mac_finalize_and_verify() {
        let mut op = CombinedOperation::authenticator(FixedTagMac::new(b"tag"));
        assert!(op.update(b"data").await.unwrap().is_empty());
        assert_eq!(op.finalize(b"more").await.unwrap(), b"tag");
        assert!(op.verify(b"tag").await.unwrap());
        assert!(!op.verify(b"tah").await.unwrap());
        assert!(!op.verify(b"ta").await.unwrap());
    }

    #[tokio::test]
    async fn test_signer_modes() {
        let mut signer = CombinedOperation::signer(RecordingSigner::new(SignerMode::Sign));
        signer.update(b"ab").await.unwrap();
        assert_eq!(signer.finalize(b"cd").await.unwrap(), b"abcd");
        assert!(matches!(
            signer.verify(b"abcd").await,
            Err(CryptoError::UnsupportedOperation { .. })
        ));

        let mut verifier = CombinedOperation::signer(RecordingSigner::new(SignerMode::Verify));
        verifier.update(b"abcd").await.unwrap();
        assert!(verifier.verify(b"abcd").await.unwrap());
        assert!(matches!(
            verifier.finalize(b"").await,
            Err(CryptoError::UnsupportedOperation { .. })
        ));
    }
}
