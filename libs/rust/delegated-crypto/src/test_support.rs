//! Doubles shared by the unit tests.

use crate::error::{CryptoError, CryptoResult, TransportError};
use crate::key::KeyHandle;
use crate::operation::{Authenticator, CipherPrimitive, SignerMode, SignerPrimitive};
use crate::transport::{RemoteResponse, RemoteTransport};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Returns every block unchanged.
pub struct EchoTransport;

#[async_trait]
impl RemoteTransport for EchoTransport {
    async fn perform(&self, _handle: KeyHandle, block: &[u8]) -> Result<RemoteResponse, TransportError> {
        Ok(RemoteResponse::success(block.to_vec()))
    }
}

/// XORs every byte with the low byte of the key handle. Self-inverse.
pub struct XorTransport;

#[async_trait]
impl RemoteTransport for XorTransport {
    async fn perform(&self, handle: KeyHandle, block: &[u8]) -> Result<RemoteResponse, TransportError> {
        let key = handle.raw().to_le_bytes()[0];
        Ok(RemoteResponse::success(block.iter().map(|b| b ^ key).collect()))
    }
}

/// Counts calls to the wrapped transport.
pub struct CountingTransport<T> {
    inner: T,
    calls: AtomicUsize,
}

impl<T> CountingTransport<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: RemoteTransport> RemoteTransport for CountingTransport<T> {
    async fn perform(&self, handle: KeyHandle, block: &[u8]) -> Result<RemoteResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.perform(handle, block).await
    }
}

/// Cipher returning its input. Fails on the input `fail`, panics on `panic`.
#[derive(Default)]
pub struct EchoCipher;

impl EchoCipher {
    fn echo(input: &[u8]) -> CryptoResult<Vec<u8>> {
        assert!(input != b"panic", "scripted panic");
        if input == b"fail" {
            return Err(CryptoError::internal("scripted failure"));
        }
        Ok(input.to_vec())
    }
}

#[async_trait]
impl CipherPrimitive for EchoCipher {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn update(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        Self::echo(input)
    }

    async fn do_final(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        Self::echo(input)
    }
}

/// MAC that always produces the same tag.
pub struct FixedTagMac {
    tag: Vec<u8>,
}

impl FixedTagMac {
    pub fn new(tag: &[u8]) -> Self {
        Self { tag: tag.to_vec() }
    }
}

#[async_trait]
impl Authenticator for FixedTagMac {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn update(&mut self, _input: &[u8]) -> CryptoResult<()> {
        Ok(())
    }

    async fn do_final(&mut self) -> CryptoResult<Vec<u8>> {
        Ok(self.tag.clone())
    }
}

/// Signer whose signature is the message itself.
pub struct RecordingSigner {
    mode: SignerMode,
    message: Vec<u8>,
}

impl RecordingSigner {
    pub const fn new(mode: SignerMode) -> Self {
        Self {
            mode,
            message: Vec::new(),
        }
    }
}

#[async_trait]
impl SignerPrimitive for RecordingSigner {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn mode(&self) -> SignerMode {
        self.mode
    }

    fn update(&mut self, input: &[u8]) {
        self.message.extend_from_slice(input);
    }

    async fn generate_signature(&mut self) -> CryptoResult<Vec<u8>> {
        Ok(std::mem::take(&mut self.message))
    }

    async fn verify_signature(&mut self, signature: &[u8]) -> CryptoResult<bool> {
        Ok(std::mem::take(&mut self.message) == signature)
    }
}

#[derive(Default)]
struct GateState {
    entered: AtomicBool,
    open: Notify,
}

/// Controls a [`GatedCipher`].
#[derive(Clone)]
pub struct Gate(Arc<GateState>);

impl Gate {
    /// Whether an update is waiting at the gate.
    pub fn entered(&self) -> bool {
        self.0.entered.load(Ordering::SeqCst)
    }

    /// Let one waiting update through.
    pub fn release(&self) {
        self.0.open.notify_one();
    }
}

/// Echo cipher whose updates block until the gate is released.
pub struct GatedCipher(Arc<GateState>);

impl GatedCipher {
    pub fn new() -> (Self, Gate) {
        let state = Arc::new(GateState::default());
        (Self(Arc::clone(&state)), Gate(state))
    }
}

#[async_trait]
impl CipherPrimitive for GatedCipher {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn update(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.0.entered.store(true, Ordering::SeqCst);
        self.0.open.notified().await;
        Ok(input.to_vec())
    }

    async fn do_final(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(input.to_vec())
    }
}
