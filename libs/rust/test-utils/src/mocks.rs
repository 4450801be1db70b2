//! Mock implementations for testing.
//!
//! [`SimulatedKeyService`] stands in for the remote key-holding endpoint and
//! performs the real block transforms, so known-answer vectors pass through
//! the full client stack.

use aes_gcm::aes::Aes128;
use aes_gcm::aes::cipher::generic_array::GenericArray;
use aes_gcm::aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use async_trait::async_trait;
use delegated_crypto::transport::status;
use delegated_crypto::{
    CipherPrimitive, CryptoError, CryptoEvent, CryptoListener, CryptoResult, KeyHandle,
    RemoteResponse, RemoteTransport, TransportError,
};
use num_bigint::BigUint;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

enum SimulatedKey {
    AesEncrypt(Aes128),
    AesDecrypt(Aes128),
    Rsa { modulus: BigUint, exponent: BigUint },
}

enum ScriptedFailure {
    Transport(TransportError),
    Status(u32),
}

/// In-process key service holding AES and RSA keys by handle.
#[derive(Default)]
pub struct SimulatedKeyService {
    keys: Mutex<HashMap<u32, Arc<SimulatedKey>>>,
    failures: Mutex<VecDeque<ScriptedFailure>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl SimulatedKeyService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register an AES-128 key under an encrypt and a decrypt handle.
    #[must_use]
    pub fn with_aes(self, encrypt: KeyHandle, decrypt: KeyHandle, key: &[u8; 16]) -> Self {
        let cipher = Aes128::new(GenericArray::from_slice(key));
        {
            let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
            keys.insert(encrypt.raw(), Arc::new(SimulatedKey::AesEncrypt(cipher.clone())));
            keys.insert(decrypt.raw(), Arc::new(SimulatedKey::AesDecrypt(cipher)));
        }
        self
    }

    /// Register an RSA key pair under a public and a private handle.
    #[must_use]
    pub fn with_rsa(
        self,
        public: KeyHandle,
        private: KeyHandle,
        modulus: &BigUint,
        public_exponent: &BigUint,
        private_exponent: &BigUint,
    ) -> Self {
        {
            let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
            keys.insert(
                public.raw(),
                Arc::new(SimulatedKey::Rsa {
                    modulus: modulus.clone(),
                    exponent: public_exponent.clone(),
                }),
            );
            keys.insert(
                private.raw(),
                Arc::new(SimulatedKey::Rsa {
                    modulus: modulus.clone(),
                    exponent: private_exponent.clone(),
                }),
            );
        }
        self
    }

    /// Fail the next call with a transport error.
    pub fn fail_next(&self, error: TransportError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ScriptedFailure::Transport(error));
    }

    /// Answer the next call with a non-success status.
    pub fn fail_next_with_status(&self, status: u32) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ScriptedFailure::Status(status));
    }

    /// Number of calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn transform(key: &SimulatedKey, block: &[u8]) -> RemoteResponse {
        match key {
            SimulatedKey::AesEncrypt(cipher) | SimulatedKey::AesDecrypt(cipher) => {
                if block.len() != 16 {
                    return RemoteResponse::failure(status::DATA_LENGTH);
                }
                let mut buf = GenericArray::clone_from_slice(block);
                if matches!(key, SimulatedKey::AesEncrypt(_)) {
                    cipher.encrypt_block(&mut buf);
                } else {
                    cipher.decrypt_block(&mut buf);
                }
                RemoteResponse::success(buf.to_vec())
            }
            SimulatedKey::Rsa { modulus, exponent } => {
                let value = BigUint::from_bytes_be(block);
                if &value >= modulus {
                    return RemoteResponse::failure(status::DATA_LENGTH);
                }
                // minimal big-endian encoding, callers restore the width
                RemoteResponse::success(value.modpow(exponent, modulus).to_bytes_be())
            }
        }
    }
}

#[async_trait]
impl RemoteTransport for SimulatedKeyService {
    async fn perform(&self, handle: KeyHandle, block: &[u8]) -> Result<RemoteResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match scripted {
            Some(ScriptedFailure::Transport(e)) => return Err(e),
            Some(ScriptedFailure::Status(code)) => return Ok(RemoteResponse::failure(code)),
            None => {}
        }

        let key = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle.raw())
            .cloned();
        Ok(key.map_or_else(
            || RemoteResponse::failure(status::INVALID_KEY_HANDLE),
            |key| Self::transform(&key, block),
        ))
    }
}

/// Tracks how many primitive calls run at the same time.
#[derive(Debug, Default, Clone)]
pub struct ConcurrencyProbe {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ConcurrencyProbe {
    /// Highest number of overlapping calls observed.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Inputs in the order the primitive received them.
    #[must_use]
    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn observe(&self, input: &[u8], hold: Duration) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input.to_vec());
        tokio::time::sleep(hold).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Input that makes [`ScriptedCipher`] fail.
pub const FAIL_MARKER: &[u8] = b"fail";

/// Cipher that echoes its input, fails on [`FAIL_MARKER`] and reports
/// overlapping calls to a [`ConcurrencyProbe`].
pub struct ScriptedCipher {
    probe: ConcurrencyProbe,
    hold: Duration,
}

impl ScriptedCipher {
    /// Create a cipher holding each call for `hold`.
    #[must_use]
    pub fn new(hold: Duration) -> (Self, ConcurrencyProbe) {
        let probe = ConcurrencyProbe::default();
        (
            Self {
                probe: probe.clone(),
                hold,
            },
            probe,
        )
    }

    async fn process(&self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.probe.observe(input, self.hold).await;
        if input == FAIL_MARKER {
            return Err(CryptoError::internal("scripted failure"));
        }
        Ok(input.to_vec())
    }
}

#[async_trait]
impl CipherPrimitive for ScriptedCipher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn update(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.process(input).await
    }

    async fn do_final(&mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        self.process(input).await
    }
}

/// Listener recording every event it receives.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<CryptoEvent>>,
}

impl RecordingListener {
    /// Create a listener.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<CryptoEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `count` events arrived, or `timeout` elapsed.
    /// Returns the events received.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<CryptoEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let events = self.events();
            if events.len() >= count || Instant::now() >= deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

impl CryptoListener for RecordingListener {
    fn on_event(&self, event: &CryptoEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
