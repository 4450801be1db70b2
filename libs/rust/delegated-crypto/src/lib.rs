//! Client-side cryptographic operations whose key material stays on a
//! remote key-holding service.
//!
//! Modes, padding, MAC chaining and signature encoding run locally; each
//! primitive block transform is delegated to the remote endpoint over a
//! [`RemoteTransport`], one block per round trip.
//!
//! Operations are exposed through one streaming facade,
//! [`CombinedOperation`], and can be run asynchronously either as ordered
//! streams ([`OrderedCryptoQueue`]) or as independent single-shot calls
//! ([`AsyncCryptoOperation`]) on a shared bounded [`WorkerPool`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use delegated_crypto::{DelegationClient, DelegationConfig, KeyUsage, RemoteKey, KeyHandle};
//!
//! let client = DelegationClient::new(DelegationConfig::from_env(), transport)?;
//! let key = RemoteKey::aes("session-key", KeyUsage::Encrypt, KeyHandle::new(7));
//! let queue = client.ordered(client.cmac(&key)?);
//! queue.update(b"chunk", None);
//! queue.finalize(b"", Some("mac-1".into()));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod key;
pub mod metrics;
pub mod operation;
pub mod pool;
pub mod primitives;
pub mod queue;
pub mod single_shot;
pub mod task;
pub mod tracing_config;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::DelegationClient;
pub use config::{ConfigValidationError, DelegationConfig};
pub use engine::{BlockEngine, RemoteContext, RsaEngine, SymmetricBlockEngine};
pub use error::{CryptoError, CryptoResult, TransportError};
pub use event::{
    AccumulatingListener, CryptoEvent, CryptoListener, Discriminator, EventKind, ListenerSet,
    SessionId,
};
pub use key::{KeyHandle, KeyMaterial, KeyUsage, RemoteKey};
pub use metrics::CryptoMetrics;
pub use operation::{
    Authenticator, CipherPrimitive, CombinedOperation, CombinedOperationBuilder, CryptoOperation,
    Primitive, SignerMode, SignerPrimitive,
};
pub use pool::{TaskHandle, WorkerPool};
pub use primitives::{BlockMode, BlockModeCipher, Cmac, RsaCipher, RsaPkcs1Signer};
pub use queue::{OrderedCryptoQueue, QueueState};
pub use single_shot::AsyncCryptoOperation;
pub use task::{TaskKind, TaskOutcome};
pub use tracing_config::{LOG_TARGET, LogFormat, TracingConfig, init_tracing};
pub use transport::{RemoteResponse, RemoteTransport, status};
