//! Concrete primitives driven through the remote block engines.

pub mod block_mode;
pub mod cmac;
pub mod rsa_cipher;
pub mod rsa_signer;

pub use block_mode::{BlockMode, BlockModeCipher};
pub use cmac::Cmac;
pub use rsa_cipher::RsaCipher;
pub use rsa_signer::RsaPkcs1Signer;
