//! Remote key references and handle resolution.

use crate::error::{CryptoError, CryptoResult};
use num_bigint::BigUint;
use std::fmt;

/// Handle of one key object held by the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHandle(u32);

impl KeyHandle {
    /// Create a handle from its raw value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw handle value as sent on the wire.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Direction a key handle performs on the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    /// Forward cipher direction (RSA public operation)
    Encrypt,
    /// Inverse cipher direction (RSA private operation)
    Decrypt,
    /// Signature generation (RSA private operation)
    Sign,
    /// Signature verification (RSA public operation)
    Verify,
}

impl KeyUsage {
    /// The opposite direction of the same logical key.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Encrypt => Self::Decrypt,
            Self::Decrypt => Self::Encrypt,
            Self::Sign => Self::Verify,
            Self::Verify => Self::Sign,
        }
    }

    /// Whether this usage runs the RSA public (encryption path) operation.
    #[must_use]
    pub const fn is_public_path(self) -> bool {
        matches!(self, Self::Encrypt | Self::Verify)
    }
}

/// Algorithm-specific description of the key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Symmetric block cipher key
    Symmetric {
        /// Cipher block size in bytes
        block_size: usize,
    },
    /// RSA key, only the public modulus is known locally
    Rsa {
        /// Public modulus
        modulus: BigUint,
    },
}

/// Logical key whose operations are delegated to the remote endpoint.
///
/// Encryption and decryption use distinct handles for the same logical
/// key. The handle for the opposite direction, when known, is carried as
/// the `inverse` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteKey {
    label: String,
    usage: KeyUsage,
    handle: Option<KeyHandle>,
    material: KeyMaterial,
    inverse: Option<Box<RemoteKey>>,
}

impl RemoteKey {
    /// Create a key bound to one remote handle.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        usage: KeyUsage,
        handle: KeyHandle,
        material: KeyMaterial,
    ) -> Self {
        Self {
            label: label.into(),
            usage,
            handle: Some(handle),
            material,
            inverse: None,
        }
    }

    /// Create a key whose own handle is not known locally.
    #[must_use]
    pub fn unresolved(label: impl Into<String>, usage: KeyUsage, material: KeyMaterial) -> Self {
        Self {
            label: label.into(),
            usage,
            handle: None,
            material,
            inverse: None,
        }
    }

    /// Create a 128-bit block cipher key (AES).
    #[must_use]
    pub fn aes(label: impl Into<String>, usage: KeyUsage, handle: KeyHandle) -> Self {
        Self::new(label, usage, handle, KeyMaterial::Symmetric { block_size: 16 })
    }

    /// Create an RSA key with the given modulus.
    #[must_use]
    pub fn rsa(
        label: impl Into<String>,
        usage: KeyUsage,
        handle: KeyHandle,
        modulus: BigUint,
    ) -> Self {
        Self::new(label, usage, handle, KeyMaterial::Rsa { modulus })
    }

    /// Attach the key for the opposite direction.
    #[must_use]
    pub fn with_inverse(mut self, inverse: Self) -> Self {
        self.inverse = Some(Box::new(inverse));
        self
    }

    /// Key label used in diagnostics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Direction of this key's own handle.
    #[must_use]
    pub const fn usage(&self) -> KeyUsage {
        self.usage
    }

    /// Key material description.
    #[must_use]
    pub const fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Resolve the concrete handle for `requested`.
    ///
    /// Falls back to the inverse key when this key's own handle is missing
    /// or bound to the other direction.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Configuration`] when neither handle serves
    /// the requested direction.
    pub fn resolve(&self, requested: KeyUsage) -> CryptoResult<KeyHandle> {
        if self.usage == requested {
            if let Some(handle) = self.handle {
                return Ok(handle);
            }
        }

        if let Some(inverse) = &self.inverse {
            if inverse.usage == requested {
                if let Some(handle) = inverse.handle {
                    return Ok(handle);
                }
            }
        }

        Err(CryptoError::configuration(format!(
            "key {} has no handle for {requested:?}",
            self.label
        )))
    }
}
