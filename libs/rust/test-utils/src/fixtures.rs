//! Known-answer fixtures.
//!
//! AES vectors are from FIPS-197 appendix C and NIST SP 800-38A, CMAC
//! vectors from RFC 4493. The RSA key is a throwaway 1024-bit test key.

use delegated_crypto::{KeyHandle, KeyUsage, RemoteKey};
use num_bigint::BigUint;

/// FIPS-197 C.1 key.
pub const AES_FIPS197_KEY: &str = "000102030405060708090a0b0c0d0e0f";
/// FIPS-197 C.1 plaintext.
pub const AES_FIPS197_PLAINTEXT: &str = "00112233445566778899aabbccddeeff";
/// FIPS-197 C.1 ciphertext.
pub const AES_FIPS197_CIPHERTEXT: &str = "69c4e0d86a7b0430d8cdb78070b4c55a";

/// Key shared by the SP 800-38A and RFC 4493 vectors.
pub const AES_NIST_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";

/// SP 800-38A F.2.1 IV.
pub const CBC_IV: &str = "000102030405060708090a0b0c0d0e0f";
/// SP 800-38A F.2.1 first two plaintext blocks.
pub const CBC_PLAINTEXT: &str = "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51";
/// SP 800-38A F.2.1 first two ciphertext blocks.
pub const CBC_CIPHERTEXT: &str = "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2";

/// RFC 4493 example messages and tags, as `(message, tag)`.
pub const CMAC_VECTORS: [(&str, &str); 4] = [
    ("", "bb1d6929e95937287fa37d129b756746"),
    (
        "6bc1bee22e409f96e93d7e117393172a",
        "070a16b46b4d4144f79bdd9dd04a287c",
    ),
    (
        "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e5130c81c46a35ce411",
        "dfa66747de9ae63030ca32611497c827",
    ),
    (
        "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e5130c81c46a35ce411e5fbc1191a0a52eff69f2445df4f9b17ad2b417be66c3710",
        "51f0bebf7e3b9d92fc49741779363cfe",
    ),
];

const RSA_MODULUS: &str = "cdfa9a5922778614d1a0b14ce4cfbc5fc84575f8c868b88b0478bc25b4dfe9329048879616a51ad573674326612ece2c147d9802086078522e13931b43171796a85a328783324886f05d9272e3e79a2255613fe9b9c2e4a24178be9b2f5d0aa179f75c64b5a9a8890cbba99914604e446a7efd1b0a8699f11c2a8dad03b57b23";
const RSA_PRIVATE_EXPONENT: &str = "8b5a09e657cd2927189370a02704ebda99317518b4ed343cc8efadca8cce17849fdc91ee56afa8b1d3fb7e908e9b0ddd0097dfa93065a3c1656ed4cd52dc6295d0b1df9594b9269eecbe320b31255a66103f95e580e9ef72b14773263a7e3c70ef9b2346a0720f0ca2c861d70d68883801d3a7a83280c05acc9546e4863f1de1";

/// Message signed by [`RSA_SIGNATURE`].
pub const RSA_SIGNED_MESSAGE: &[u8] = b"delegated signature";
/// SHA-256 PKCS#1 v1.5 signature of [`RSA_SIGNED_MESSAGE`] under the test key.
pub const RSA_SIGNATURE: &str = "67ae7467c30be17052541a30d714a45467c23a8d78ed86a7407aa7b88280dbc262b026f364eb389cce831369887b5158ac4ca366d4a1673fd54bb37acdae8f9b245493fd6bf8a2d274ced06d7c89a52953df9ddef9150002d58ea7de6879c38aa0ed891148dc52d2ccca877dbfb977f3011231b3472a62cf3b08edbdbbf1dc9b";

/// Handle of the AES encrypt key registered by the fixtures.
pub const AES_ENCRYPT_HANDLE: KeyHandle = KeyHandle::new(0x0100);
/// Handle of the AES decrypt key registered by the fixtures.
pub const AES_DECRYPT_HANDLE: KeyHandle = KeyHandle::new(0x0101);
/// Handle of the RSA public key registered by the fixtures.
pub const RSA_PUBLIC_HANDLE: KeyHandle = KeyHandle::new(0x0200);
/// Handle of the RSA private key registered by the fixtures.
pub const RSA_PRIVATE_HANDLE: KeyHandle = KeyHandle::new(0x0201);

/// Decode a hex string.
///
/// # Panics
///
/// Panics on malformed input.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn hex(s: &str) -> Vec<u8> {
    assert!(s.len() % 2 == 0, "odd hex length");
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

/// Test RSA key pair.
#[derive(Debug, Clone)]
pub struct RsaTestKey {
    /// Modulus
    pub modulus: BigUint,
    /// Public exponent
    pub public_exponent: BigUint,
    /// Private exponent
    pub private_exponent: BigUint,
}

impl RsaTestKey {
    /// The 1024-bit fixture key.
    #[must_use]
    pub fn load() -> Self {
        Self {
            modulus: BigUint::from_bytes_be(&hex(RSA_MODULUS)),
            public_exponent: BigUint::from(65_537u32),
            private_exponent: BigUint::from_bytes_be(&hex(RSA_PRIVATE_EXPONENT)),
        }
    }

    /// Remote key pair: the private key with the public key as its inverse.
    #[must_use]
    pub fn private_remote_key(&self) -> RemoteKey {
        RemoteKey::rsa("rsa-test", KeyUsage::Sign, RSA_PRIVATE_HANDLE, self.modulus.clone())
            .with_inverse(self.public_remote_key())
    }

    /// Remote public key.
    #[must_use]
    pub fn public_remote_key(&self) -> RemoteKey {
        RemoteKey::rsa("rsa-test", KeyUsage::Verify, RSA_PUBLIC_HANDLE, self.modulus.clone())
    }

    /// The same handles bound to the cipher directions.
    #[must_use]
    pub fn cipher_remote_key(&self) -> RemoteKey {
        RemoteKey::rsa("rsa-test", KeyUsage::Decrypt, RSA_PRIVATE_HANDLE, self.modulus.clone())
            .with_inverse(RemoteKey::rsa(
                "rsa-test",
                KeyUsage::Encrypt,
                RSA_PUBLIC_HANDLE,
                self.modulus.clone(),
            ))
    }
}

/// Remote AES key pair: the encrypt key with the decrypt key as its inverse.
#[must_use]
pub fn aes_remote_key() -> RemoteKey {
    RemoteKey::aes("aes-test", KeyUsage::Encrypt, AES_ENCRYPT_HANDLE)
        .with_inverse(RemoteKey::aes("aes-test", KeyUsage::Decrypt, AES_DECRYPT_HANDLE))
}
