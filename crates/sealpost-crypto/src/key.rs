//! Symmetric key material and session key derivation.

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::CryptoError;

/// Size of an AES-256 key.
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// HKDF salt for envelope key derivation: SHA-256 of the magic/version bytes.
pub const HKDF_SALT: [u8; 32] = [
    0x3d, 0xe3, 0xca, 0x1e, 0x50, 0xcf, 0x62, 0xd8, 0xb6, 0xab, 0xa6, 0x03, 0xa9, 0x6f, 0xca, 0x67,
    0x61, 0x38, 0x7a, 0x7a, 0xc8, 0x6c, 0x3d, 0x3a, 0xfe, 0x85, 0xae, 0x2d, 0x18, 0x12, 0xed, 0xfc,
];

/// 256-bit symmetric key. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy key bytes from a slice.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidKeyLength` unless `bytes` is 32 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array = <[u8; SYMMETRIC_KEY_SIZE]>::try_from(bytes).map_err(|_| {
            CryptoError::InvalidKeyLength { expected: SYMMETRIC_KEY_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(array))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Derive the session key shared with the key authority.
///
/// `shared_secret` is the ECDH output between the client's private key and
/// the authority's public key; key agreement itself happens outside this
/// crate. The same derivation on both sides yields the key that wraps
/// rewrapped payload keys.
pub fn derive_session_key(shared_secret: &[u8]) -> SymmetricKey {
    let hkdf = Hkdf::<Sha256>::new(Some(&HKDF_SALT), shared_secret);

    let mut okm = [0u8; SYMMETRIC_KEY_SIZE];
    let Ok(()) = hkdf.expand(&[], &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    let key = SymmetricKey::new(okm);
    okm.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use sha2::Digest;

    use super::*;

    #[test]
    fn salt_is_hash_of_magic() {
        let digest = Sha256::digest([0x4C, 0x31, 0x4C]);
        assert_eq!(digest.as_slice(), &HKDF_SALT);
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_session_key(b"shared secret");
        let b = derive_session_key(b"shared secret");
        let c = derive_session_key(b"other secret");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn debug_is_redacted() {
        let key = SymmetricKey::new([0x41; 32]);
        assert_eq!(format!("{key:?}"), "SymmetricKey(..)");
    }

    #[test]
    fn from_slice_checks_length() {
        assert_eq!(
            SymmetricKey::from_slice(&[0; 16]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 16 })
        );
        assert!(SymmetricKey::from_slice(&[0; 32]).is_ok());
    }
}
