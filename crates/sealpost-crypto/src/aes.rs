//! AES-256-GCM implementation of [`CryptoProvider`].
//!
//! Sealing functions are pure: nonces and IVs are supplied by the caller.
//! They exist for the key authority side and for tests; the engine itself
//! only ever opens.

use aes_gcm::{
    AesGcm, Nonce, TagSize,
    aead::{
        Aead, KeyInit,
        consts::{U12, U13, U14, U15, U16},
    },
    aes::Aes256,
};
use sealpost_proto::{
    KEY_NONCE_SIZE, KEY_TAG_SIZE, PAYLOAD_IV_SIZE, Payload, PayloadConfig, SymmetricCipher,
    WRAPPED_KEY_SIZE, WrappedKey,
};
use zeroize::Zeroize;

use crate::{CryptoError, CryptoProvider, SymmetricKey, key::SYMMETRIC_KEY_SIZE};

/// Provider holding the session key shared with the key authority.
pub struct AesGcmProvider {
    session_key: SymmetricKey,
}

impl AesGcmProvider {
    /// Create a provider from an established session key.
    pub fn new(session_key: SymmetricKey) -> Self {
        Self { session_key }
    }
}

impl CryptoProvider for AesGcmProvider {
    fn unwrap_key(&self, wrapped: &WrappedKey) -> Result<SymmetricKey, CryptoError> {
        let mut sealed = [0u8; WRAPPED_KEY_SIZE + KEY_TAG_SIZE];
        sealed[..WRAPPED_KEY_SIZE].copy_from_slice(&wrapped.wrapped_key);
        sealed[WRAPPED_KEY_SIZE..].copy_from_slice(&wrapped.tag);

        let mut plain = open::<U16>(&self.session_key, &wrapped.nonce, &sealed).map_err(|_| {
            CryptoError::KeyUnwrapFailed { reason: "authentication failed".to_string() }
        })?;

        let key = SymmetricKey::from_slice(&plain);
        plain.zeroize();
        key
    }

    fn decrypt(&self, payload: &Payload, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
        let nonce = payload_nonce(payload.iv());
        let cipher = payload.config().cipher;
        let data = payload.ciphertext();

        let result = match cipher {
            SymmetricCipher::Aes256Gcm96 => open::<U12>(key, &nonce, data),
            SymmetricCipher::Aes256Gcm104 => open::<U13>(key, &nonce, data),
            SymmetricCipher::Aes256Gcm112 => open::<U14>(key, &nonce, data),
            SymmetricCipher::Aes256Gcm120 => open::<U15>(key, &nonce, data),
            SymmetricCipher::Aes256Gcm128 => open::<U16>(key, &nonce, data),
            SymmetricCipher::Aes256Gcm64 => {
                return Err(CryptoError::UnsupportedCipher { tag_size: cipher.tag_size() });
            },
        };

        result.map_err(|_| CryptoError::PayloadDecryptFailed {
            reason: "authentication failed".to_string(),
        })
    }
}

/// Wrap a payload key under the session key (authority side).
pub fn wrap_key(
    session_key: &SymmetricKey,
    payload_key: &SymmetricKey,
    nonce: [u8; KEY_NONCE_SIZE],
) -> WrappedKey {
    let sealed = seal::<U16>(session_key, &nonce, payload_key.as_bytes());

    let mut wrapped_key = [0u8; WRAPPED_KEY_SIZE];
    let mut tag = [0u8; KEY_TAG_SIZE];
    wrapped_key.copy_from_slice(&sealed[..SYMMETRIC_KEY_SIZE]);
    tag.copy_from_slice(&sealed[SYMMETRIC_KEY_SIZE..]);

    WrappedKey { nonce, wrapped_key, tag }
}

/// Encrypt a payload (producer side).
///
/// Returns ciphertext with the tag appended, ready for [`Payload::new`].
///
/// # Errors
///
/// - `CryptoError::UnsupportedCipher` for the 64-bit tag variant
pub fn encrypt_payload(
    key: &SymmetricKey,
    config: PayloadConfig,
    iv: [u8; PAYLOAD_IV_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let nonce = payload_nonce(&iv);
    match config.cipher {
        SymmetricCipher::Aes256Gcm96 => Ok(seal::<U12>(key, &nonce, plaintext)),
        SymmetricCipher::Aes256Gcm104 => Ok(seal::<U13>(key, &nonce, plaintext)),
        SymmetricCipher::Aes256Gcm112 => Ok(seal::<U14>(key, &nonce, plaintext)),
        SymmetricCipher::Aes256Gcm120 => Ok(seal::<U15>(key, &nonce, plaintext)),
        SymmetricCipher::Aes256Gcm128 => Ok(seal::<U16>(key, &nonce, plaintext)),
        SymmetricCipher::Aes256Gcm64 => {
            Err(CryptoError::UnsupportedCipher { tag_size: config.cipher.tag_size() })
        },
    }
}

/// 12-byte AEAD nonce: nine zero bytes followed by the 3-byte payload IV.
fn payload_nonce(iv: &[u8; PAYLOAD_IV_SIZE]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[12 - PAYLOAD_IV_SIZE..].copy_from_slice(iv);
    nonce
}

fn open<T: TagSize>(
    key: &SymmetricKey,
    nonce: &[u8; 12],
    sealed: &[u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    let cipher = AesGcm::<Aes256, U12, T>::new(key.as_bytes().into());
    cipher.decrypt(Nonce::<U12>::from_slice(nonce), sealed)
}

fn seal<T: TagSize>(key: &SymmetricKey, nonce: &[u8; 12], plaintext: &[u8]) -> Vec<u8> {
    let cipher = AesGcm::<Aes256, U12, T>::new(key.as_bytes().into());
    let Ok(sealed) = cipher.encrypt(Nonce::<U12>::from_slice(nonce), plaintext) else {
        unreachable!("AES-GCM encryption cannot fail for in-memory buffers below 64 GiB");
    };
    sealed
}
