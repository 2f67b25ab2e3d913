//! Error types for key unwrap and payload decryption.

use thiserror::Error;

/// Errors from the crypto collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Wrapped key failed authentication (wrong session key or tampering).
    #[error("key unwrap failed: {reason}")]
    KeyUnwrapFailed {
        /// Reason for failure
        reason: String,
    },

    /// Payload failed authentication or could not be decrypted.
    #[error("payload decryption failed: {reason}")]
    PayloadDecryptFailed {
        /// Reason for failure
        reason: String,
    },

    /// Cipher has no implementation in this provider.
    #[error("unsupported cipher: {tag_size}-byte tag")]
    UnsupportedCipher {
        /// Tag size requested by the envelope
        tag_size: usize,
    },

    /// Invalid key material length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },
}

impl CryptoError {
    /// Returns true if the failure came from the key unwrap step.
    pub fn is_unwrap_failure(&self) -> bool {
        matches!(self, Self::KeyUnwrapFailed { .. } | Self::InvalidKeyLength { .. })
    }
}
