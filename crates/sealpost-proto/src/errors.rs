//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Structural errors raised while decoding envelopes and key responses.
///
/// Every variant means the bytes on the wire are malformed. None of them are
/// retryable: feeding the same bytes again produces the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer ended before a field could be read.
    #[error("truncated {field}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Field being read when the buffer ran out
        field: &'static str,
        /// Bytes required by the field
        expected: usize,
        /// Bytes remaining in the buffer
        actual: usize,
    },

    /// Magic number does not match "L1L".
    #[error("invalid magic number")]
    InvalidMagic,

    /// Declared length of a field is out of range.
    #[error("invalid length for {field}: {len}")]
    InvalidLength {
        /// Field carrying the length prefix
        field: &'static str,
        /// Declared length
        len: usize,
    },

    /// Resource locator protocol byte is not recognised.
    #[error("unknown resource locator protocol: {0:#04x}")]
    UnknownProtocol(u8),

    /// Elliptic curve is not supported (only 33-byte compressed keys are).
    #[error("unsupported curve: {0:#04x}")]
    UnsupportedCurve(u8),

    /// Symmetric cipher identifier is not recognised.
    #[error("unsupported cipher: {0:#04x}")]
    UnsupportedCipher(u8),

    /// Policy type byte is not recognised.
    #[error("unknown policy type: {0:#04x}")]
    UnknownPolicyType(u8),

    /// Key response body is neither a denial nor a full key block.
    #[error("invalid key response length: {0}")]
    InvalidKeyResponse(usize),

    /// Transport message had no type discriminator.
    #[error("empty transport message")]
    EmptyMessage,
}
