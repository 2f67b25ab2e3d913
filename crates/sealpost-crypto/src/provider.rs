//! Crypto collaborator seam.

use sealpost_proto::{Payload, WrappedKey};

use crate::{CryptoError, SymmetricKey};

/// Primitives the engine delegates to.
///
/// The provider owns whatever local key state the unwrap needs (for the
/// default implementation, the session key agreed with the authority).
/// Implementations must be deterministic for a given state: the same inputs
/// either always succeed or always fail.
pub trait CryptoProvider: Send + Sync + 'static {
    /// Unwrap a payload key rewrapped by the authority.
    ///
    /// # Errors
    ///
    /// - `CryptoError::KeyUnwrapFailed` if the tag does not authenticate
    fn unwrap_key(&self, wrapped: &WrappedKey) -> Result<SymmetricKey, CryptoError>;

    /// Decrypt an envelope payload with an unwrapped key.
    ///
    /// # Errors
    ///
    /// - `CryptoError::PayloadDecryptFailed` if the payload does not
    ///   authenticate
    /// - `CryptoError::UnsupportedCipher` if the payload's cipher is not
    ///   available
    fn decrypt(&self, payload: &Payload, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError>;
}
