//! Key unwrap and payload decryption for a completed exchange.

use std::sync::Arc;

use sealpost_crypto::{CryptoProvider, SymmetricKey};
use sealpost_proto::{CorrelationId, WrappedKey};
use zeroize::Zeroizing;

use crate::{
    correlation::PendingExchange,
    error::EngineError,
    event::{DecryptedMessage, Notification, Notifier},
};

/// Turns a pending exchange plus its wrapped key into plaintext.
///
/// # Security
///
/// The unwrapped payload key lives only for the duration of
/// [`open`](Self::open) and is zeroized on drop. Plaintext is published
/// only after both the key and the payload authenticate.
#[derive(Clone)]
pub struct Decryptor {
    crypto: Arc<dyn CryptoProvider>,
    notifier: Notifier,
}

impl Decryptor {
    /// Create a decryptor publishing to `notifier`.
    pub fn new(crypto: Arc<dyn CryptoProvider>, notifier: Notifier) -> Self {
        Self { crypto, notifier }
    }

    /// Unwrap the payload key.
    ///
    /// # Errors
    ///
    /// - `EngineError::KeyUnwrapFailed` if the wrapped key does not
    ///   authenticate
    pub fn unwrap_key(
        &self,
        id: CorrelationId,
        wrapped: &WrappedKey,
    ) -> Result<SymmetricKey, EngineError> {
        self.crypto
            .unwrap_key(wrapped)
            .map_err(|source| EngineError::KeyUnwrapFailed { id, source })
    }

    /// Decrypt the exchange's payload with an unwrapped key.
    ///
    /// # Errors
    ///
    /// - `EngineError::PayloadDecryptFailed` if the payload does not
    ///   authenticate or uses an unsupported cipher
    pub fn decrypt_payload(
        &self,
        id: CorrelationId,
        exchange: &PendingExchange,
        key: &SymmetricKey,
    ) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        self.crypto
            .decrypt(exchange.payload(), key)
            .map(Zeroizing::new)
            .map_err(|source| EngineError::PayloadDecryptFailed { id, source })
    }

    /// Unwrap, decrypt and publish.
    ///
    /// # Errors
    ///
    /// - `EngineError::KeyUnwrapFailed` or
    ///   `EngineError::PayloadDecryptFailed`; nothing is published
    pub fn open(
        &self,
        exchange: PendingExchange,
        wrapped: &WrappedKey,
    ) -> Result<Arc<DecryptedMessage>, EngineError> {
        let id = exchange.header().ephemeral_key();
        let key = self.unwrap_key(id, wrapped)?;
        let plaintext = self.decrypt_payload(id, &exchange, &key)?;

        let message = Arc::new(DecryptedMessage {
            id,
            plaintext,
            policy: exchange.header().policy().to_bytes(),
            header: exchange.envelope.header,
        });

        tracing::debug!(%id, bytes = message.plaintext.len(), "envelope decrypted");
        self.notifier.publish(Notification::Decrypted(Arc::clone(&message)));
        Ok(message)
    }
}
