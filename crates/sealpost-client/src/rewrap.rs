//! Rewrap handshake: envelope out, key response in.
//!
//! ```text
//! envelope ──► put_pending(id) ──► send [0x03 | header] ──► KAS
//!                                                            │
//! plaintext ◄── Decryptor ◄── take_pending(id) ◄── key response
//! ```
//!
//! The pending exchange is registered before the request leaves, so a key
//! response can never arrive ahead of its exchange.

use std::sync::Arc;

use bytes::Bytes;
use sealpost_proto::{CorrelationId, KeyResponse, MessageType, SecureEnvelope, TransportMessage};

use crate::{
    decrypt::Decryptor, error::EngineError, event::DecryptedMessage, state::StateHandle,
    transport::Transport,
};

/// Result of processing a key response.
#[derive(Debug, Clone)]
pub enum KeyOutcome {
    /// Key granted and payload decrypted.
    Decrypted(Arc<DecryptedMessage>),
    /// Key authority refused.
    Denied {
        /// Correlation id of the denied exchange
        id: CorrelationId,
    },
}

/// Drives the rewrap handshake.
#[derive(Clone)]
pub struct RewrapClient {
    state: StateHandle,
    transport: Arc<dyn Transport>,
    decryptor: Decryptor,
}

impl RewrapClient {
    /// Create a client over the shared state, transport and decryptor.
    pub fn new(state: StateHandle, transport: Arc<dyn Transport>, decryptor: Decryptor) -> Self {
        Self { state, transport, decryptor }
    }

    /// Parse an envelope, register it and request its key.
    ///
    /// A second envelope with the same ephemeral key replaces the first; the
    /// earlier one can no longer be decrypted.
    ///
    /// # Errors
    ///
    /// - `EngineError::Malformed` if the body is not an envelope
    /// - `EngineError::Transport` if the request cannot be sent; the
    ///   exchange stays registered so a resend can still complete it
    pub async fn on_envelope_received(
        &self,
        raw: Bytes,
        type_tag: u8,
    ) -> Result<CorrelationId, EngineError> {
        let envelope = SecureEnvelope::decode(&raw)?;
        let id = envelope.header.ephemeral_key();
        let request = TransportMessage::new(MessageType::Rewrap, envelope.header.encode()).encode();

        if self.state.put_pending(envelope, raw).await? {
            tracing::warn!(%id, "envelope replaced an unanswered exchange");
        }

        self.transport.send(request).await?;
        tracing::debug!(%id, type_tag, "rewrap requested");
        Ok(id)
    }

    /// Match a key response to its exchange and finish it.
    ///
    /// # Errors
    ///
    /// - `EngineError::Malformed` if the body is not a key response
    /// - `EngineError::UnknownCorrelation` if no exchange is pending
    /// - `EngineError::KeyUnwrapFailed` / `EngineError::PayloadDecryptFailed`
    ///   from decryption
    pub async fn on_key_response_received(&self, raw: &[u8]) -> Result<KeyOutcome, EngineError> {
        let response = KeyResponse::decode(raw)?;
        let id = response.id;

        let Some(exchange) = self.state.take_pending(id).await? else {
            return Err(EngineError::UnknownCorrelation { id });
        };

        match response.key {
            None => {
                tracing::info!(%id, "rewrap denied");
                Ok(KeyOutcome::Denied { id })
            },
            Some(wrapped) => self.decryptor.open(exchange, &wrapped).map(KeyOutcome::Decrypted),
        }
    }
}

#[cfg(test)]
mod tests {
    use sealpost_crypto::AesGcmProvider;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        CacheConfig,
        cache::{MemoryStore, MessageCache},
        env::ManualEnv,
        event::Notifier,
        fixtures,
        state::StateTask,
        transport::{ChannelTransport, TransportError},
    };

    fn client() -> (RewrapClient, mpsc::Receiver<Bytes>) {
        let env = ManualEnv::new(0);
        let cache =
            MessageCache::open(CacheConfig::default(), env.clone(), Box::new(MemoryStore::new()))
                .unwrap();
        let (state, _) = StateTask::spawn(cache, env, None, 16);
        let (transport, relay) = ChannelTransport::new(8);
        let decryptor = Decryptor::new(
            Arc::new(AesGcmProvider::new(fixtures::session_key())),
            Notifier::new(8),
        );
        (RewrapClient::new(state, Arc::new(transport), decryptor), relay)
    }

    #[tokio::test]
    async fn envelope_sends_header_as_rewrap_request() {
        let (client, mut relay) = client();
        let envelope = fixtures::envelope(5, b"hello");

        let id = client
            .on_envelope_received(Bytes::from(envelope.encode()), MessageType::Envelope.to_u8())
            .await
            .unwrap();
        assert_eq!(id, fixtures::correlation(5));

        let request = relay.recv().await.unwrap();
        assert_eq!(request[0], 0x03);
        assert_eq!(&request[1..], envelope.header.encode().as_slice());
    }

    #[tokio::test]
    async fn granted_response_decrypts() {
        let (client, _relay) = client();
        client.on_envelope_received(fixtures::envelope_body(5, b"hello"), 0x05).await.unwrap();

        let outcome = client.on_key_response_received(&fixtures::granted(5)).await.unwrap();
        let KeyOutcome::Decrypted(message) = outcome else {
            panic!("expected decrypted outcome");
        };
        assert_eq!(message.plaintext.as_slice(), b"hello");
    }

    #[tokio::test]
    async fn denied_response_consumes_exchange() {
        let (client, _relay) = client();
        client.on_envelope_received(fixtures::envelope_body(5, b"hello"), 0x05).await.unwrap();

        let outcome = client.on_key_response_received(&fixtures::denied(5)).await.unwrap();
        assert!(matches!(outcome, KeyOutcome::Denied { id } if id == fixtures::correlation(5)));

        let again = client.on_key_response_received(&fixtures::granted(5)).await;
        assert!(matches!(again, Err(EngineError::UnknownCorrelation { .. })));
    }

    #[tokio::test]
    async fn malformed_envelope_registers_nothing() {
        let (client, mut relay) = client();
        let err = client.on_envelope_received(Bytes::from_static(b"\x4c\x31"), 0x05).await;
        assert!(matches!(err, Err(EngineError::Malformed(_))));
        assert!(relay.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_failure_is_transport_error() {
        let (client, relay) = client();
        drop(relay);
        let err = client.on_envelope_received(fixtures::envelope_body(5, b"x"), 0x05).await;
        assert!(matches!(err, Err(EngineError::Transport(TransportError::Closed))));

        // Exchange is still registered.
        assert!(client.on_key_response_received(&fixtures::granted(5)).await.is_ok());
    }
}
