//! Shared builders for unit tests.

use bytes::Bytes;
use sealpost_crypto::{SymmetricKey, derive_session_key, encrypt_payload, wrap_key};
use sealpost_proto::{
    BindingMode, CorrelationId, EccCurve, Header, KeyResponse, MessageType, Payload,
    PayloadConfig, Policy, PolicyBody, Protocol, ResourceLocator, SecureEnvelope,
    TransportMessage,
};

pub(crate) fn session_key() -> SymmetricKey {
    derive_session_key(b"fixture shared secret")
}

pub(crate) fn payload_key() -> SymmetricKey {
    SymmetricKey::new([0x42; 32])
}

pub(crate) fn correlation(key_byte: u8) -> CorrelationId {
    CorrelationId::new([key_byte; 33])
}

/// Envelope whose payload is `plaintext` sealed under [`payload_key`].
pub(crate) fn envelope(key_byte: u8, plaintext: &[u8]) -> SecureEnvelope {
    let binding = BindingMode { ecdsa_binding: false, curve: EccCurve::Secp256r1 };
    let policy = Policy::new(
        PolicyBody::Embedded { encrypted: false, content: b"{\"attr\":[]}".to_vec() },
        vec![0; 8],
    )
    .unwrap();
    let kas = ResourceLocator::new(Protocol::Https, "kas.example").unwrap();
    let config = PayloadConfig::default();
    let header = Header::new(kas, binding, config, policy, correlation(key_byte)).unwrap();

    let iv = [0, 0, key_byte];
    let ciphertext = encrypt_payload(&payload_key(), config, iv, plaintext).unwrap();
    let payload = Payload::new(config, iv, ciphertext, None).unwrap();
    SecureEnvelope { header, payload }
}

pub(crate) fn envelope_body(key_byte: u8, plaintext: &[u8]) -> Bytes {
    Bytes::from(envelope(key_byte, plaintext).encode())
}

pub(crate) fn granted(key_byte: u8) -> Bytes {
    let key = wrap_key(&session_key(), &payload_key(), [key_byte; 12]);
    Bytes::from(KeyResponse { id: correlation(key_byte), key: Some(key) }.encode())
}

pub(crate) fn denied(key_byte: u8) -> Bytes {
    Bytes::from(KeyResponse { id: correlation(key_byte), key: None }.encode())
}

pub(crate) fn framed(kind: MessageType, body: Bytes) -> Bytes {
    TransportMessage::new(kind, body).encode()
}
