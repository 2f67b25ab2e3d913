//! Shared harness for engine integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use sealpost_client::{
    DomainEventHandler, Engine, EngineConfig, HandlerError, ManualEnv, MemoryStore,
    Notification, Transport, TransportError,
};
use sealpost_crypto::{
    AesGcmProvider, SymmetricKey, derive_session_key, encrypt_payload, wrap_key,
};
use sealpost_proto::{
    BindingMode, CorrelationId, EccCurve, Header, KeyResponse, MessageType, Payload,
    PayloadConfig, Policy, PolicyBody, Protocol, ResourceLocator, SecureEnvelope,
    TransportMessage,
};
use tokio::sync::broadcast;

pub const START_MS: u64 = 1_700_000_000_000;

pub fn session_key() -> SymmetricKey {
    derive_session_key(b"integration shared secret")
}

pub fn payload_key() -> SymmetricKey {
    SymmetricKey::new([0x24; 32])
}

pub fn correlation(key_byte: u8) -> CorrelationId {
    CorrelationId::new([key_byte; 33])
}

pub fn envelope(key_byte: u8, plaintext: &[u8]) -> SecureEnvelope {
    let binding = BindingMode { ecdsa_binding: false, curve: EccCurve::Secp256r1 };
    let policy = Policy::new(
        PolicyBody::Remote(ResourceLocator::new(Protocol::Https, "policy.example/p/1").unwrap()),
        vec![0xB1; 8],
    )
    .unwrap();
    let kas = ResourceLocator::new(Protocol::Https, "kas.example").unwrap();
    let config = PayloadConfig::default();
    let header = Header::new(kas, binding, config, policy, correlation(key_byte)).unwrap();

    let iv = [0, 1, key_byte];
    let ciphertext = encrypt_payload(&payload_key(), config, iv, plaintext).unwrap();
    SecureEnvelope { header, payload: Payload::new(config, iv, ciphertext, None).unwrap() }
}

pub fn framed(kind: MessageType, body: impl Into<Bytes>) -> Bytes {
    TransportMessage::new(kind, body).encode()
}

pub fn envelope_message(key_byte: u8, plaintext: &[u8]) -> Bytes {
    framed(MessageType::Envelope, envelope(key_byte, plaintext).encode())
}

pub fn granted_message(key_byte: u8) -> Bytes {
    granted_under(&session_key(), key_byte)
}

pub fn granted_under(session: &SymmetricKey, key_byte: u8) -> Bytes {
    let key = wrap_key(session, &payload_key(), [key_byte; 12]);
    let response = KeyResponse { id: correlation(key_byte), key: Some(key) };
    framed(MessageType::RewrappedKey, response.encode())
}

pub fn denied_message(key_byte: u8) -> Bytes {
    framed(MessageType::RewrappedKey, KeyResponse { id: correlation(key_byte), key: None }.encode())
}

pub fn event_message(body: &'static [u8]) -> Bytes {
    framed(MessageType::Event, Bytes::from_static(body))
}

/// Transport that records what it sends and can be switched off.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Bytes>>>,
    down: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: Bytes) -> Result<(), TransportError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("relay unreachable".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Event handler that fails while `failing` is set.
#[derive(Default)]
pub struct FlakyHandler {
    pub failing: AtomicBool,
    pub permanent: AtomicBool,
    pub handled: AtomicUsize,
}

#[async_trait]
impl DomainEventHandler for FlakyHandler {
    async fn handle(&self, _body: Bytes) -> Result<(), HandlerError> {
        if self.permanent.load(Ordering::SeqCst) {
            return Err(HandlerError::permanent("schema mismatch"));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HandlerError::retryable("database unavailable"));
        }
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub env: ManualEnv,
    pub transport: RecordingTransport,
    pub handler: Arc<FlakyHandler>,
    pub store: MemoryStore,
    pub notifications: broadcast::Receiver<Notification>,
}

impl Harness {
    pub fn start() -> Self {
        Self::with(EngineConfig::default(), MemoryStore::new())
    }

    pub fn with(config: EngineConfig, store: MemoryStore) -> Self {
        let env = ManualEnv::new(START_MS);
        let transport = RecordingTransport::default();
        let handler = Arc::new(FlakyHandler::default());

        let engine = Engine::builder(
            Arc::new(transport.clone()),
            Arc::new(AesGcmProvider::new(session_key())),
        )
        .config(config)
        .env(env.clone())
        .store(store.clone())
        .events(handler.clone())
        .start()
        .unwrap();
        let notifications = engine.subscribe();

        Self { engine, env, transport, handler, store, notifications }
    }

    pub async fn process(&self, message: Bytes) {
        self.engine.router().process(message).await;
    }

    pub async fn next_notification(&mut self) -> Notification {
        tokio::time::timeout(Duration::from_secs(5), self.notifications.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notifier closed")
    }

    pub fn no_pending_notifications(&mut self) -> bool {
        matches!(self.notifications.try_recv(), Err(broadcast::error::TryRecvError::Empty))
    }
}
