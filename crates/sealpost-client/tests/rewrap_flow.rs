//! End-to-end rewrap handshake through the router.

mod common;

use bytes::Bytes;
use common::{
    Harness, correlation, denied_message, envelope, envelope_message, granted_message,
    granted_under,
};
use sealpost_client::{Notification, ReasonCode};
use sealpost_crypto::derive_session_key;
use sealpost_proto::MessageType;

#[tokio::test]
async fn envelope_sends_header_only_rewrap_request() {
    let h = Harness::start();
    let sealed = envelope(1, b"quarterly numbers");

    h.process(envelope_message(1, b"quarterly numbers")).await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][0], MessageType::Rewrap.to_u8());
    assert_eq!(&sent[0][1..], sealed.header.encode().as_slice());
    assert_eq!(h.engine.stats().await.unwrap().pending, 1);
}

#[tokio::test]
async fn granted_response_publishes_plaintext() {
    let mut h = Harness::start();
    h.process(envelope_message(1, b"quarterly numbers")).await;
    h.process(granted_message(1)).await;

    let Notification::Decrypted(message) = h.next_notification().await else {
        panic!("expected decrypted notification");
    };
    assert_eq!(message.plaintext.as_slice(), b"quarterly numbers");
    assert_eq!(message.id, correlation(1));
    assert_eq!(message.policy, message.header.policy().to_bytes());
    assert_eq!(h.engine.stats().await.unwrap().pending, 0);
}

#[tokio::test]
async fn unknown_correlation_is_reported_not_fatal() {
    let mut h = Harness::start();
    h.process(granted_message(2)).await;

    let Notification::ProcessingFailed { reason, correlation: id, message_id, .. } =
        h.next_notification().await
    else {
        panic!("expected processing failure");
    };
    assert_eq!(reason, ReasonCode::UnknownCorrelation);
    assert_eq!(id, Some(correlation(2)));
    assert!(message_id.is_none());

    // Engine keeps working afterwards.
    h.process(envelope_message(3, b"still alive")).await;
    h.process(granted_message(3)).await;
    assert!(matches!(h.next_notification().await, Notification::Decrypted(_)));
}

#[tokio::test]
async fn denied_response_publishes_denial() {
    let mut h = Harness::start();
    h.process(envelope_message(4, b"restricted")).await;
    h.process(denied_message(4)).await;

    assert!(matches!(
        h.next_notification().await,
        Notification::RewrapDenied { id } if id == correlation(4)
    ));
    assert_eq!(h.engine.stats().await.unwrap().pending, 0);
}

#[tokio::test]
async fn response_is_single_use() {
    let mut h = Harness::start();
    h.process(envelope_message(5, b"once")).await;
    h.process(granted_message(5)).await;
    h.process(granted_message(5)).await;

    assert!(matches!(h.next_notification().await, Notification::Decrypted(_)));
    assert!(matches!(
        h.next_notification().await,
        Notification::ProcessingFailed { reason: ReasonCode::UnknownCorrelation, .. }
    ));
}

#[tokio::test]
async fn later_envelope_with_same_key_wins() {
    let mut h = Harness::start();
    h.process(envelope_message(6, b"first")).await;
    h.process(envelope_message(6, b"second")).await;
    assert_eq!(h.transport.sent().len(), 2);
    assert_eq!(h.engine.stats().await.unwrap().pending, 1);

    h.process(granted_message(6)).await;
    let Notification::Decrypted(message) = h.next_notification().await else {
        panic!("expected decrypted notification");
    };
    assert_eq!(message.plaintext.as_slice(), b"second");
}

#[tokio::test]
async fn wrong_session_key_is_unwrap_failure_and_not_cached() {
    let mut h = Harness::start();
    h.process(envelope_message(7, b"secret")).await;
    h.process(granted_under(&derive_session_key(b"impostor"), 7)).await;

    assert!(matches!(
        h.next_notification().await,
        Notification::ProcessingFailed { reason: ReasonCode::KeyUnwrapFailed, message_id: None, .. }
    ));
    assert_eq!(h.engine.stats().await.unwrap().cached, 0);
}

#[tokio::test]
async fn malformed_and_unknown_messages_are_dropped() {
    let mut h = Harness::start();

    h.process(Bytes::new()).await;
    h.process(Bytes::from_static(&[0x7F, 1, 2, 3])).await;
    assert!(h.no_pending_notifications());

    h.process(common::framed(MessageType::Envelope, Bytes::from_static(b"\x4c\x31\x4c\x01"))).await;
    assert!(matches!(
        h.next_notification().await,
        Notification::ProcessingFailed { reason: ReasonCode::MalformedMessage, .. }
    ));
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn kas_public_key_is_forwarded() {
    let mut h = Harness::start();
    h.process(common::framed(MessageType::KasPublicKey, vec![0x02; 33])).await;

    let Notification::KasPublicKey(key) = h.next_notification().await else {
        panic!("expected KAS public key");
    };
    assert_eq!(key.len(), 33);
}

#[tokio::test]
async fn concurrent_deliveries_all_decrypt() {
    let mut h = Harness::start();

    let envelopes: Vec<_> =
        (10..30u8).map(|k| h.engine.deliver(envelope_message(k, &[k; 100]))).collect();
    for task in envelopes {
        task.await.unwrap();
    }
    let responses: Vec<_> = (10..30u8).map(|k| h.engine.deliver(granted_message(k))).collect();
    for task in responses {
        task.await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 10..30u8 {
        let Notification::Decrypted(message) = h.next_notification().await else {
            panic!("expected decrypted notification");
        };
        assert_eq!(message.plaintext.as_slice(), &[message.id.as_bytes()[0]; 100]);
        seen.push(message.id.as_bytes()[0]);
    }
    seen.sort_unstable();
    assert_eq!(seen, (10..30u8).collect::<Vec<_>>());
}
