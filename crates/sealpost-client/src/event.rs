//! Notifications published by the engine.
//!
//! Everything observable leaves the engine through a [`Notifier`]: decrypted
//! plaintext, denials, processing failures and retry exhaustion. Subscribers
//! each get their own `broadcast` receiver; a slow subscriber lags and loses
//! the oldest notifications, it never blocks processing.

use std::sync::Arc;

use bytes::Bytes;
use sealpost_proto::{CorrelationId, Header};
use tokio::sync::broadcast;
use zeroize::Zeroizing;

use crate::{cache::MessageId, error::ReasonCode};

/// A successfully decrypted envelope.
#[derive(Debug)]
pub struct DecryptedMessage {
    /// Correlation id of the exchange that produced it.
    pub id: CorrelationId,
    /// Decrypted payload. Zeroized when the last reference drops.
    pub plaintext: Zeroizing<Vec<u8>>,
    /// Header of the envelope.
    pub header: Header,
    /// Encoded policy section of the header.
    pub policy: Vec<u8>,
}

/// Observable engine output.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Envelope decrypted.
    Decrypted(Arc<DecryptedMessage>),

    /// Key authority refused to rewrap the key for this exchange.
    RewrapDenied {
        /// Correlation id of the denied exchange
        id: CorrelationId,
    },

    /// A message could not be processed.
    ProcessingFailed {
        /// Cache entry holding the message, if it was cached for retry
        message_id: Option<MessageId>,
        /// Correlation id, when the failure concerns a known exchange
        correlation: Option<CorrelationId>,
        /// Failure classification
        reason: ReasonCode,
        /// Human-readable detail
        detail: String,
    },

    /// A cached message ran out of retries and was dropped.
    MaxRetriesExceeded {
        /// Removed cache entry
        message_id: MessageId,
        /// Type tag of the dropped message
        type_tag: u8,
    },

    /// Key authority public key announced by the relay.
    KasPublicKey(Bytes),
}

/// Fan-out point for [`Notification`]s.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier whose subscribers buffer up to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers. Returns how many received it.
    ///
    /// Publishing with no subscribers is not an error; the notification is
    /// simply dropped.
    pub fn publish(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// New receiver. Sees only notifications published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
