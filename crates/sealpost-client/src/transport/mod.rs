//! Outbound transport seam.
//!
//! The engine only ever sends: rewrap requests go out through a
//! [`Transport`], and inbound bytes are handed to
//! [`Router::deliver`](crate::Router::deliver) by whoever owns the connection.

#[cfg(feature = "quic")]
pub mod quic;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// The connection has been closed.
    #[error("transport closed")]
    Closed,
}

/// Sends encoded transport messages to the relay.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one message (type tag included).
    ///
    /// # Errors
    ///
    /// Any `TransportError`. Failures are retryable: the engine caches the
    /// message that triggered the send.
    async fn send(&self, message: Bytes) -> Result<(), TransportError>;
}

/// Transport backed by a bounded channel.
///
/// The receiving half stands in for the relay: tests drain it directly, and
/// an embedding application can forward it over its own connection.
#[derive(Clone)]
pub struct ChannelTransport {
    outbound: mpsc::Sender<Bytes>,
}

impl ChannelTransport {
    /// Create a transport and the receiver that drains it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (outbound, rx) = mpsc::channel(capacity);
        (Self { outbound }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: Bytes) -> Result<(), TransportError> {
        self.outbound.send(message).await.map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_transport_delivers_in_order() {
        let (transport, mut rx) = ChannelTransport::new(4);
        transport.send(Bytes::from_static(b"a")).await.unwrap();
        transport.send(Bytes::from_static(b"b")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_is_closed() {
        let (transport, rx) = ChannelTransport::new(1);
        drop(rx);
        assert_eq!(transport.send(Bytes::new()).await, Err(TransportError::Closed));
    }
}
