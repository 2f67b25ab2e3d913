//! Application hook for domain events.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failure reported by a [`DomainEventHandler`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct HandlerError {
    /// Whether the event should be cached and offered again later.
    pub retryable: bool,
    /// Human-readable cause.
    pub reason: String,
}

impl HandlerError {
    /// A failure worth retrying (the handler's dependency was unavailable).
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self { retryable: true, reason: reason.into() }
    }

    /// A failure that will not go away on retry.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self { retryable: false, reason: reason.into() }
    }
}

/// Receives domain event bodies (type tag `0x06`).
///
/// The engine does not interpret event bodies. A retryable failure caches
/// the event for the retry sweep; a permanent one drops it.
#[async_trait]
pub trait DomainEventHandler: Send + Sync + 'static {
    /// Handle one event body.
    async fn handle(&self, body: Bytes) -> Result<(), HandlerError>;
}

/// Handler that accepts every event and only logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl DomainEventHandler for LoggingEventHandler {
    async fn handle(&self, body: Bytes) -> Result<(), HandlerError> {
        tracing::info!(bytes = body.len(), "domain event received");
        Ok(())
    }
}
