//! Inbound message routing.
//!
//! Each inbound message gets its own task. The task splits off the type
//! tag, dispatches the body, and converts any failure into a log line plus
//! a notification. Nothing escapes the task boundary, so one bad message
//! never affects another.
//!
//! # Retry Path
//!
//! Messages that fail for a retryable reason (transport, or a handler that
//! says so) are cached. The retry scheduler hands them back through
//! [`Router::redeliver`]; success removes the cache entry, failure counts
//! against its retry budget. A cached message is offered at most once at a
//! time: a sweep that fires while an earlier attempt is still running skips
//! it.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use sealpost_proto::{MessageType, TransportMessage};
use tokio::task::JoinHandle;

use crate::{
    cache::MessageId,
    error::EngineError,
    event::{Notification, Notifier},
    handler::DomainEventHandler,
    retry::RetryRequest,
    rewrap::{KeyOutcome, RewrapClient},
    state::StateHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Live,
    Retry(MessageId),
}

/// Dispatches inbound messages by type tag.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

struct Inner {
    rewrap: RewrapClient,
    state: StateHandle,
    notifier: Notifier,
    events: Arc<dyn DomainEventHandler>,
    in_flight: Mutex<HashSet<MessageId>>,
}

/// Marks a cached message as being retried until dropped.
struct InFlight<'a> {
    router: &'a Inner,
    id: MessageId,
}

impl<'a> InFlight<'a> {
    #[allow(clippy::expect_used)]
    fn claim(router: &'a Inner, id: MessageId) -> Option<Self> {
        let claimed = router.in_flight.lock().expect("Mutex poisoned").insert(id);
        claimed.then(|| Self { router, id })
    }
}

impl Drop for InFlight<'_> {
    #[allow(clippy::expect_used)]
    fn drop(&mut self) {
        self.router.in_flight.lock().expect("Mutex poisoned").remove(&self.id);
    }
}

impl Router {
    /// Create a router.
    pub fn new(
        rewrap: RewrapClient,
        state: StateHandle,
        notifier: Notifier,
        events: Arc<dyn DomainEventHandler>,
    ) -> Self {
        let in_flight = Mutex::new(HashSet::new());
        Self { inner: Arc::new(Inner { rewrap, state, notifier, events, in_flight }) }
    }

    /// Process one inbound transport message on its own task.
    pub fn deliver(&self, message: Bytes) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move { router.process(message).await })
    }

    /// Offer a cached message again on its own task.
    pub fn redeliver(&self, request: RetryRequest) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move { router.process_retry(request).await })
    }

    /// Process one inbound transport message on the current task.
    pub async fn process(&self, message: Bytes) {
        match TransportMessage::split(message) {
            Ok(TransportMessage { tag, body }) => self.handle(tag, body, Origin::Live).await,
            Err(error) => tracing::warn!(%error, "dropping empty transport message"),
        }
    }

    /// Offer a cached message again on the current task.
    ///
    /// Returns without doing anything if the same message is already being
    /// retried.
    pub async fn process_retry(&self, request: RetryRequest) {
        let Some(_claim) = InFlight::claim(&self.inner, request.id) else {
            tracing::debug!(id = %request.id, "retry already in flight, skipped");
            return;
        };
        tracing::debug!(id = %request.id, tag = request.type_tag, "retrying cached message");
        self.handle(request.type_tag, request.raw, Origin::Retry(request.id)).await;
    }

    async fn handle(&self, tag: u8, body: Bytes, origin: Origin) {
        let Some(kind) = MessageType::from_u8(tag) else {
            tracing::warn!(tag, bytes = body.len(), "dropping message with unknown type tag");
            if let Origin::Retry(id) = origin {
                self.forget(id).await;
            }
            return;
        };

        match self.dispatch(kind, body.clone()).await {
            Ok(()) => {
                if let Origin::Retry(id) = origin {
                    tracing::info!(%id, ?kind, "cached message processed");
                    self.forget(id).await;
                }
            },
            Err(error) => self.fail(error, tag, body, origin).await,
        }
    }

    async fn dispatch(&self, kind: MessageType, body: Bytes) -> Result<(), EngineError> {
        match kind {
            MessageType::Envelope => {
                self.inner.rewrap.on_envelope_received(body, kind.to_u8()).await?;
            },
            MessageType::RewrappedKey => {
                if let KeyOutcome::Denied { id } =
                    self.inner.rewrap.on_key_response_received(&body).await?
                {
                    self.inner.notifier.publish(Notification::RewrapDenied { id });
                }
            },
            MessageType::Event => self.inner.events.handle(body).await?,
            MessageType::KasPublicKey => {
                tracing::info!(bytes = body.len(), "key authority public key received");
                self.inner.notifier.publish(Notification::KasPublicKey(body));
            },
            MessageType::PublicKey | MessageType::Rewrap => {
                tracing::debug!(?kind, "ignoring message type addressed to the authority");
            },
        }
        Ok(())
    }

    async fn fail(&self, error: EngineError, tag: u8, body: Bytes, origin: Origin) {
        if matches!(error, EngineError::StateClosed) {
            tracing::debug!(tag, "engine shutting down, message dropped");
            return;
        }

        match origin {
            Origin::Live if error.is_retryable() => match self.inner.state.cache(body, tag).await {
                Ok(id) => {
                    tracing::warn!(%id, tag, %error, "processing failed, message cached for retry");
                    self.report(Some(id), &error);
                },
                Err(cache_error) => {
                    tracing::error!(tag, %error, %cache_error, "processing failed, message lost");
                    self.report(None, &error);
                    self.report(None, &cache_error);
                },
            },
            Origin::Live => {
                let correlation = error.correlation();
                tracing::warn!(tag, ?correlation, %error, "processing failed");
                self.report(None, &error);
            },
            Origin::Retry(id) if !error.is_retryable() => {
                tracing::warn!(%id, tag, %error, "retry failed permanently, message dropped");
                self.forget(id).await;
                self.report(Some(id), &error);
            },
            Origin::Retry(id) => match self.inner.state.increment_retry(id).await {
                Ok(retries) => {
                    tracing::warn!(%id, tag, retries, %error, "retry failed");
                    self.report(Some(id), &error);
                },
                Err(EngineError::MaxRetriesExceeded { .. }) => {
                    let notification =
                        Notification::MaxRetriesExceeded { message_id: id, type_tag: tag };
                    self.inner.notifier.publish(notification);
                },
                Err(EngineError::NotCached { .. }) => {
                    tracing::debug!(%id, "retried message is no longer cached");
                },
                Err(other) => {
                    tracing::error!(%id, error = %other, "failed to record retry");
                    self.report(Some(id), &error);
                },
            },
        }
    }

    async fn forget(&self, id: MessageId) {
        if let Err(error) = self.inner.state.remove(id).await {
            tracing::debug!(%id, %error, "could not remove cached message");
        }
    }

    fn report(&self, message_id: Option<MessageId>, error: &EngineError) {
        self.inner.notifier.publish(Notification::ProcessingFailed {
            message_id,
            correlation: error.correlation(),
            reason: error.reason(),
            detail: error.to_string(),
        });
    }
}
