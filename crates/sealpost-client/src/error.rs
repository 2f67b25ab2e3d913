//! Engine error taxonomy.
//!
//! Every failure inside message processing ends up as an [`EngineError`] at
//! the task boundary, where it is logged and published as a
//! `ProcessingFailed` notification carrying its [`ReasonCode`].

use sealpost_crypto::CryptoError;
use sealpost_proto::{CorrelationId, ProtocolError};
use thiserror::Error;

use crate::{
    cache::{CacheError, MessageId, StoreError},
    handler::HandlerError,
    transport::TransportError,
};

/// Stable classification of an [`EngineError`], for subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    /// Bytes did not decode.
    MalformedMessage,
    /// Key response with no pending envelope.
    UnknownCorrelation,
    /// Key authority refused access.
    RewrapDenied,
    /// Rewrapped key did not authenticate.
    KeyUnwrapFailed,
    /// Payload did not authenticate.
    PayloadDecryptFailed,
    /// Sending failed.
    Transport,
    /// Message could not be cached.
    CacheFull,
    /// Retry budget exhausted.
    MaxRetriesExceeded,
    /// Domain event handler failed.
    Handler,
    /// Local storage or task failure.
    Internal,
}

/// Errors surfaced by message processing.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input failed to decode.
    #[error("malformed message: {0}")]
    Malformed(#[from] ProtocolError),

    /// No pending exchange for this correlation id. Either the envelope was
    /// never seen, or its response was already consumed.
    #[error("no pending envelope for {id}")]
    UnknownCorrelation {
        /// Correlation id from the key response
        id: CorrelationId,
    },

    /// Key authority denied the rewrap.
    #[error("rewrap denied for {id}")]
    RewrapDenied {
        /// Correlation id from the key response
        id: CorrelationId,
    },

    /// Wrapped key did not authenticate under the session key.
    #[error("key unwrap failed for {id}: {source}")]
    KeyUnwrapFailed {
        /// Correlation id of the exchange
        id: CorrelationId,
        /// Crypto failure
        source: CryptoError,
    },

    /// Payload did not authenticate under the unwrapped key.
    #[error("payload decryption failed for {id}: {source}")]
    PayloadDecryptFailed {
        /// Correlation id of the exchange
        id: CorrelationId,
        /// Crypto failure
        source: CryptoError,
    },

    /// Outbound send failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Message exceeds the whole cache budget.
    #[error("message of {needed} bytes does not fit cache budget of {max} bytes")]
    CacheFull {
        /// Size of the rejected message
        needed: usize,
        /// Configured budget
        max: usize,
    },

    /// Cached message ran out of retries and was removed.
    #[error("message {id} exceeded its retry budget")]
    MaxRetriesExceeded {
        /// Removed entry
        id: MessageId,
    },

    /// Cache entry vanished (expired or removed) before it was used.
    #[error("message {id} is no longer cached")]
    NotCached {
        /// Requested id
        id: MessageId,
    },

    /// Cache persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Domain event handler failed.
    #[error("event handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// The state task is gone; the engine is shutting down.
    #[error("engine state task has stopped")]
    StateClosed,
}

impl EngineError {
    /// Classification for notifications.
    pub fn reason(&self) -> ReasonCode {
        match self {
            Self::Malformed(_) => ReasonCode::MalformedMessage,
            Self::UnknownCorrelation { .. } => ReasonCode::UnknownCorrelation,
            Self::RewrapDenied { .. } => ReasonCode::RewrapDenied,
            Self::KeyUnwrapFailed { .. } => ReasonCode::KeyUnwrapFailed,
            Self::PayloadDecryptFailed { .. } => ReasonCode::PayloadDecryptFailed,
            Self::Transport(_) => ReasonCode::Transport,
            Self::CacheFull { .. } => ReasonCode::CacheFull,
            Self::MaxRetriesExceeded { .. } => ReasonCode::MaxRetriesExceeded,
            Self::Handler(_) => ReasonCode::Handler,
            Self::NotCached { .. } | Self::Store(_) | Self::StateClosed => ReasonCode::Internal,
        }
    }

    /// Correlation id the failure concerns, if any.
    pub fn correlation(&self) -> Option<CorrelationId> {
        match self {
            Self::UnknownCorrelation { id }
            | Self::RewrapDenied { id }
            | Self::KeyUnwrapFailed { id, .. }
            | Self::PayloadDecryptFailed { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Returns true if caching the message and trying again may succeed.
    ///
    /// Only transient conditions qualify. Malformed input and failed
    /// authentication fail identically every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Handler(err) => err.retryable,
            _ => false,
        }
    }
}

impl From<CacheError> for EngineError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Full { needed, max } => Self::CacheFull { needed, max },
            CacheError::MaxRetriesExceeded { id } => Self::MaxRetriesExceeded { id },
            CacheError::NotFound { id } => Self::NotCached { id },
            CacheError::Store(err) => Self::Store(err),
        }
    }
}
