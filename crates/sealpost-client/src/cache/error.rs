//! Cache and persistence errors.

use thiserror::Error;

use super::MessageId;

/// Failures of the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized.
    #[error("cache record encode failed: {0}")]
    Encode(String),

    /// Record on disk could not be deserialized.
    #[error("cache record decode failed: {0}")]
    Decode(String),

    /// Background writer has stopped; nothing more will reach disk.
    #[error("cache writer is not running")]
    WriterClosed,

    /// A background writer needs a Tokio runtime and none is running.
    #[error("no Tokio runtime available for the cache writer")]
    NoRuntime,
}

/// Errors from [`MessageCache`](super::MessageCache) operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The message alone exceeds the cache budget.
    #[error("message of {needed} bytes exceeds cache budget of {max} bytes")]
    Full {
        /// Size of the rejected message
        needed: usize,
        /// Configured budget
        max: usize,
    },

    /// Retry budget exhausted; the entry has been removed.
    #[error("message {id} exceeded its retry budget")]
    MaxRetriesExceeded {
        /// Removed entry
        id: MessageId,
    },

    /// No live entry with this id.
    #[error("message {id} is not cached")]
    NotFound {
        /// Requested id
        id: MessageId,
    },

    /// Backing store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
