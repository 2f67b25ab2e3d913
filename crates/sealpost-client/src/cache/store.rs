//! Persistence seam for the message cache.
//!
//! The cache calls into a [`CacheStore`] on every mutation. Implementations
//! may apply writes asynchronously, but must apply them in call order so the
//! last write for an id wins.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::oneshot;

use super::{MessageId, StoredMessage, StoreError};

/// Backing store for cache entries.
pub trait CacheStore: Send + 'static {
    /// Read every persisted record. Called once when the cache opens.
    ///
    /// Unreadable records are skipped (and may be deleted) by the
    /// implementation rather than failing the whole load.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` if the store itself cannot be read
    fn load(&mut self) -> Result<Vec<(MessageId, StoredMessage)>, StoreError>;

    /// Create or replace the record for `id`.
    ///
    /// # Errors
    ///
    /// - `StoreError::Encode` if the record cannot be serialized
    /// - `StoreError::WriterClosed` if writes can no longer be applied
    fn save(&mut self, id: MessageId, record: &StoredMessage) -> Result<(), StoreError>;

    /// Delete the record for `id`. Deleting a missing record is not an error.
    ///
    /// # Errors
    ///
    /// - `StoreError::WriterClosed` if writes can no longer be applied
    fn delete(&mut self, id: MessageId) -> Result<(), StoreError>;

    /// Barrier for queued writes.
    ///
    /// Returns a receiver that resolves once every write issued before this
    /// call has been applied, or `None` if writes are already applied.
    fn flush(&self) -> Option<oneshot::Receiver<()>> {
        None
    }
}

/// In-memory store for tests and cache-only deployments.
///
/// Clones share state, so a test can keep a handle and inspect what the
/// cache persisted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<MessageId, StoredMessage>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.records.lock().expect("Mutex poisoned").len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the record for `id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    pub fn record(&self, id: MessageId) -> Option<StoredMessage> {
        self.records.lock().expect("Mutex poisoned").get(&id).cloned()
    }

    /// Insert a record directly, bypassing the cache.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for test code.
    #[allow(clippy::expect_used)]
    pub fn insert(&self, id: MessageId, record: StoredMessage) {
        self.records.lock().expect("Mutex poisoned").insert(id, record);
    }
}

#[allow(clippy::expect_used)]
impl CacheStore for MemoryStore {
    fn load(&mut self) -> Result<Vec<(MessageId, StoredMessage)>, StoreError> {
        let records = self.records.lock().expect("Mutex poisoned");
        Ok(records.iter().map(|(id, record)| (*id, record.clone())).collect())
    }

    fn save(&mut self, id: MessageId, record: &StoredMessage) -> Result<(), StoreError> {
        self.records.lock().expect("Mutex poisoned").insert(id, record.clone());
        Ok(())
    }

    fn delete(&mut self, id: MessageId) -> Result<(), StoreError> {
        self.records.lock().expect("Mutex poisoned").remove(&id);
        Ok(())
    }
}
