//! Bounded, TTL-limited cache of messages awaiting retry.
//!
//! The cache keeps an in-memory index over a [`CacheStore`]. Every mutation
//! goes to the store in call order; [`MessageCache::flush`] is the barrier
//! for callers that need it on disk.
//!
//! # Invariants
//!
//! - `total_bytes()` equals the summed raw size of live entries and never
//!   exceeds `CacheConfig::max_bytes` after an operation completes
//! - Eviction is FIFO: expired entries go first, then the oldest by
//!   insertion time
//! - An entry's `retry_count` never exceeds `CacheConfig::max_retries`;
//!   reaching it removes the entry
//! - Reads never return an entry older than `CacheConfig::ttl`

mod entry;
mod error;
mod file;
mod store;

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
pub use entry::{CacheFilter, CachedMessage, MessageId, StoredMessage};
pub use error::{CacheError, StoreError};
pub use file::FileStore;
use sealpost_proto::{MessageType, SecureEnvelope};
pub use store::{CacheStore, MemoryStore};
use tokio::sync::oneshot;

use crate::{CacheConfig, env::Environment};

/// Insertion order key: timestamp first, then a per-cache sequence number to
/// break ties between entries stamped in the same millisecond.
type OrderKey = (u64, u64);

struct Slot {
    message: CachedMessage,
    order: OrderKey,
}

/// Message cache with size-bounded FIFO eviction.
pub struct MessageCache<E: Environment> {
    config: CacheConfig,
    env: E,
    store: Box<dyn CacheStore>,
    slots: HashMap<MessageId, Slot>,
    order: BTreeMap<OrderKey, MessageId>,
    total_bytes: usize,
    next_seq: u64,
}

impl<E: Environment> MessageCache<E> {
    /// Open a cache over `store`, loading what it already holds.
    ///
    /// Expired records are deleted from the store, as are records whose
    /// retry count already reached `max_retries` (the limit shrank between
    /// runs). If the loaded records exceed the budget the oldest are evicted
    /// until they fit.
    ///
    /// # Errors
    ///
    /// - `CacheError::Store` if the store cannot be read
    pub fn open(
        config: CacheConfig,
        env: E,
        mut store: Box<dyn CacheStore>,
    ) -> Result<Self, CacheError> {
        let mut records = store.load()?;
        records.sort_by_key(|(id, record)| (record.timestamp, *id));

        let mut cache = Self {
            config,
            env,
            store,
            slots: HashMap::new(),
            order: BTreeMap::new(),
            total_bytes: 0,
            next_seq: 0,
        };

        let now = cache.env.now_millis();
        let mut expired = 0usize;
        let mut exhausted = 0usize;
        for (id, record) in records {
            let message = CachedMessage {
                id,
                envelope: parse_envelope(record.message_type_tag, &record.raw_bytes),
                raw: Bytes::from(record.raw_bytes),
                timestamp_ms: record.timestamp,
                type_tag: record.message_type_tag,
                retry_count: record.retry_count,
            };

            if message.is_expired(now, cache.config.ttl) {
                expired += 1;
                cache.delete_quietly(id);
                continue;
            }
            if message.retry_count >= cache.config.max_retries {
                exhausted += 1;
                cache.delete_quietly(id);
                continue;
            }
            cache.insert(message);
        }

        while cache.total_bytes > cache.config.max_bytes {
            if !cache.evict_oldest() {
                break;
            }
        }

        tracing::info!(
            entries = cache.len(),
            bytes = cache.total_bytes,
            expired,
            exhausted,
            "message cache loaded"
        );
        Ok(cache)
    }

    /// Store a message for later retry and return its id.
    ///
    /// Makes room by purging expired entries and then evicting the oldest
    /// until the message fits.
    ///
    /// # Errors
    ///
    /// - `CacheError::Full` if the message alone exceeds the budget; nothing
    ///   is evicted in that case
    /// - `CacheError::Store` if the record cannot be persisted
    pub fn cache(&mut self, raw: Bytes, type_tag: u8) -> Result<MessageId, CacheError> {
        let needed = raw.len();
        if needed > self.config.max_bytes {
            return Err(CacheError::Full { needed, max: self.config.max_bytes });
        }

        if self.total_bytes + needed > self.config.max_bytes {
            self.purge_expired();
        }
        while self.total_bytes + needed > self.config.max_bytes {
            if !self.evict_oldest() {
                break;
            }
        }

        let id = self.fresh_id();
        let message = CachedMessage {
            id,
            envelope: parse_envelope(type_tag, &raw),
            raw,
            timestamp_ms: self.env.now_millis(),
            type_tag,
            retry_count: 0,
        };

        self.store.save(id, &message.to_record())?;
        tracing::debug!(%id, type_tag, bytes = needed, "message cached");
        self.insert(message);
        Ok(id)
    }

    /// Live (non-expired) entry by id.
    pub fn get(&self, id: MessageId) -> Option<&CachedMessage> {
        let now = self.env.now_millis();
        self.slots
            .get(&id)
            .map(|slot| &slot.message)
            .filter(|message| !message.is_expired(now, self.config.ttl))
    }

    /// Live entries matching `filter`, oldest first.
    pub fn list(&self, filter: &CacheFilter) -> Vec<CachedMessage> {
        let now = self.env.now_millis();
        self.order
            .values()
            .filter_map(|id| self.slots.get(id))
            .map(|slot| &slot.message)
            .filter(|message| !message.is_expired(now, self.config.ttl) && filter.matches(message))
            .cloned()
            .collect()
    }

    /// Remove an entry. Returns it if it was present.
    pub fn remove(&mut self, id: MessageId) -> Option<CachedMessage> {
        let message = self.detach(id)?;
        self.delete_quietly(id);
        Some(message)
    }

    /// Record a failed retry and return the new count.
    ///
    /// # Errors
    ///
    /// - `CacheError::NotFound` if no live entry has this id
    /// - `CacheError::MaxRetriesExceeded` if this failure used up the retry
    ///   budget; the entry has been removed
    /// - `CacheError::Store` if the updated record cannot be persisted
    pub fn increment_retry(&mut self, id: MessageId) -> Result<u32, CacheError> {
        if self.get(id).is_none() {
            return Err(CacheError::NotFound { id });
        }
        let Some(slot) = self.slots.get_mut(&id) else {
            return Err(CacheError::NotFound { id });
        };

        slot.message.retry_count += 1;
        let count = slot.message.retry_count;
        let record = slot.message.to_record();

        if count >= self.config.max_retries {
            self.remove(id);
            tracing::warn!(%id, retries = count, "retry budget exhausted, message dropped");
            return Err(CacheError::MaxRetriesExceeded { id });
        }

        self.store.save(id, &record)?;
        Ok(count)
    }

    /// Remove every expired entry. Returns the removed ids.
    pub fn purge_expired(&mut self) -> Vec<MessageId> {
        let now = self.env.now_millis();
        let ttl = self.config.ttl;
        let expired: Vec<MessageId> = self
            .slots
            .values()
            .filter(|slot| slot.message.is_expired(now, ttl))
            .map(|slot| slot.message.id)
            .collect();

        for id in &expired {
            self.remove(*id);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "purged expired cache entries");
        }
        expired
    }

    /// Summed raw size of all held entries.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of held entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cache limits in effect.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Barrier for queued store writes. See [`CacheStore::flush`].
    pub fn flush(&self) -> Option<oneshot::Receiver<()>> {
        self.store.flush()
    }

    fn fresh_id(&self) -> MessageId {
        loop {
            let id = MessageId::new(self.env.random_u128());
            if !self.slots.contains_key(&id) {
                return id;
            }
        }
    }

    fn insert(&mut self, message: CachedMessage) {
        let order = (message.timestamp_ms, self.next_seq);
        self.next_seq += 1;
        self.total_bytes += message.size();
        self.order.insert(order, message.id);
        if let Some(old) = self.slots.insert(message.id, Slot { message, order }) {
            self.total_bytes -= old.message.size();
            self.order.remove(&old.order);
        }
    }

    fn detach(&mut self, id: MessageId) -> Option<CachedMessage> {
        let slot = self.slots.remove(&id)?;
        self.order.remove(&slot.order);
        self.total_bytes -= slot.message.size();
        Some(slot.message)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, id)) = self.order.pop_first() else {
            return false;
        };
        if let Some(slot) = self.slots.remove(&id) {
            self.total_bytes -= slot.message.size();
            tracing::debug!(%id, bytes = slot.message.size(), "evicted oldest cache entry");
        }
        self.delete_quietly(id);
        true
    }

    fn delete_quietly(&mut self, id: MessageId) {
        if let Err(error) = self.store.delete(id) {
            tracing::error!(%id, %error, "failed to delete cache record");
        }
    }
}

fn parse_envelope(type_tag: u8, raw: &[u8]) -> Option<SecureEnvelope> {
    if type_tag != MessageType::Envelope.to_u8() {
        return None;
    }
    SecureEnvelope::decode(raw).ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::env::ManualEnv;

    const EVENT: u8 = 0x06;

    fn config(max_bytes: usize) -> CacheConfig {
        CacheConfig { max_bytes, ttl: Duration::from_secs(60), max_retries: 3 }
    }

    fn open(max_bytes: usize) -> (MessageCache<ManualEnv>, ManualEnv, MemoryStore) {
        let env = ManualEnv::new(1_000_000);
        let store = MemoryStore::new();
        let cache =
            MessageCache::open(config(max_bytes), env.clone(), Box::new(store.clone())).unwrap();
        (cache, env, store)
    }

    fn body(len: usize) -> Bytes {
        Bytes::from(vec![0xAB; len])
    }

    #[test]
    fn cache_and_get() {
        let (mut cache, _, store) = open(100);
        let id = cache.cache(body(10), EVENT).unwrap();

        let entry = cache.get(id).unwrap();
        assert_eq!(entry.raw, body(10));
        assert_eq!(entry.type_tag, EVENT);
        assert_eq!(entry.retry_count, 0);
        assert!(entry.envelope.is_none());
        assert_eq!(cache.total_bytes(), 10);
        assert_eq!(store.record(id).unwrap().raw_bytes, vec![0xAB; 10]);
    }

    #[test]
    fn oversized_message_rejected_without_eviction() {
        let (mut cache, _, _) = open(100);
        let kept = cache.cache(body(60), EVENT).unwrap();

        assert!(matches!(
            cache.cache(body(101), EVENT),
            Err(CacheError::Full { needed: 101, max: 100 })
        ));
        assert!(cache.get(kept).is_some());
    }

    #[test]
    fn evicts_oldest_first() {
        let (mut cache, env, store) = open(100);
        let first = cache.cache(body(40), EVENT).unwrap();
        env.advance(Duration::from_millis(1));
        let second = cache.cache(body(40), EVENT).unwrap();
        env.advance(Duration::from_millis(1));
        let third = cache.cache(body(40), EVENT).unwrap();

        assert!(cache.get(first).is_none());
        assert!(store.record(first).is_none());
        assert!(cache.get(second).is_some());
        assert!(cache.get(third).is_some());
        assert_eq!(cache.total_bytes(), 80);
    }

    #[test]
    fn same_millisecond_entries_evict_in_insertion_order() {
        let (mut cache, _, _) = open(20);
        let a = cache.cache(body(10), EVENT).unwrap();
        let b = cache.cache(body(10), EVENT).unwrap();
        let c = cache.cache(body(10), EVENT).unwrap();

        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
        assert!(cache.get(c).is_some());
    }

    #[test]
    fn expired_entries_are_invisible_then_purged() {
        let (mut cache, env, store) = open(100);
        let id = cache.cache(body(10), EVENT).unwrap();

        env.advance(Duration::from_secs(61));
        assert!(cache.get(id).is_none());
        assert!(cache.list(&CacheFilter::default()).is_empty());
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.purge_expired(), vec![id]);
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn expired_entries_purged_before_live_ones_evicted() {
        let (mut cache, env, _) = open(100);
        let stale = cache.cache(body(50), EVENT).unwrap();
        env.advance(Duration::from_secs(30));
        let live = cache.cache(body(40), EVENT).unwrap();
        env.advance(Duration::from_secs(31));

        let fresh = cache.cache(body(50), EVENT).unwrap();
        assert!(cache.get(stale).is_none());
        assert!(cache.get(live).is_some());
        assert!(cache.get(fresh).is_some());
        assert_eq!(cache.total_bytes(), 90);
    }

    #[test]
    fn list_filters_by_tag_oldest_first() {
        let (mut cache, env, _) = open(1000);
        let a = cache.cache(body(1), EVENT).unwrap();
        env.advance(Duration::from_millis(5));
        let _other = cache.cache(body(1), 0x05).unwrap();
        env.advance(Duration::from_millis(5));
        let b = cache.cache(body(1), EVENT).unwrap();

        let filter = CacheFilter { type_tag: Some(EVENT), ..CacheFilter::default() };
        let ids: Vec<_> = cache.list(&filter).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn retry_budget_removes_entry_once() {
        let (mut cache, _, store) = open(100);
        let id = cache.cache(body(10), EVENT).unwrap();

        assert_eq!(cache.increment_retry(id).unwrap(), 1);
        assert_eq!(cache.increment_retry(id).unwrap(), 2);
        assert_eq!(store.record(id).unwrap().retry_count, 2);

        assert!(matches!(
            cache.increment_retry(id),
            Err(CacheError::MaxRetriesExceeded { id: gone }) if gone == id
        ));
        assert!(cache.get(id).is_none());
        assert!(store.record(id).is_none());
        assert!(matches!(cache.increment_retry(id), Err(CacheError::NotFound { .. })));
    }

    #[test]
    fn remove_is_idempotent() {
        let (mut cache, _, _) = open(100);
        let id = cache.cache(body(10), EVENT).unwrap();
        assert!(cache.remove(id).is_some());
        assert!(cache.remove(id).is_none());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn reopen_restores_entries_and_drops_expired() {
        let env = ManualEnv::new(1_000_000);
        let store = MemoryStore::new();
        let record = |raw: u8, timestamp: u64, retry_count: u32| StoredMessage {
            raw_bytes: vec![raw; 8],
            timestamp,
            message_type_tag: EVENT,
            retry_count,
        };
        store.insert(MessageId::new(1), record(1, 1_000_000, 2));
        store.insert(MessageId::new(2), record(2, 0, 0));

        let cache = MessageCache::open(config(100), env, Box::new(store.clone())).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(MessageId::new(1)).unwrap().retry_count, 2);
        assert!(store.record(MessageId::new(2)).is_none());
    }

    #[test]
    fn reopen_with_smaller_budget_evicts_oldest() {
        let env = ManualEnv::new(1_000_000);
        let store = MemoryStore::new();
        for i in 0..4u8 {
            store.insert(
                MessageId::new(u128::from(i)),
                StoredMessage {
                    raw_bytes: vec![i; 10],
                    timestamp: 999_000 + u64::from(i),
                    message_type_tag: EVENT,
                    retry_count: 0,
                },
            );
        }

        let cache = MessageCache::open(config(25), env, Box::new(store)).unwrap();
        assert_eq!(cache.total_bytes(), 20);
        assert!(cache.get(MessageId::new(0)).is_none());
        assert!(cache.get(MessageId::new(3)).is_some());
    }

    #[test]
    fn reopen_drops_records_past_a_lowered_retry_budget() {
        let env = ManualEnv::new(1_000_000);
        let store = MemoryStore::new();
        for (i, retry_count) in [(1u128, 2u32), (2, 3), (3, 5)] {
            store.insert(
                MessageId::new(i),
                StoredMessage {
                    raw_bytes: vec![0; 4],
                    timestamp: 1_000_000,
                    message_type_tag: EVENT,
                    retry_count,
                },
            );
        }

        let cache = MessageCache::open(config(100), env, Box::new(store.clone())).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 4);
        assert!(cache.list(&CacheFilter::default()).iter().all(|m| m.retry_count < 3));
        assert!(store.record(MessageId::new(2)).is_none());
        assert!(store.record(MessageId::new(3)).is_none());
    }

    proptest! {
        #[test]
        fn total_bytes_never_exceeds_budget(
            ops in prop::collection::vec((0usize..80, 0u64..40_000, any::<bool>()), 1..64)
        ) {
            let (mut cache, env, store) = open(200);
            let mut ids = Vec::new();

            for (len, step_ms, remove) in ops {
                env.advance(Duration::from_millis(step_ms));
                if remove && !ids.is_empty() {
                    cache.remove(ids.swap_remove(0));
                } else {
                    ids.push(cache.cache(body(len), EVENT).unwrap());
                }

                let held: usize = cache
                    .list(&CacheFilter::default())
                    .iter()
                    .map(CachedMessage::size)
                    .sum();
                prop_assert!(cache.total_bytes() <= 200);
                prop_assert!(held <= cache.total_bytes());
                prop_assert_eq!(store.len(), cache.len());
            }
        }
    }
}
