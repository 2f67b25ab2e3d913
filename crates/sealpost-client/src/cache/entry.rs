//! Cache entries and their persisted form.

use std::{fmt, str::FromStr, time::Duration};

use bytes::Bytes;
use sealpost_proto::SecureEnvelope;
use serde::{Deserialize, Serialize};

/// Cache entry identifier: 128 random bits, rendered as 32 lowercase hex
/// characters. The rendering doubles as the file stem on disk.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u128);

impl MessageId {
    /// Wrap a raw id.
    pub const fn new(value: u128) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

impl FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16).map(Self)
    }
}

/// A message held for retry.
#[derive(Debug, Clone)]
pub struct CachedMessage {
    /// Entry id.
    pub id: MessageId,
    /// Message body as received, without the type tag.
    pub raw: Bytes,
    /// Insertion time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Transport type tag the body arrived under.
    pub type_tag: u8,
    /// Failed retries so far.
    pub retry_count: u32,
    /// Parsed form, present when the body is a well-formed envelope.
    pub envelope: Option<SecureEnvelope>,
}

impl CachedMessage {
    /// Bytes this entry counts against the cache budget.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// True once the entry is older than `ttl`.
    pub fn is_expired(&self, now_ms: u64, ttl: Duration) -> bool {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        now_ms.saturating_sub(self.timestamp_ms) > ttl_ms
    }

    pub(crate) fn to_record(&self) -> StoredMessage {
        StoredMessage {
            raw_bytes: self.raw.to_vec(),
            timestamp: self.timestamp_ms,
            message_type_tag: self.type_tag,
            retry_count: self.retry_count,
        }
    }
}

/// On-disk record, one CBOR file per entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message body.
    #[serde(with = "serde_bytes")]
    pub raw_bytes: Vec<u8>,
    /// Insertion time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Transport type tag.
    pub message_type_tag: u8,
    /// Failed retries so far.
    pub retry_count: u32,
}

/// Selection for [`MessageCache::list`](super::MessageCache::list).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheFilter {
    /// Only entries with this type tag.
    pub type_tag: Option<u8>,
    /// Only entries with fewer failed retries than this.
    pub max_retry_count: Option<u32>,
}

impl CacheFilter {
    pub(crate) fn matches(&self, entry: &CachedMessage) -> bool {
        self.type_tag.is_none_or(|tag| entry.type_tag == tag)
            && self.max_retry_count.is_none_or(|max| entry.retry_count < max)
    }
}
