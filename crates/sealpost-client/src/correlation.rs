//! Pending rewrap exchanges keyed by correlation id.
//!
//! # Invariants
//!
//! - At most one pending exchange per correlation id; a later `put` replaces
//!   the earlier one (last write wins)
//! - `take_and_remove` is single-use: a second take for the same id returns
//!   `None`
//!
//! The table is plain data. The state task owns it, which serializes every
//! access.

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use sealpost_proto::{CorrelationId, Header, Payload, SecureEnvelope};

/// An envelope waiting for its key response.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    /// Parsed envelope.
    pub envelope: SecureEnvelope,
    /// Envelope body as received.
    pub raw: Bytes,
    /// When the rewrap request was registered, milliseconds since the epoch.
    pub created_at_ms: u64,
}

impl PendingExchange {
    /// Envelope header.
    pub fn header(&self) -> &Header {
        &self.envelope.header
    }

    /// Envelope payload.
    pub fn payload(&self) -> &Payload {
        &self.envelope.payload
    }
}

/// Map from correlation id to pending exchange.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: HashMap<CorrelationId, PendingExchange>,
}

impl CorrelationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exchange, returning the one it replaced.
    pub fn put(&mut self, id: CorrelationId, exchange: PendingExchange) -> Option<PendingExchange> {
        self.entries.insert(id, exchange)
    }

    /// Remove and return the exchange for `id`.
    pub fn take_and_remove(&mut self, id: &CorrelationId) -> Option<PendingExchange> {
        self.entries.remove(id)
    }

    /// True if an exchange is pending for `id`.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of pending exchanges.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop exchanges registered more than `ttl` before `now_ms`.
    pub fn expire_older_than(&mut self, now_ms: u64, ttl: Duration) -> Vec<CorrelationId> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expired: Vec<CorrelationId> = self
            .entries
            .iter()
            .filter(|(_, exchange)| now_ms.saturating_sub(exchange.created_at_ms) > ttl_ms)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            self.entries.remove(id);
        }
        expired
    }
}
