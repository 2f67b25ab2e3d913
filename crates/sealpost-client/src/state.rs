//! State task: sole owner of the correlation table and the message cache.
//!
//! Message tasks run concurrently, but every read or write of shared state
//! is a command processed one at a time by this task. That makes each
//! operation linearizable without locks: a `take_pending` either sees a
//! `put_pending` completely or not at all.
//!
//! ```text
//! message tasks ──► StateHandle ──mpsc──► StateTask { CorrelationTable, MessageCache }
//!                        ▲                          │
//!                        └───────── oneshot ────────┘
//! ```

use std::time::Duration;

use bytes::Bytes;
use sealpost_proto::{CorrelationId, SecureEnvelope};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    cache::{CacheError, CacheFilter, CachedMessage, MessageCache, MessageId},
    correlation::{CorrelationTable, PendingExchange},
    env::Environment,
    error::EngineError,
};

/// Snapshot of state sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateStats {
    /// Pending rewrap exchanges.
    pub pending: usize,
    /// Cache entries, including expired ones not yet purged.
    pub cached: usize,
    /// Summed raw size of cache entries.
    pub cached_bytes: usize,
}

enum Command {
    PutPending {
        envelope: SecureEnvelope,
        raw: Bytes,
        reply: oneshot::Sender<bool>,
    },
    TakePending {
        id: CorrelationId,
        reply: oneshot::Sender<Option<PendingExchange>>,
    },
    Cache {
        raw: Bytes,
        type_tag: u8,
        reply: oneshot::Sender<Result<MessageId, CacheError>>,
    },
    Remove {
        id: MessageId,
        reply: oneshot::Sender<bool>,
    },
    IncrementRetry {
        id: MessageId,
        reply: oneshot::Sender<Result<u32, CacheError>>,
    },
    List {
        filter: CacheFilter,
        reply: oneshot::Sender<Vec<CachedMessage>>,
    },
    DueForRetry {
        reply: oneshot::Sender<Vec<CachedMessage>>,
    },
    Stats {
        reply: oneshot::Sender<StateStats>,
    },
    Flush {
        reply: oneshot::Sender<Option<oneshot::Receiver<()>>>,
    },
}

/// Cloneable front end to the state task.
///
/// Every method fails with `EngineError::StateClosed` once the task has
/// stopped.
#[derive(Clone)]
pub struct StateHandle {
    commands: mpsc::Sender<Command>,
}

impl StateHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(make(reply)).await.map_err(|_| EngineError::StateClosed)?;
        response.await.map_err(|_| EngineError::StateClosed)
    }

    /// Register an envelope as awaiting its key response.
    ///
    /// Returns true if it replaced an exchange with the same correlation id.
    pub async fn put_pending(
        &self,
        envelope: SecureEnvelope,
        raw: Bytes,
    ) -> Result<bool, EngineError> {
        self.call(|reply| Command::PutPending { envelope, raw, reply }).await
    }

    /// Remove and return the pending exchange for `id`.
    pub async fn take_pending(
        &self,
        id: CorrelationId,
    ) -> Result<Option<PendingExchange>, EngineError> {
        self.call(|reply| Command::TakePending { id, reply }).await
    }

    /// Cache a message for retry.
    pub async fn cache(&self, raw: Bytes, type_tag: u8) -> Result<MessageId, EngineError> {
        Ok(self.call(|reply| Command::Cache { raw, type_tag, reply }).await??)
    }

    /// Remove a cache entry. Returns true if it was present.
    pub async fn remove(&self, id: MessageId) -> Result<bool, EngineError> {
        self.call(|reply| Command::Remove { id, reply }).await
    }

    /// Record a failed retry. See [`MessageCache::increment_retry`].
    pub async fn increment_retry(&self, id: MessageId) -> Result<u32, EngineError> {
        Ok(self.call(|reply| Command::IncrementRetry { id, reply }).await??)
    }

    /// Live cache entries matching `filter`, oldest first.
    pub async fn list(&self, filter: CacheFilter) -> Result<Vec<CachedMessage>, EngineError> {
        self.call(|reply| Command::List { filter, reply }).await
    }

    /// Housekeeping pass, then the entries to offer again.
    ///
    /// Purges expired cache entries and, if a pending TTL is configured,
    /// stale pending exchanges.
    pub async fn due_for_retry(&self) -> Result<Vec<CachedMessage>, EngineError> {
        self.call(|reply| Command::DueForRetry { reply }).await
    }

    /// Current sizes.
    pub async fn stats(&self) -> Result<StateStats, EngineError> {
        self.call(|reply| Command::Stats { reply }).await
    }

    /// Wait until every cache mutation issued so far has reached the store.
    pub async fn flush(&self) -> Result<(), EngineError> {
        if let Some(done) = self.call(|reply| Command::Flush { reply }).await? {
            done.await.map_err(|_| EngineError::StateClosed)?;
        }
        Ok(())
    }
}

/// The state task itself.
pub struct StateTask<E: Environment> {
    table: CorrelationTable,
    cache: MessageCache<E>,
    env: E,
    pending_ttl: Option<Duration>,
    commands: mpsc::Receiver<Command>,
}

impl<E: Environment> StateTask<E> {
    /// Start the task. It runs until every [`StateHandle`] is dropped.
    pub fn spawn(
        cache: MessageCache<E>,
        env: E,
        pending_ttl: Option<Duration>,
        capacity: usize,
    ) -> (StateHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::channel(capacity.max(1));
        let task = Self { table: CorrelationTable::new(), cache, env, pending_ttl, commands };
        (StateHandle { commands: tx }, tokio::spawn(task.run()))
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.apply(command);
        }
        let (pending, cached) = (self.table.len(), self.cache.len());
        tracing::debug!(pending, cached, "state task stopped");
    }

    // Replies are best-effort: a caller that gave up waiting is not an error.
    fn apply(&mut self, command: Command) {
        match command {
            Command::PutPending { envelope, raw, reply } => {
                let id = envelope.header.ephemeral_key();
                let exchange =
                    PendingExchange { envelope, raw, created_at_ms: self.env.now_millis() };
                let replaced = self.table.put(id, exchange).is_some();
                let _ = reply.send(replaced);
            },
            Command::TakePending { id, reply } => {
                let _ = reply.send(self.table.take_and_remove(&id));
            },
            Command::Cache { raw, type_tag, reply } => {
                let _ = reply.send(self.cache.cache(raw, type_tag));
            },
            Command::Remove { id, reply } => {
                let _ = reply.send(self.cache.remove(id).is_some());
            },
            Command::IncrementRetry { id, reply } => {
                let _ = reply.send(self.cache.increment_retry(id));
            },
            Command::List { filter, reply } => {
                let _ = reply.send(self.cache.list(&filter));
            },
            Command::DueForRetry { reply } => {
                self.cache.purge_expired();
                if let Some(ttl) = self.pending_ttl {
                    let expired = self.table.expire_older_than(self.env.now_millis(), ttl);
                    for id in &expired {
                        tracing::warn!(%id, "pending exchange expired without a key response");
                    }
                }
                let _ = reply.send(self.cache.list(&CacheFilter::default()));
            },
            Command::Stats { reply } => {
                let _ = reply.send(StateStats {
                    pending: self.table.len(),
                    cached: self.cache.len(),
                    cached_bytes: self.cache.total_bytes(),
                });
            },
            Command::Flush { reply } => {
                let _ = reply.send(self.cache.flush());
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CacheConfig,
        cache::MemoryStore,
        env::ManualEnv,
        fixtures,
    };

    fn spawn(env: &ManualEnv, pending_ttl: Option<Duration>) -> StateHandle {
        let cache =
            MessageCache::open(CacheConfig::default(), env.clone(), Box::new(MemoryStore::new()))
                .unwrap();
        StateTask::spawn(cache, env.clone(), pending_ttl, 16).0
    }

    #[tokio::test]
    async fn pending_exchange_round_trip() {
        let env = ManualEnv::new(500);
        let state = spawn(&env, None);
        let envelope = fixtures::envelope(3, b"hi");

        assert!(!state.put_pending(envelope.clone(), Bytes::new()).await.unwrap());
        assert!(state.put_pending(envelope, Bytes::new()).await.unwrap());

        let taken = state.take_pending(fixtures::correlation(3)).await.unwrap().unwrap();
        assert_eq!(taken.created_at_ms, 500);
        assert!(state.take_pending(fixtures::correlation(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_takes_yield_one_winner() {
        let env = ManualEnv::new(0);
        let state = spawn(&env, None);
        state.put_pending(fixtures::envelope(9, b"x"), Bytes::new()).await.unwrap();

        let takers: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move { state.take_pending(fixtures::correlation(9)).await })
            })
            .collect();

        let mut winners = 0;
        for taker in takers {
            if taker.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn sweep_expires_stale_pending_when_configured() {
        let env = ManualEnv::new(0);
        let state = spawn(&env, Some(Duration::from_secs(5)));
        state.put_pending(fixtures::envelope(1, b"x"), Bytes::new()).await.unwrap();

        env.advance(Duration::from_secs(6));
        state.due_for_retry().await.unwrap();
        assert_eq!(state.stats().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn cache_commands_and_stats() {
        let env = ManualEnv::new(0);
        let state = spawn(&env, None);

        let id = state.cache(Bytes::from_static(b"event"), 0x06).await.unwrap();
        assert_eq!(state.due_for_retry().await.unwrap().len(), 1);
        assert_eq!(state.increment_retry(id).await.unwrap(), 1);

        let stats = state.stats().await.unwrap();
        assert_eq!(stats, StateStats { pending: 0, cached: 1, cached_bytes: 5 });

        assert!(state.remove(id).await.unwrap());
        assert!(matches!(state.increment_retry(id).await, Err(EngineError::NotCached { .. })));
        state.flush().await.unwrap();
    }
}
