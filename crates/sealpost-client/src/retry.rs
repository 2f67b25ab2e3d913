//! Periodic retry sweep.
//!
//! On every tick the scheduler asks the state task for housekeeping (expired
//! cache entries and, optionally, stale pending exchanges are dropped) and
//! emits a [`RetryRequest`] for each live cache entry.

use std::time::Duration;

use bytes::Bytes;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::{cache::MessageId, state::StateHandle};

/// A cached message due for another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    /// Cache entry id.
    pub id: MessageId,
    /// Message body.
    pub raw: Bytes,
    /// Type tag the body arrived under.
    pub type_tag: u8,
}

/// Timer-driven producer of [`RetryRequest`]s.
pub struct RetryScheduler {
    state: StateHandle,
    sink: mpsc::Sender<RetryRequest>,
    interval: Duration,
}

impl RetryScheduler {
    /// Create a scheduler emitting into `sink` every `interval`.
    pub fn new(state: StateHandle, sink: mpsc::Sender<RetryRequest>, interval: Duration) -> Self {
        Self { state, sink, interval }
    }

    /// Run one sweep. Returns how many requests were emitted, or `None` once
    /// the state task or the sink is gone.
    pub async fn tick(&self) -> Option<usize> {
        let due = match self.state.due_for_retry().await {
            Ok(due) => due,
            Err(error) => {
                tracing::debug!(%error, "retry sweep stopped");
                return None;
            },
        };

        let count = due.len();
        for entry in due {
            let request = RetryRequest { id: entry.id, raw: entry.raw, type_tag: entry.type_tag };
            if self.sink.send(request).await.is_err() {
                return None;
            }
        }
        Some(count)
    }

    /// Run sweeps until stopped. The first sweep happens one interval after
    /// start; a sweep that overruns delays the next rather than bunching.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.tick().await {
                    Some(0) => {},
                    Some(count) => tracing::debug!(count, "retry sweep emitted"),
                    None => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CacheConfig,
        cache::{CacheFilter, MemoryStore, MessageCache},
        env::ManualEnv,
        state::StateTask,
    };

    fn state(env: &ManualEnv) -> StateHandle {
        let cache =
            MessageCache::open(CacheConfig::default(), env.clone(), Box::new(MemoryStore::new()))
                .unwrap();
        StateTask::spawn(cache, env.clone(), None, 16).0
    }

    #[tokio::test]
    async fn tick_emits_live_entries_only() {
        let env = ManualEnv::new(0);
        let state = state(&env);
        let stale = state.cache(Bytes::from_static(b"old"), 0x06).await.unwrap();
        env.advance(Duration::from_secs(23 * 3600));
        let live = state.cache(Bytes::from_static(b"new"), 0x06).await.unwrap();
        env.advance(Duration::from_secs(2 * 3600));

        let (sink, mut rx) = mpsc::channel(8);
        let scheduler = RetryScheduler::new(state.clone(), sink, Duration::from_secs(60));
        assert_eq!(scheduler.tick().await, Some(1));

        let request = rx.recv().await.unwrap();
        assert_eq!(request.id, live);
        assert_eq!(request.raw, Bytes::from_static(b"new"));
        assert!(!state.remove(stale).await.unwrap());
    }

    #[tokio::test]
    async fn tick_leaves_retry_counts_untouched() {
        let env = ManualEnv::new(0);
        let state = state(&env);
        let id = state.cache(Bytes::from_static(b"x"), 0x06).await.unwrap();
        state.increment_retry(id).await.unwrap();

        let (sink, mut rx) = mpsc::channel(8);
        let scheduler = RetryScheduler::new(state.clone(), sink, Duration::from_secs(60));
        assert_eq!(scheduler.tick().await, Some(1));
        assert_eq!(scheduler.tick().await, Some(1));
        assert_eq!(rx.recv().await.unwrap().id, id);

        let listed = state.list(CacheFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].retry_count, 1);
    }

    #[tokio::test]
    async fn tick_stops_when_sink_closes() {
        let env = ManualEnv::new(0);
        let state = state(&env);
        state.cache(Bytes::from_static(b"x"), 0x06).await.unwrap();

        let (sink, rx) = mpsc::channel(1);
        drop(rx);
        assert_eq!(RetryScheduler::new(state, sink, Duration::from_secs(1)).tick().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_scheduler_fires_on_interval() {
        let env = ManualEnv::new(0);
        let state = state(&env);
        state.cache(Bytes::from_static(b"x"), 0x06).await.unwrap();

        let (sink, mut rx) = mpsc::channel(8);
        let handle = RetryScheduler::new(state, sink, Duration::from_secs(60)).spawn();

        time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(rx.recv().await.unwrap().raw, Bytes::from_static(b"x"));

        handle.abort();
    }
}
