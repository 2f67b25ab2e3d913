//! Engine configuration.

use std::time::Duration;

/// Limits applied by the message cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Upper bound on the summed raw size of cached messages, in bytes.
    pub max_bytes: usize,
    /// Entries older than this are invisible to reads and purged lazily.
    pub ttl: Duration,
    /// Failed retries allowed before an entry is dropped.
    pub max_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_bytes: 50 * 1024 * 1024, ttl: Duration::from_secs(24 * 60 * 60), max_retries: 3 }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cache limits.
    pub cache: CacheConfig,
    /// Period of the retry sweep.
    pub retry_interval: Duration,
    /// Pending exchanges older than this are dropped by the retry sweep.
    ///
    /// `None` keeps them until a key response consumes or replaces them.
    pub pending_ttl: Option<Duration>,
    /// Buffered notifications per subscriber before the slowest one lags.
    pub notification_capacity: usize,
    /// Queue depth of the state task.
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry_interval: Duration::from_secs(60),
            pending_ttl: None,
            notification_capacity: 256,
            command_capacity: 1024,
        }
    }
}
