//! Environment abstraction for deterministic testing.
//!
//! Cache timestamps, TTL checks and message ids all come from an
//! [`Environment`], so tests can drive the clock by hand instead of sleeping.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// Time and randomness available to the engine.
///
/// # Invariants
///
/// - `now_millis()` is wall-clock time in milliseconds since the Unix epoch,
///   because cache timestamps are persisted and compared across restarts
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u128`.
    ///
    /// Used for cache message ids.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}

/// Production environment using the system clock and the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Message ids drawn from a broken RNG could
/// collide and overwrite cached messages, so there is no sane fallback.
#[derive(Clone, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now_millis(&self) -> u64 {
        // A clock before 1970 reads as the epoch; every entry then looks fresh.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

const GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Hand-driven environment for tests and simulations.
///
/// The clock only moves when told to. Randomness is a seeded splitmix64
/// stream, so ids are reproducible for a given seed. Clones share state.
#[derive(Clone, Debug)]
pub struct ManualEnv {
    clock: Arc<AtomicU64>,
    rng: Arc<AtomicU64>,
}

impl ManualEnv {
    /// Create an environment whose clock reads `start_millis`.
    pub fn new(start_millis: u64) -> Self {
        Self::with_seed(start_millis, 0x5EA1_9057)
    }

    /// Create an environment with an explicit RNG seed.
    pub fn with_seed(start_millis: u64, seed: u64) -> Self {
        Self { clock: Arc::new(AtomicU64::new(start_millis)), rng: Arc::new(AtomicU64::new(seed)) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.clock.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the clock to an absolute value.
    pub fn set_millis(&self, millis: u64) {
        self.clock.store(millis, Ordering::SeqCst);
    }

    fn next_u64(&self) -> u64 {
        let mut z = self.rng.fetch_add(GAMMA, Ordering::SeqCst).wrapping_add(GAMMA);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl Environment for ManualEnv {
    fn now_millis(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        for chunk in buffer.chunks_mut(8) {
            let word = self.next_u64().to_be_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}
