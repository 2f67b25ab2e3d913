//! Client
//!
//! Receives secure envelopes from a relay, obtains their payload keys from a
//! key access server (KAS) through the rewrap handshake, decrypts them, and
//! keeps a bounded on-disk cache of messages that failed for transient
//! reasons so they can be retried.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────┐  per-message task
//! inbound ───► │  Router  │ ─────────────────┬───────────────┬──────────────┐
//!              └──────────┘                  ▼               ▼              ▼
//!                                     RewrapClient    DomainEventHandler   Notifier
//!                                       │      │
//!                               Transport    Decryptor ──► CryptoProvider
//!                                       │
//!                                StateHandle ──► StateTask { CorrelationTable, MessageCache }
//!                                                                     │
//!              RetryScheduler ── tick ──► due entries ──► Router      ▼
//!                                                               CacheStore (FileStore)
//! ```
//!
//! Message tasks run concurrently. Shared state (pending exchanges and the
//! cache index) is owned by one state task and reached through
//! [`StateHandle`], so every state operation is linearizable.
//!
//! # Components
//!
//! - [`Engine`]: Wires everything together and owns the background tasks
//! - [`Router`]: Dispatches inbound messages by type tag
//! - [`RewrapClient`]: Rewrap handshake
//! - [`Decryptor`]: Key unwrap and payload decryption via [`CryptoProvider`]
//! - [`MessageCache`]: Size-bounded, TTL-limited retry cache
//! - [`RetryScheduler`]: Periodic retry sweep
//! - [`Notifier`]: Broadcast of [`Notification`]s
//!
//! # Transport (optional)
//!
//! With the `quic` feature enabled, this crate also provides:
//! - [`transport::quic::connect`]: Connect to a relay
//! - [`transport::quic::QuicLink`]: Channels bridging the connection task

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cache;
mod config;
mod correlation;
mod decrypt;
mod engine;
mod env;
mod error;
mod event;
mod handler;
mod retry;
mod rewrap;
mod router;
mod state;
pub mod transport;

#[cfg(test)]
mod fixtures;

pub use cache::{CacheFilter, CachedMessage, FileStore, MemoryStore, MessageCache, MessageId};
pub use config::{CacheConfig, EngineConfig};
pub use correlation::{CorrelationTable, PendingExchange};
pub use decrypt::Decryptor;
pub use engine::{Engine, EngineBuilder};
pub use env::{Environment, ManualEnv, SystemEnv};
pub use error::{EngineError, ReasonCode};
pub use event::{DecryptedMessage, Notification, Notifier};
pub use handler::{DomainEventHandler, HandlerError, LoggingEventHandler};
pub use retry::{RetryRequest, RetryScheduler};
pub use rewrap::{KeyOutcome, RewrapClient};
pub use router::Router;
pub use sealpost_crypto::CryptoProvider;
pub use state::{StateHandle, StateStats, StateTask};
pub use transport::{ChannelTransport, Transport, TransportError};
