//! Command line arguments and their mapping onto engine configuration.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use sealpost_client::{CacheConfig, EngineConfig, transport::quic::QuicConfig};

/// Sealpost client daemon
#[derive(Parser, Debug)]
#[command(name = "sealpost-daemon")]
#[command(about = "Receives secure envelopes, rewraps their keys and decrypts them")]
#[command(version)]
pub struct Args {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:4433")]
    pub server: SocketAddr,

    /// Name expected in the relay certificate
    #[arg(long, default_value = "localhost")]
    pub server_name: String,

    /// CA certificate for the relay (PEM). Without it the relay is not verified
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Directory for the retry cache
    #[arg(long, default_value = "./sealpost-cache")]
    pub cache_dir: PathBuf,

    /// Cache budget in MiB
    #[arg(long, default_value_t = 50)]
    pub max_cache_mb: usize,

    /// Hours a cached message stays eligible for retry
    #[arg(long, default_value_t = 24)]
    pub ttl_hours: u64,

    /// Failed retries before a cached message is dropped
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Seconds between retry sweeps
    #[arg(long, default_value_t = 60)]
    pub retry_interval_secs: u64,

    /// Seconds an envelope may wait for its key response (unbounded if unset)
    #[arg(long)]
    pub pending_ttl_secs: Option<u64>,

    /// Hex-encoded ECDH shared secret with the key authority
    #[arg(long, env = "SEALPOST_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Engine configuration from the flags.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache: CacheConfig {
                max_bytes: self.max_cache_mb.saturating_mul(1024 * 1024),
                ttl: Duration::from_secs(self.ttl_hours.saturating_mul(3600)),
                max_retries: self.max_retries,
            },
            retry_interval: Duration::from_secs(self.retry_interval_secs.max(1)),
            pending_ttl: self.pending_ttl_secs.map(Duration::from_secs),
            ..EngineConfig::default()
        }
    }

    /// QUIC connection parameters from the flags.
    pub fn quic_config(&self) -> QuicConfig {
        QuicConfig {
            server_name: self.server_name.clone(),
            ca_cert: self.ca_cert.clone(),
            ..QuicConfig::new(self.server)
        }
    }

    /// Decoded session secret.
    pub fn session_secret(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(self.session_secret.trim())
    }
}
