//! Sealpost client daemon.
//!
//! # Usage
//!
//! ```bash
//! # Development relay with a self-signed certificate
//! SEALPOST_SESSION_SECRET=<hex> sealpost-daemon --server 127.0.0.1:4433
//!
//! # Verified relay, larger cache
//! sealpost-daemon --server 10.0.0.5:4433 --server-name relay.internal \
//!     --ca-cert ca.pem --cache-dir /var/lib/sealpost --max-cache-mb 200
//! ```

mod args;

use std::sync::Arc;

use clap::Parser;
use sealpost_client::{Engine, FileStore, Notification, transport::quic};
use sealpost_crypto::{AesGcmProvider, derive_session_key};
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::Args;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Sealpost daemon starting");

    let secret = args.session_secret()?;
    let crypto = AesGcmProvider::new(derive_session_key(&secret));

    if args.ca_cert.is_none() {
        tracing::warn!("No CA certificate provided - relay identity is NOT verified");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let mut link = quic::connect(&args.quic_config()).await?;
    let store = FileStore::open(&args.cache_dir)?;
    tracing::info!("Cache directory {}", store.dir().display());

    let engine = Engine::builder(Arc::new(link.transport.clone()), Arc::new(crypto))
        .config(args.engine_config())
        .store(store)
        .start()?;

    let logger = tokio::spawn(log_notifications(engine.subscribe()));

    loop {
        tokio::select! {
            message = link.inbound.recv() => match message {
                Some(message) => {
                    engine.deliver(message);
                },
                None => {
                    tracing::warn!("Relay connection closed");
                    break;
                },
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    tracing::error!(%error, "Failed to listen for shutdown signal");
                }
                tracing::info!("Shutting down");
                break;
            },
        }
    }

    link.stop();
    engine.shutdown().await?;
    logger.abort();

    Ok(())
}

async fn log_notifications(mut notifications: broadcast::Receiver<Notification>) {
    loop {
        match notifications.recv().await {
            Ok(Notification::Decrypted(message)) => {
                let bytes = message.plaintext.len();
                tracing::info!(id = %message.id, bytes, "Envelope decrypted");
            },
            Ok(Notification::RewrapDenied { id }) => {
                tracing::warn!(%id, "Rewrap denied");
            },
            Ok(Notification::ProcessingFailed { message_id, reason, detail, .. }) => {
                tracing::warn!(?message_id, ?reason, %detail, "Processing failed");
            },
            Ok(Notification::MaxRetriesExceeded { message_id, type_tag }) => {
                tracing::error!(%message_id, type_tag, "Message dropped after retries");
            },
            Ok(Notification::KasPublicKey(key)) => {
                tracing::info!(key = %hex::encode(&key), "Key authority public key");
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notification log fell behind");
            },
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
