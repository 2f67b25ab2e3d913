//! QUIC connection to the relay.
//!
//! One message per unidirectional stream in each direction: the stream
//! carries the type tag and body, and its end marks the message boundary.
//! [`connect`] returns a [`QuicLink`]. Its `transport` opens a stream per
//! [`Transport::send`] and reports the outcome to the caller, so a lost
//! connection reaches the engine as a retryable `TransportError`. Its
//! `inbound` receiver yields what the relay sends, ready for
//! [`Router::deliver`](crate::Router::deliver).

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use quinn::{ClientConfig, ConnectionError, Endpoint, RecvStream, VarInt, WriteError};
use sealpost_proto::MAX_PAYLOAD_LENGTH;
use tokio::sync::mpsc;

use super::{Transport, TransportError};

/// ALPN protocol identifier; must match the relay.
pub const ALPN: &[u8] = b"sealpost";

/// Largest inbound message accepted on one stream.
pub const MAX_MESSAGE_SIZE: usize = MAX_PAYLOAD_LENGTH + 64 * 1024;

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct QuicConfig {
    /// Relay address.
    pub server_addr: SocketAddr,
    /// Name checked against the relay certificate.
    pub server_name: String,
    /// PEM file with the CA that signed the relay certificate.
    ///
    /// `None` disables certificate verification (development only).
    pub ca_cert: Option<PathBuf>,
    /// Idle period after which the connection is dropped.
    pub idle_timeout: Duration,
}

impl QuicConfig {
    /// Config for `server_addr` with default timeouts and no CA.
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            server_name: "localhost".to_string(),
            ca_cert: None,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Outbound half of a relay connection.
///
/// `send` completes only once the message is written and the stream
/// finished. Once the connection is gone every send fails with
/// `TransportError::Closed`.
#[derive(Clone)]
pub struct QuicTransport {
    connection: quinn::Connection,
}

impl QuicTransport {
    /// Wrap an established connection.
    pub fn new(connection: quinn::Connection) -> Self {
        Self { connection }
    }

    /// Close the connection; later sends fail with `TransportError::Closed`.
    pub fn close(&self) {
        self.connection.close(VarInt::from_u32(0), b"client closing");
    }

    /// Whether the connection has been closed by either side.
    pub fn is_closed(&self) -> bool {
        self.connection.close_reason().is_some()
    }
}

#[async_trait]
impl Transport for QuicTransport {
    async fn send(&self, message: Bytes) -> Result<(), TransportError> {
        let mut send = self.connection.open_uni().await.map_err(connection_error)?;
        send.write_all(&message).await.map_err(|e| match e {
            WriteError::ConnectionLost(e) => connection_error(e),
            other => TransportError::Stream(format!("write failed: {other}")),
        })?;
        send.finish().map_err(|e| TransportError::Stream(format!("finish failed: {e}")))
    }
}

fn connection_error(error: ConnectionError) -> TransportError {
    tracing::debug!(%error, "relay connection unavailable");
    TransportError::Closed
}

/// A live connection.
pub struct QuicLink {
    /// Outbound side; hand this to the engine.
    pub transport: QuicTransport,
    /// Messages received from the relay. Yields `None` once the connection
    /// closes.
    pub inbound: mpsc::Receiver<Bytes>,
    abort_handle: tokio::task::AbortHandle,
}

impl QuicLink {
    /// Stop reading and close the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
        self.transport.close();
    }
}

/// Connect to a relay.
///
/// # Errors
///
/// - `TransportError::Connection` if the TLS config is invalid or the
///   handshake fails
pub async fn connect(config: &QuicConfig) -> Result<QuicLink, TransportError> {
    let client_config = client_config(config)?;
    let mut endpoint = Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(client_config);

    let connection = endpoint
        .connect(config.server_addr, &config.server_name)
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    tracing::info!(server = %config.server_addr, "connected to relay");

    let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(64);
    let handle = tokio::spawn(accept_streams(connection.clone(), inbound_tx));

    Ok(QuicLink {
        transport: QuicTransport::new(connection),
        inbound: inbound_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Forward every inbound stream until the connection closes.
async fn accept_streams(connection: quinn::Connection, inbound: mpsc::Sender<Bytes>) {
    loop {
        match connection.accept_uni().await {
            Ok(recv) => {
                let tx = inbound.clone();
                tokio::spawn(async move {
                    if let Err(error) = read_message(recv, tx).await {
                        tracing::warn!(%error, "inbound stream failed");
                    }
                });
            },
            Err(error) => {
                tracing::info!(%error, "relay connection closed");
                break;
            },
        }
    }
}

async fn read_message(
    mut recv: RecvStream,
    tx: mpsc::Sender<Bytes>,
) -> Result<(), TransportError> {
    let message = recv
        .read_to_end(MAX_MESSAGE_SIZE)
        .await
        .map_err(|e| TransportError::Stream(format!("read failed: {e}")))?;

    tx.send(Bytes::from(message)).await.map_err(|_| TransportError::Closed)
}

fn client_config(config: &QuicConfig) -> Result<ClientConfig, TransportError> {
    let builder = rustls::ClientConfig::builder();
    let mut crypto = match &config.ca_cert {
        Some(path) => builder.with_root_certificates(load_roots(path)?).with_no_client_auth(),
        None => {
            tracing::warn!("no CA certificate configured; relay certificate is NOT verified");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
                .with_no_client_auth()
        },
    };
    crypto.alpn_protocols = vec![ALPN.to_vec()];

    let quic = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Connection(format!("invalid TLS config: {e}")))?;
    let mut client = ClientConfig::new(Arc::new(quic));

    let idle = quinn::IdleTimeout::try_from(config.idle_timeout)
        .map_err(|e| TransportError::Connection(format!("invalid idle timeout: {e}")))?;
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(idle));
    client.transport_config(Arc::new(transport));

    Ok(client)
}

fn load_roots(path: &Path) -> Result<rustls::RootCertStore, TransportError> {
    let pem = std::fs::read(path).map_err(|e| {
        TransportError::Connection(format!("cannot read CA file {}: {e}", path.display()))
    })?;

    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert = cert.map_err(|e| TransportError::Connection(format!("invalid CA PEM: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| TransportError::Connection(format!("invalid CA certificate: {e}")))?;
    }
    if roots.is_empty() {
        return Err(TransportError::Connection(format!("no certificates in {}", path.display())));
    }
    Ok(roots)
}

/// Certificate verifier that accepts any certificate (insecure, for
/// development).
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
