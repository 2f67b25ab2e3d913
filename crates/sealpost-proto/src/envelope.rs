//! Secure envelope: header followed by payload.

use crate::{Header, Payload, errors::Result};

/// The full decryptable unit.
///
/// Holds parsed structures only. Use [`SecureEnvelope::encode`] to recover
/// the wire form; the rewrap request uses [`Header::encode`] alone so that
/// ciphertext never reaches the key authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureEnvelope {
    /// Envelope header.
    pub header: Header,
    /// Encrypted payload.
    pub payload: Payload,
}

impl SecureEnvelope {
    /// Parse an envelope.
    ///
    /// # Errors
    ///
    /// Any [`crate::ProtocolError`] from header or payload parsing.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, consumed) = Header::decode_prefix(bytes)?;
        let rest = bytes.get(consumed..).unwrap_or_default();
        let payload = Payload::decode(rest, header.payload_config())?;
        Ok(Self { header, payload })
    }

    /// Serialize the envelope.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.encoded_len() + self.payload.encoded_len());
        self.header.encode_into(&mut out);
        self.payload.encode_into(&mut out);
        out
    }
}
