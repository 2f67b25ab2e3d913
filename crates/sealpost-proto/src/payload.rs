//! Encrypted payload codec.
//!
//! Layout on the wire:
//! `[length: 3][iv: 3][ciphertext || tag][signer key: 33, signature: 64]?`
//!
//! `length` covers IV, ciphertext and tag. The signature block is present
//! only when the header's [`PayloadConfig`] says so, which is why a payload
//! cannot be parsed without its header.

use bytes::BufMut;

use crate::{
    EPHEMERAL_KEY_SIZE, PayloadConfig,
    errors::{ProtocolError, Result},
    reader::Reader,
};

/// Size of the payload IV.
pub const PAYLOAD_IV_SIZE: usize = 3;

/// Size of an ECDSA payload signature for 256-bit curves.
pub const PAYLOAD_SIGNATURE_SIZE: usize = 64;

/// Largest value representable by the 3-byte length prefix.
pub const MAX_PAYLOAD_LENGTH: usize = 0x00FF_FFFF;

/// Optional signature over the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadSignature {
    /// Signer's compressed public key.
    pub public_key: [u8; EPHEMERAL_KEY_SIZE],
    /// ECDSA signature (r || s).
    pub signature: [u8; PAYLOAD_SIGNATURE_SIZE],
}

/// Parsed payload: IV, ciphertext with trailing tag, optional signature.
///
/// # Invariants
///
/// - `ciphertext.len() >= config.cipher.tag_size()`
/// - `signature.is_some() == config.has_signature`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Payload {
    config: PayloadConfig,
    iv: [u8; PAYLOAD_IV_SIZE],
    ciphertext: Vec<u8>,
    signature: Option<PayloadSignature>,
}

impl Payload {
    /// Build a payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidLength` if the ciphertext is shorter than the
    ///   tag or the total would overflow the 3-byte length prefix, or if the
    ///   signature presence disagrees with `config`
    pub fn new(
        config: PayloadConfig,
        iv: [u8; PAYLOAD_IV_SIZE],
        ciphertext: Vec<u8>,
        signature: Option<PayloadSignature>,
    ) -> Result<Self> {
        Self::check_length(config, PAYLOAD_IV_SIZE + ciphertext.len())?;
        if signature.is_some() != config.has_signature {
            return Err(ProtocolError::InvalidLength {
                field: "payload signature",
                len: usize::from(signature.is_some()),
            });
        }
        Ok(Self { config, iv, ciphertext, signature })
    }

    /// Parse a payload that starts at the beginning of `bytes`.
    ///
    /// Trailing bytes after the payload (and signature, if any) are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if the buffer is shorter than declared
    /// - `ProtocolError::InvalidLength` if the declared length cannot hold the
    ///   IV and authentication tag
    pub fn decode(bytes: &[u8], config: PayloadConfig) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let len = r.u24("payload length")? as usize;
        Self::check_length(config, len)?;

        let iv = r.array("payload iv")?;
        let ciphertext = r.take(len - PAYLOAD_IV_SIZE, "payload ciphertext")?.to_vec();

        let signature = if config.has_signature {
            Some(PayloadSignature {
                public_key: r.array("signer public key")?,
                signature: r.array("payload signature")?,
            })
        } else {
            None
        };

        Ok(Self { config, iv, ciphertext, signature })
    }

    /// Serialize the payload.
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        let len = PAYLOAD_IV_SIZE + self.ciphertext.len();
        // INVARIANT: `check_length` bounded len to MAX_PAYLOAD_LENGTH (24 bits).
        let len_bytes = (len as u32).to_be_bytes();
        dst.put_slice(&len_bytes[1..]);
        dst.put_slice(&self.iv);
        dst.put_slice(&self.ciphertext);
        if let Some(sig) = &self.signature {
            dst.put_slice(&sig.public_key);
            dst.put_slice(&sig.signature);
        }
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        let sig = if self.signature.is_some() {
            EPHEMERAL_KEY_SIZE + PAYLOAD_SIGNATURE_SIZE
        } else {
            0
        };
        3 + PAYLOAD_IV_SIZE + self.ciphertext.len() + sig
    }

    /// Configuration this payload was parsed with.
    pub fn config(&self) -> PayloadConfig {
        self.config
    }

    /// 3-byte IV. The AEAD nonce is this IV left-padded with zeros.
    pub fn iv(&self) -> &[u8; PAYLOAD_IV_SIZE] {
        &self.iv
    }

    /// Ciphertext including the trailing authentication tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Payload signature, if the config requires one.
    pub fn signature(&self) -> Option<&PayloadSignature> {
        self.signature.as_ref()
    }

    fn check_length(config: PayloadConfig, len: usize) -> Result<()> {
        let min = PAYLOAD_IV_SIZE + config.cipher.tag_size();
        if len < min || len > MAX_PAYLOAD_LENGTH {
            return Err(ProtocolError::InvalidLength { field: "payload", len });
        }
        Ok(())
    }
}
