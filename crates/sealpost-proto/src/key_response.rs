//! Rewrapped key response from the key access authority.
//!
//! ```text
//! granted: [correlation id: 33][nonce: 12][wrapped key: 32][tag: 16]   (93 bytes)
//! denied:  [correlation id: 33]                                        (33 bytes)
//! ```
//!
//! The layout is bit-significant: offsets are fixed and no field is
//! length-prefixed.

use bytes::BufMut;

use crate::{
    CorrelationId, EPHEMERAL_KEY_SIZE,
    errors::{ProtocolError, Result},
    reader::Reader,
};

/// AES-GCM nonce size for the wrapped key.
pub const KEY_NONCE_SIZE: usize = 12;

/// Wrapped symmetric key size.
pub const WRAPPED_KEY_SIZE: usize = 32;

/// Authentication tag size for the wrapped key.
pub const KEY_TAG_SIZE: usize = 16;

/// Size of the key block following the correlation id.
pub const KEY_BLOCK_SIZE: usize = KEY_NONCE_SIZE + WRAPPED_KEY_SIZE + KEY_TAG_SIZE;

/// Nonce, wrapped key and tag, exactly as sent by the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// AES-GCM nonce.
    pub nonce: [u8; KEY_NONCE_SIZE],
    /// Encrypted payload key.
    pub wrapped_key: [u8; WRAPPED_KEY_SIZE],
    /// Authentication tag.
    pub tag: [u8; KEY_TAG_SIZE],
}

/// Key response, either granting a wrapped key or denying the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyResponse {
    /// Ephemeral key of the envelope this response answers.
    pub id: CorrelationId,
    /// `None` when the authority denied the rewrap.
    pub key: Option<WrappedKey>,
}

impl KeyResponse {
    /// Size of a granted response.
    pub const GRANTED_SIZE: usize = EPHEMERAL_KEY_SIZE + KEY_BLOCK_SIZE;

    /// Size of a denial.
    pub const DENIED_SIZE: usize = EPHEMERAL_KEY_SIZE;

    /// Parse a response body (type discriminator already stripped).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidKeyResponse` unless the body is exactly 33 or
    ///   93 bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::GRANTED_SIZE && bytes.len() != Self::DENIED_SIZE {
            return Err(ProtocolError::InvalidKeyResponse(bytes.len()));
        }

        let mut r = Reader::new(bytes);
        let id = CorrelationId::new(r.array("correlation id")?);
        let key = if r.remaining() == 0 {
            None
        } else {
            Some(WrappedKey {
                nonce: r.array("key nonce")?,
                wrapped_key: r.array("wrapped key")?,
                tag: r.array("key tag")?,
            })
        };

        Ok(Self { id, key })
    }

    /// Serialize the response.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::GRANTED_SIZE);
        out.put_slice(self.id.as_bytes());
        if let Some(key) = &self.key {
            out.put_slice(&key.nonce);
            out.put_slice(&key.wrapped_key);
            out.put_slice(&key.tag);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granted_layout_is_fixed() {
        let mut bytes = vec![0xE1; 33];
        bytes.extend_from_slice(&[0x11; 12]);
        bytes.extend_from_slice(&[0x22; 32]);
        bytes.extend_from_slice(&[0x33; 16]);

        let response = KeyResponse::decode(&bytes).unwrap();
        assert_eq!(response.id, CorrelationId::new([0xE1; 33]));
        let key = response.key.as_ref().unwrap();
        assert_eq!(key.nonce, [0x11; 12]);
        assert_eq!(key.wrapped_key, [0x22; 32]);
        assert_eq!(key.tag, [0x33; 16]);
        assert_eq!(response.encode(), bytes);
    }

    #[test]
    fn bare_id_is_denial() {
        let response = KeyResponse::decode(&[0x02; 33]).unwrap();
        assert!(response.key.is_none());
        assert_eq!(response.encode().len(), KeyResponse::DENIED_SIZE);
    }

    #[test]
    fn other_lengths_rejected() {
        for len in [0, 32, 34, 92, 94] {
            assert_eq!(
                KeyResponse::decode(&vec![0; len]),
                Err(ProtocolError::InvalidKeyResponse(len))
            );
        }
    }
}
