//! Resource locators (KAS address and remote policy address).

use bytes::BufMut;

use crate::{
    errors::{ProtocolError, Result},
    reader::Reader,
};

/// Transport scheme of a [`ResourceLocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// `http://`
    Http,
    /// `https://`
    Https,
    /// Shared resource directory lookup
    SharedResourceDirectory,
}

impl Protocol {
    /// Wire byte for this protocol.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Http => 0x00,
            Self::Https => 0x01,
            Self::SharedResourceDirectory => 0xFF,
        }
    }

    /// Parse a wire byte. `None` if unrecognised.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Http),
            0x01 => Some(Self::Https),
            0xFF => Some(Self::SharedResourceDirectory),
            _ => None,
        }
    }
}

/// Protocol byte + length-prefixed body (at most 255 bytes, never empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator {
    protocol: Protocol,
    body: Vec<u8>,
}

impl ResourceLocator {
    /// Maximum body length (1-byte length prefix).
    pub const MAX_BODY_LEN: usize = u8::MAX as usize;

    /// Build a locator.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidLength` if `body` is empty or longer than 255
    ///   bytes
    pub fn new(protocol: Protocol, body: impl Into<Vec<u8>>) -> Result<Self> {
        let body = body.into();
        if body.is_empty() || body.len() > Self::MAX_BODY_LEN {
            return Err(ProtocolError::InvalidLength { field: "resource locator", len: body.len() });
        }
        Ok(Self { protocol, body })
    }

    /// Locator scheme.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Locator body (host and path, without the scheme).
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        2 + self.body.len()
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let raw_protocol = r.u8("locator protocol")?;
        let protocol =
            Protocol::from_u8(raw_protocol).ok_or(ProtocolError::UnknownProtocol(raw_protocol))?;
        let len = r.u8("locator length")? as usize;
        if len == 0 {
            return Err(ProtocolError::InvalidLength { field: "resource locator", len });
        }
        let body = r.take(len, "locator body")?.to_vec();
        Ok(Self { protocol, body })
    }

    pub(crate) fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.protocol.to_u8());
        // INVARIANT: constructors bound body to 1..=255 bytes.
        dst.put_u8(self.body.len() as u8);
        dst.put_slice(&self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_oversized_bodies() {
        assert!(ResourceLocator::new(Protocol::Https, Vec::new()).is_err());
        assert!(ResourceLocator::new(Protocol::Https, vec![b'a'; 256]).is_err());
        assert!(ResourceLocator::new(Protocol::Https, vec![b'a'; 255]).is_ok());
    }

    #[test]
    fn decode_rejects_zero_length() {
        let mut r = Reader::new(&[0x01, 0x00]);
        assert_eq!(
            ResourceLocator::decode(&mut r),
            Err(ProtocolError::InvalidLength { field: "resource locator", len: 0 })
        );
    }

    #[test]
    fn decode_rejects_unknown_protocol() {
        let mut r = Reader::new(&[0x07, 0x01, b'x']);
        assert_eq!(ResourceLocator::decode(&mut r), Err(ProtocolError::UnknownProtocol(0x07)));
    }
}
