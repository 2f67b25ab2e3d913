//! Transport message framing: one type byte, then the body.

use bytes::{BufMut, Bytes};

use crate::errors::{ProtocolError, Result};

/// Type discriminator carried in the first byte of every transport message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Client announces its public key to the authority.
    PublicKey = 0x01,
    /// Authority announces its public key.
    KasPublicKey = 0x02,
    /// Header-only rewrap request (client to authority).
    Rewrap = 0x03,
    /// Rewrapped key response (authority to client).
    RewrappedKey = 0x04,
    /// Secure envelope awaiting a key.
    Envelope = 0x05,
    /// Application domain event, not encrypted by this layer.
    Event = 0x06,
}

impl MessageType {
    /// Wire byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte. `None` if unrecognised.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::PublicKey),
            0x02 => Some(Self::KasPublicKey),
            0x03 => Some(Self::Rewrap),
            0x04 => Some(Self::RewrappedKey),
            0x05 => Some(Self::Envelope),
            0x06 => Some(Self::Event),
            _ => None,
        }
    }
}

/// A transport message split into its raw tag and body.
///
/// The tag stays raw so unknown values can be logged before being dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// Raw type byte.
    pub tag: u8,
    /// Message body (tag stripped).
    pub body: Bytes,
}

impl TransportMessage {
    /// Build a message with a known type.
    pub fn new(kind: MessageType, body: impl Into<Bytes>) -> Self {
        Self { tag: kind.to_u8(), body: body.into() }
    }

    /// Split wire bytes into tag and body. Zero-copy.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EmptyMessage` if `bytes` is empty
    pub fn split(mut bytes: Bytes) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }
        let body = bytes.split_off(1);
        Ok(Self { tag: bytes[0], body })
    }

    /// Decoded type. `None` for unknown tags.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u8(self.tag)
    }

    /// Wire form: tag followed by body.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(1 + self.body.len());
        out.put_u8(self.tag);
        out.put_slice(&self.body);
        Bytes::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_strips_tag() {
        let msg = TransportMessage::split(Bytes::from_static(&[0x05, 1, 2, 3])).unwrap();
        assert_eq!(msg.kind(), Some(MessageType::Envelope));
        assert_eq!(&msg.body[..], &[1, 2, 3]);
        assert_eq!(&msg.encode()[..], &[0x05, 1, 2, 3]);
    }

    #[test]
    fn unknown_tag_is_preserved() {
        let msg = TransportMessage::split(Bytes::from_static(&[0x7F])).unwrap();
        assert_eq!(msg.tag, 0x7F);
        assert_eq!(msg.kind(), None);
        assert!(msg.body.is_empty());
    }

    #[test]
    fn empty_message_rejected() {
        assert_eq!(TransportMessage::split(Bytes::new()), Err(ProtocolError::EmptyMessage));
    }

    #[test]
    fn tags_round_trip() {
        for tag in 0u8..=0xFF {
            if let Some(kind) = MessageType::from_u8(tag) {
                assert_eq!(kind.to_u8(), tag);
            }
        }
    }
}
