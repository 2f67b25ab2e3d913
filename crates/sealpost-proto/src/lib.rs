//! Sealpost wire format.
//!
//! Pure codecs for the binary envelope protocol spoken between a client, a
//! message relay and a key access server (KAS). Nothing here performs I/O or
//! cryptography.
//!
//! # Messages
//!
//! Every transport message starts with a one-byte [`MessageType`]. The two
//! bodies that matter to the rewrap handshake are:
//!
//! - [`SecureEnvelope`]: a [`Header`] (NanoTDF v1 layout) followed by an
//!   encrypted [`Payload`]. The header's ephemeral public key is the
//!   [`CorrelationId`] that links the envelope to its key response.
//! - [`KeyResponse`]: correlation id plus an optional wrapped key block.
//!
//! # Security
//!
//! All decoders treat input as untrusted. Lengths are checked before every
//! slice, so malformed input produces a [`ProtocolError`], never a panic.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod errors;
mod header;
mod key_response;
mod locator;
mod message;
mod payload;
mod policy;
mod reader;

pub use envelope::SecureEnvelope;
pub use errors::{ProtocolError, Result};
pub use header::{
    BindingMode, CorrelationId, ECDSA_BINDING_SIZE, EPHEMERAL_KEY_SIZE, EccCurve,
    GMAC_BINDING_SIZE, Header, MAGIC_NUMBER_AND_VERSION, PayloadConfig, SymmetricCipher,
};
pub use key_response::{
    KEY_BLOCK_SIZE, KEY_NONCE_SIZE, KEY_TAG_SIZE, KeyResponse, WRAPPED_KEY_SIZE, WrappedKey,
};
pub use locator::{Protocol, ResourceLocator};
pub use message::{MessageType, TransportMessage};
pub use payload::{
    MAX_PAYLOAD_LENGTH, PAYLOAD_IV_SIZE, PAYLOAD_SIGNATURE_SIZE, Payload, PayloadSignature,
};
pub use policy::{Policy, PolicyBody};
