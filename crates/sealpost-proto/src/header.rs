//! Envelope header codec.
//!
//! The header is variable length (locators and policy are length-prefixed),
//! so unlike a fixed frame header it cannot be cast in place. Decoding walks
//! the fields with a bounds-checked cursor and stops at the ephemeral key.
//!
//! ```text
//! ┌──────────────┬─────────────┬──────────┬──────────┬──────────┬───────────────┐
//! │ magic+ver 3B │ KAS locator │ ecc 1B   │ config 1B│ policy   │ ephemeral 33B │
//! └──────────────┴─────────────┴──────────┴──────────┴──────────┴───────────────┘
//! ```
//!
//! # Security
//!
//! Parsing proves structure only. The policy binding and the optional payload
//! signature are NOT verified here; the key authority checks the binding when
//! it evaluates the rewrap request.

use std::fmt;

use bytes::BufMut;

use crate::{
    Policy, ResourceLocator,
    errors::{ProtocolError, Result},
    reader::Reader,
};

/// Magic number and version: "L1L" in base64.
pub const MAGIC_NUMBER_AND_VERSION: [u8; 3] = [0x4C, 0x31, 0x4C];

/// Size of a compressed ephemeral public key.
pub const EPHEMERAL_KEY_SIZE: usize = 33;

/// ECDSA policy binding size for 256-bit curves (r || s).
pub const ECDSA_BINDING_SIZE: usize = 64;

/// GMAC policy binding size.
pub const GMAC_BINDING_SIZE: usize = 8;

/// Elliptic curves with 33-byte compressed points.
///
/// The ephemeral key doubles as a fixed-size correlation id, so curves with
/// larger points (secp384r1, secp521r1) are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EccCurve {
    /// NIST P-256
    Secp256r1,
    /// Koblitz secp256k1
    Secp256k1,
}

impl EccCurve {
    /// Wire value (3 bits).
    pub fn to_bits(self) -> u8 {
        match self {
            Self::Secp256r1 => 0x00,
            Self::Secp256k1 => 0x03,
        }
    }

    /// Parse a 3-bit wire value.
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0x00 => Ok(Self::Secp256r1),
            0x03 => Ok(Self::Secp256k1),
            other => Err(ProtocolError::UnsupportedCurve(other)),
        }
    }
}

/// ECC and policy binding mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingMode {
    /// Policy bound with an ECDSA signature instead of GMAC.
    pub ecdsa_binding: bool,
    /// Curve of the ephemeral key.
    pub curve: EccCurve,
}

impl BindingMode {
    /// Policy binding size in bytes.
    pub fn binding_size(self) -> usize {
        if self.ecdsa_binding { ECDSA_BINDING_SIZE } else { GMAC_BINDING_SIZE }
    }

    fn to_byte(self) -> u8 {
        (u8::from(self.ecdsa_binding) << 7) | self.curve.to_bits()
    }

    fn from_byte(byte: u8) -> Result<Self> {
        Ok(Self { ecdsa_binding: byte & 0x80 != 0, curve: EccCurve::from_bits(byte & 0x07)? })
    }
}

/// AES-256-GCM variants, distinguished by tag length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymmetricCipher {
    /// 64-bit tag
    Aes256Gcm64,
    /// 96-bit tag
    Aes256Gcm96,
    /// 104-bit tag
    Aes256Gcm104,
    /// 112-bit tag
    Aes256Gcm112,
    /// 120-bit tag
    Aes256Gcm120,
    /// 128-bit tag
    Aes256Gcm128,
}

impl SymmetricCipher {
    /// Wire value (4 bits).
    pub fn to_bits(self) -> u8 {
        match self {
            Self::Aes256Gcm64 => 0x00,
            Self::Aes256Gcm96 => 0x01,
            Self::Aes256Gcm104 => 0x02,
            Self::Aes256Gcm112 => 0x03,
            Self::Aes256Gcm120 => 0x04,
            Self::Aes256Gcm128 => 0x05,
        }
    }

    /// Parse a 4-bit wire value.
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0x00 => Ok(Self::Aes256Gcm64),
            0x01 => Ok(Self::Aes256Gcm96),
            0x02 => Ok(Self::Aes256Gcm104),
            0x03 => Ok(Self::Aes256Gcm112),
            0x04 => Ok(Self::Aes256Gcm120),
            0x05 => Ok(Self::Aes256Gcm128),
            other => Err(ProtocolError::UnsupportedCipher(other)),
        }
    }

    /// Authentication tag size in bytes.
    pub fn tag_size(self) -> usize {
        match self {
            Self::Aes256Gcm64 => 8,
            Self::Aes256Gcm96 => 12,
            Self::Aes256Gcm104 => 13,
            Self::Aes256Gcm112 => 14,
            Self::Aes256Gcm120 => 15,
            Self::Aes256Gcm128 => 16,
        }
    }
}

/// Symmetric and payload configuration byte.
///
/// This is the "signature configuration" needed to parse a payload: it says
/// how long the authentication tag is and whether a signature block follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadConfig {
    /// Payload is followed by a signer public key and signature.
    pub has_signature: bool,
    /// Curve of the payload signature.
    pub signature_curve: EccCurve,
    /// Payload cipher.
    pub cipher: SymmetricCipher,
}

impl PayloadConfig {
    fn to_byte(self) -> u8 {
        (u8::from(self.has_signature) << 7)
            | (self.signature_curve.to_bits() << 4)
            | self.cipher.to_bits()
    }

    fn from_byte(byte: u8) -> Result<Self> {
        Ok(Self {
            has_signature: byte & 0x80 != 0,
            signature_curve: EccCurve::from_bits((byte >> 4) & 0x07)?,
            cipher: SymmetricCipher::from_bits(byte & 0x0F)?,
        })
    }
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            has_signature: false,
            signature_curve: EccCurve::Secp256r1,
            cipher: SymmetricCipher::Aes256Gcm128,
        }
    }
}

/// Ephemeral public key, also used as the rewrap correlation id.
///
/// Fixed-size so that logically equal keys always hash equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId([u8; EPHEMERAL_KEY_SIZE]);

impl CorrelationId {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; EPHEMERAL_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy from a slice. `None` if the length is not 33.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; EPHEMERAL_KEY_SIZE]>::try_from(bytes).ok().map(Self)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; EPHEMERAL_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({self})")
    }
}

/// Parsed envelope header. Immutable once constructed.
///
/// # Invariants
///
/// - `policy.binding().len() == binding.binding_size()`
/// - `encode` followed by `decode` yields an equal header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    kas: ResourceLocator,
    binding: BindingMode,
    payload_config: PayloadConfig,
    policy: Policy,
    ephemeral_key: CorrelationId,
}

impl Header {
    /// Smallest possible header: magic, 3-byte locator, two mode bytes,
    /// 4-byte remote policy, GMAC binding, ephemeral key.
    pub const MIN_SIZE: usize = 3 + 3 + 2 + 4 + GMAC_BINDING_SIZE + EPHEMERAL_KEY_SIZE;

    /// Build a header.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidLength` if the policy binding does not match
    ///   the binding mode
    pub fn new(
        kas: ResourceLocator,
        binding: BindingMode,
        payload_config: PayloadConfig,
        policy: Policy,
        ephemeral_key: CorrelationId,
    ) -> Result<Self> {
        if policy.binding().len() != binding.binding_size() {
            return Err(ProtocolError::InvalidLength {
                field: "policy binding",
                len: policy.binding().len(),
            });
        }
        Ok(Self { kas, binding, payload_config, policy, ephemeral_key })
    }

    /// Parse a header from the start of `bytes`, ignoring anything after it.
    ///
    /// # Errors
    ///
    /// Any [`ProtocolError`] from the individual fields.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_prefix(bytes).map(|(header, _)| header)
    }

    /// Parse a header and report how many bytes it occupied.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if the buffer ends inside a field
    /// - `ProtocolError::InvalidMagic` if the first three bytes are not "L1L"
    /// - `ProtocolError::UnsupportedCurve` / `UnsupportedCipher` /
    ///   `UnknownProtocol` / `UnknownPolicyType` for unrecognised mode bytes
    /// - `ProtocolError::InvalidLength` for empty locators
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut r = Reader::new(bytes);

        // Cheapest check first so garbage fails fast.
        let magic = r.array::<3>("magic")?;
        if magic != MAGIC_NUMBER_AND_VERSION {
            return Err(ProtocolError::InvalidMagic);
        }

        let kas = ResourceLocator::decode(&mut r)?;
        let binding = BindingMode::from_byte(r.u8("ecc mode")?)?;
        let payload_config = PayloadConfig::from_byte(r.u8("payload config")?)?;
        let policy = Policy::decode(&mut r, binding.binding_size())?;
        let ephemeral_key = CorrelationId(r.array("ephemeral key")?);

        Ok((Self { kas, binding, payload_config, policy, ephemeral_key }, r.position()))
    }

    /// Serialize the header.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Serialize the header into `dst`.
    pub fn encode_into(&self, dst: &mut impl BufMut) {
        dst.put_slice(&MAGIC_NUMBER_AND_VERSION);
        self.kas.encode(dst);
        dst.put_u8(self.binding.to_byte());
        dst.put_u8(self.payload_config.to_byte());
        self.policy.encode(dst);
        dst.put_slice(self.ephemeral_key.as_bytes());
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        MAGIC_NUMBER_AND_VERSION.len()
            + self.kas.encoded_len()
            + 2
            + self.policy.encoded_len()
            + EPHEMERAL_KEY_SIZE
    }

    /// Key access server locator.
    pub fn kas(&self) -> &ResourceLocator {
        &self.kas
    }

    /// ECC and binding mode.
    pub fn binding_mode(&self) -> BindingMode {
        self.binding
    }

    /// Payload configuration (cipher and signature flags).
    pub fn payload_config(&self) -> PayloadConfig {
        self.payload_config
    }

    /// Policy descriptor.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Ephemeral public key / correlation id.
    pub fn ephemeral_key(&self) -> CorrelationId {
        self.ephemeral_key
    }
}
