//! Fuzz target for envelope header boundary conditions
//!
//! # Strategy
//!
//! - Magic bytes: Valid, off-by-one, random
//! - Locator: Protocol byte and length byte at their boundaries (0, 1, 255)
//! - Mode bytes: Every curve and cipher value, with and without flag bits
//! - Policy: Every type byte, embedded length prefixes past the buffer end
//! - Payload length: Zero, shorter than IV plus tag, past the buffer end
//!
//! # Invariants
//!
//! - Zero-length locator bodies MUST be rejected
//! - Unknown curves, ciphers and policy types MUST be rejected
//! - A payload shorter than IV plus tag MUST be rejected
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealpost_proto::SecureEnvelope;

const MAGIC: [u8; 3] = [0x4C, 0x31, 0x4C];

#[derive(Debug, Clone, Arbitrary)]
enum MagicBytes {
    Valid,
    OffByOne(u8),
    Random([u8; 3]),
}

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryEnvelope {
    magic: MagicBytes,
    protocol: u8,
    locator_len: u8,
    ecc_mode: u8,
    payload_config: u8,
    policy_type: u8,
    policy_len: u16,
    binding_ecdsa: bool,
    payload_len: u32,
    tail: Vec<u8>,
}

fuzz_target!(|input: BoundaryEnvelope| {
    let mut bytes = Vec::new();

    match input.magic {
        MagicBytes::Valid => bytes.extend_from_slice(&MAGIC),
        MagicBytes::OffByOne(i) => {
            let mut magic = MAGIC;
            magic[usize::from(i % 3)] ^= 0x01;
            bytes.extend_from_slice(&magic);
        },
        MagicBytes::Random(magic) => bytes.extend_from_slice(&magic),
    }

    bytes.push(input.protocol);
    bytes.push(input.locator_len);
    bytes.extend(std::iter::repeat_n(b'k', usize::from(input.locator_len)));

    bytes.push(input.ecc_mode);
    bytes.push(input.payload_config);

    bytes.push(input.policy_type);
    bytes.extend_from_slice(&input.policy_len.to_be_bytes());
    bytes.extend(std::iter::repeat_n(b'p', usize::from(input.policy_len).min(512)));
    bytes.extend(std::iter::repeat_n(0xB1, if input.binding_ecdsa { 64 } else { 8 }));

    bytes.extend_from_slice(&[0x02; 33]);

    bytes.extend_from_slice(&input.payload_len.to_be_bytes()[1..]);
    bytes.extend_from_slice(&input.tail);

    let result = SecureEnvelope::decode(&bytes);

    if input.locator_len == 0 {
        assert!(result.is_err(), "empty locator accepted");
    }
    if (input.payload_config & 0x0F) > 5 {
        assert!(result.is_err(), "unknown cipher accepted");
    }
    if input.policy_type > 2 {
        assert!(result.is_err(), "unknown policy type accepted");
    }
    if let Ok(envelope) = result {
        let tag = envelope.header.payload_config().cipher.tag_size();
        assert!(envelope.payload.ciphertext().len() >= tag);
    }
});
