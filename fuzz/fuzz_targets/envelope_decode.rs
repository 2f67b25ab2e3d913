//! Fuzz target for SecureEnvelope::decode
//!
//! This fuzzer tests envelope decoding with arbitrary byte sequences to find:
//! - Parser crashes or panics
//! - Length prefixes that read past the buffer
//! - Envelopes that decode but do not survive a re-encode
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use sealpost_proto::{Header, SecureEnvelope, TransportMessage};

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = SecureEnvelope::decode(data) {
        let encoded = envelope.encode();
        assert_eq!(SecureEnvelope::decode(&encoded).ok(), Some(envelope));
    }

    if let Ok((header, consumed)) = Header::decode_prefix(data) {
        assert_eq!(consumed, header.encoded_len());
    }

    let _ = TransportMessage::split(Bytes::copy_from_slice(data));
});
