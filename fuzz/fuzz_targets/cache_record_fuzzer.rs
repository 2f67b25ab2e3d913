//! Fuzz target for cache record deserialization
//!
//! Cache files are read back from disk at startup, so a corrupted or
//! tampered file must not take the daemon down.
//!
//! # Strategy
//!
//! - Random bytes: Completely arbitrary CBOR data
//! - Huge lengths: Byte strings claiming lengths far past the input
//! - Deeply nested: Arrays nested to arbitrary depth
//!
//! # Invariants
//!
//! - Huge claimed lengths are rejected, not allocated
//! - A record that decodes re-encodes to a record that decodes equal
//! - NEVER panic on malformed CBOR

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealpost_client::cache::StoredMessage;

#[derive(Debug, Clone, Arbitrary)]
enum RecordAttack {
    RandomBytes(Vec<u8>),
    HugeLength { claimed_len_exponent: u8 },
    DeeplyNested { depth: u8 },
}

fuzz_target!(|attack: RecordAttack| {
    let bytes = match attack {
        RecordAttack::RandomBytes(bytes) => bytes,
        RecordAttack::HugeLength { claimed_len_exponent } => {
            let exponent = u32::from(claimed_len_exponent % 32);
            // Map of one entry whose value is a byte string claiming 2^n bytes.
            let mut bytes = vec![0xA1, 0x69];
            bytes.extend_from_slice(b"raw_bytes");
            bytes.push(0x5A);
            bytes.extend_from_slice(&(1u32 << exponent).to_be_bytes());
            bytes.extend_from_slice(&[0xAA; 8]);
            bytes
        },
        RecordAttack::DeeplyNested { depth } => {
            let mut bytes = vec![0x81; usize::from(depth % 64)];
            bytes.push(0x01);
            bytes
        },
    };

    if let Ok(record) = ciborium::from_reader::<StoredMessage, _>(bytes.as_slice()) {
        let mut encoded = Vec::new();
        ciborium::into_writer(&record, &mut encoded).expect("encoding a decoded record");
        let again: StoredMessage = ciborium::from_reader(encoded.as_slice()).expect("re-decode");
        assert_eq!(again, record);
    }
});
