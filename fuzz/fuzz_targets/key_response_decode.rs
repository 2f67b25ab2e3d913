//! Fuzz target for KeyResponse::decode
//!
//! # Invariants
//!
//! - Exactly 33 bytes decodes as a denial
//! - Exactly 93 bytes decodes as a grant
//! - Every other length is rejected
//! - NEVER panic

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealpost_proto::KeyResponse;

fuzz_target!(|data: &[u8]| {
    match KeyResponse::decode(data) {
        Ok(response) => {
            match data.len() {
                KeyResponse::DENIED_SIZE => assert!(response.key.is_none()),
                KeyResponse::GRANTED_SIZE => assert!(response.key.is_some()),
                len => panic!("accepted key response of invalid length {len}"),
            }
            assert_eq!(response.encode(), data);
        },
        Err(_) => {
            let len = data.len();
            assert!(len != KeyResponse::DENIED_SIZE && len != KeyResponse::GRANTED_SIZE);
        },
    }
});
