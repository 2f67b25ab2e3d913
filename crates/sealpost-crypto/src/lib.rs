//! Sealpost cryptographic collaborator.
//!
//! The engine never touches primitives directly. It asks a [`CryptoProvider`]
//! to unwrap the payload key returned by the key access server and then to
//! decrypt the envelope payload with it. [`AesGcmProvider`] is the default
//! provider, built on the `aes-gcm` crate.
//!
//! # Key Flow
//!
//! ```text
//! ECDH(client, KAS) ──HKDF──► session key
//!                                 │
//!         rewrap response ────────┤ AES-256-GCM open (12B nonce, 16B tag)
//!                                 ▼
//!                            payload key
//!                                 │
//!         envelope payload ───────┤ AES-256-GCM open (9 zero bytes || IV)
//!                                 ▼
//!                             plaintext
//! ```
//!
//! # Security
//!
//! - Keys are zeroized on drop and redacted from `Debug` output
//! - A failed tag check yields an error, never partial plaintext
//! - Sealing helpers take caller-provided nonces; callers MUST NOT reuse a
//!   nonce under the same key

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aes;
mod error;
mod key;
mod provider;

pub use aes::{AesGcmProvider, encrypt_payload, wrap_key};
pub use error::CryptoError;
pub use key::{HKDF_SALT, SYMMETRIC_KEY_SIZE, SymmetricKey, derive_session_key};
pub use provider::CryptoProvider;
