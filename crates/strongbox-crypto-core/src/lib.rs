//! `strongbox-crypto-core`: key material primitives for Strongbox.
//!
//! Secret memory wrappers, the composite key, Argon2id derivation and
//! AES-256-GCM sealing. No document or tree knowledge lives here.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod composite_key;
pub mod kdf;
pub mod symmetric;

pub use composite_key::{CompositeKey, DIGEST_LEN};
pub use error::CryptoError;
pub use kdf::{derive, Argon2idParams};
pub use memory::{constant_time_eq, SecretBuffer, SecretBytes};
pub use symmetric::{open, seal, SealedData};
