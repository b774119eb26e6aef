//! Cryptographic error types for `strongbox-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (Argon2id parameter validation, memory allocation).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Sealing failure (bad key length, AEAD failure).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed: tampered ciphertext or wrong key.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Invalid key material (wrong length, invalidated key).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation or CSPRNG failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}
