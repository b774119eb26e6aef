//! The composite key: the combined unlocking secret of a container.
//!
//! Each source contributes a 32-byte hash and the composite digest is the
//! SHA-256 of the contributions in order (password first, then key file).
//! Two keys are equal when their digests are equal, regardless of which
//! sources produced them.
//!
//! A password of `None` contributes nothing, which is not the same as
//! `Some("")`.

use std::fmt;

use data_encoding::HEXLOWER_PERMISSIVE;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::memory::{constant_time_eq, SecretBytes};

/// Digest length in bytes.
pub const DIGEST_LEN: usize = 32;

/// Length of a key file given as hexadecimal text.
const HEX_KEY_FILE_LEN: usize = 64;

/// The combined secret required to decode a container.
pub struct CompositeKey {
    digest: SecretBytes<DIGEST_LEN>,
    has_password: bool,
    has_key_file: bool,
    valid: bool,
}

impl CompositeKey {
    /// Build a key from an optional password and optional key-file contents.
    #[must_use]
    pub fn new(password: Option<&str>, key_file: Option<&[u8]>) -> Self {
        let mut hasher = Sha256::new();

        if let Some(password) = password {
            let mut contribution: [u8; DIGEST_LEN] = Sha256::digest(password.as_bytes()).into();
            hasher.update(contribution);
            contribution.zeroize();
        }

        if let Some(contents) = key_file {
            let mut contribution = key_file_hash(contents);
            hasher.update(contribution);
            contribution.zeroize();
        }

        Self {
            digest: SecretBytes::new(hasher.finalize().into()),
            has_password: password.is_some(),
            has_key_file: key_file.is_some(),
            valid: true,
        }
    }

    /// Key made of a password only.
    #[must_use]
    pub fn from_password(password: &str) -> Self {
        Self::new(Some(password), None)
    }

    /// Whether a password contributed to this key.
    #[must_use]
    pub const fn has_password(&self) -> bool {
        self.has_password
    }

    /// Whether a key file contributed to this key.
    #[must_use]
    pub const fn has_key_file(&self) -> bool {
        self.has_key_file
    }

    /// `true` when no source contributed (an empty key).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.has_password && !self.has_key_file
    }

    /// `false` once [`invalidate`](Self::invalidate) ran.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Expose the digest for key derivation.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` for an invalidated key.
    pub fn expose(&self) -> Result<&[u8; DIGEST_LEN], CryptoError> {
        if self.valid {
            Ok(self.digest.expose())
        } else {
            Err(CryptoError::InvalidKeyMaterial(
                "composite key was invalidated".into(),
            ))
        }
    }

    /// Zero the digest in place and mark the key unusable.
    pub fn invalidate(&mut self) {
        self.digest.zeroize();
        self.valid = false;
    }
}

impl PartialEq for CompositeKey {
    fn eq(&self, other: &Self) -> bool {
        self.valid
            && other.valid
            && constant_time_eq(self.digest.expose(), other.digest.expose())
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeKey")
            .field("has_password", &self.has_password)
            .field("has_key_file", &self.has_key_file)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

/// Hash of a key file: raw 32-byte files are used as-is, 64 hex characters
/// are decoded, everything else is hashed.
fn key_file_hash(contents: &[u8]) -> [u8; DIGEST_LEN] {
    if let Ok(raw) = <[u8; DIGEST_LEN]>::try_from(contents) {
        return raw;
    }

    if contents.len() == HEX_KEY_FILE_LEN {
        if let Ok(mut decoded) = HEXLOWER_PERMISSIVE.decode(contents) {
            let hashed = <[u8; DIGEST_LEN]>::try_from(decoded.as_slice()).ok();
            decoded.zeroize();
            if let Some(raw) = hashed {
                return raw;
            }
        }
    }

    Sha256::digest(contents).into()
}
