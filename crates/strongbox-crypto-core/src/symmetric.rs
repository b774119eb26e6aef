//! AES-256-GCM sealing of container payloads.
//!
//! - [`seal`] encrypts with a fresh random nonce and returns [`SealedData`]
//! - [`open`] authenticates and decrypts into a [`SecretBuffer`]

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use zeroize::Zeroize;

/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Authenticated ciphertext.
///
/// Wire format: `nonce (12) || ciphertext || tag (16)`.
#[must_use = "sealed data must be stored"]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedData {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl SealedData {
    /// Serialize to wire format.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            NONCE_LEN
                .saturating_add(self.ciphertext.len())
                .saturating_add(TAG_LEN),
        );
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Parse the wire format.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if `bytes` cannot hold a nonce and a tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let (nonce_bytes, rest) = bytes
            .split_first_chunk::<NONCE_LEN>()
            .ok_or_else(|| too_short(bytes.len()))?;
        let (ciphertext, tag_bytes) = rest
            .split_last_chunk::<TAG_LEN>()
            .ok_or_else(|| too_short(bytes.len()))?;

        Ok(Self {
            nonce: *nonce_bytes,
            ciphertext: ciphertext.to_vec(),
            tag: *tag_bytes,
        })
    }
}

fn too_short(len: usize) -> CryptoError {
    CryptoError::Encryption(format!(
        "sealed data too short: {len} bytes (minimum {})",
        NONCE_LEN.saturating_add(TAG_LEN)
    ))
}

fn aead_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key`, binding `aad`.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` for a key that is not 32 bytes or an
/// AEAD failure.
pub fn seal(plaintext: &[u8], key: &[u8], aad: &[u8]) -> Result<SealedData, CryptoError> {
    let key = aead_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    let Ok(tag) = key.seal_in_place_separate_tag(nonce, aead::Aad::from(aad), &mut in_out) else {
        in_out.zeroize();
        return Err(CryptoError::Encryption("AES-256-GCM encryption failed".into()));
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedData {
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Authenticate and decrypt `sealed` under `key` with the same `aad`.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` for a bad key length and
/// `CryptoError::Decryption` when authentication fails (wrong key, wrong
/// AAD, tampered bytes).
pub fn open(sealed: &SealedData, key: &[u8], aad: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let key = aead_key(key)?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    let mut in_out = Vec::with_capacity(sealed.ciphertext.len().saturating_add(TAG_LEN));
    in_out.extend_from_slice(&sealed.ciphertext);
    in_out.extend_from_slice(&sealed.tag);

    let opened = key
        .open_in_place(nonce, aead::Aad::from(aad), &mut in_out)
        .map(|plaintext| SecretBuffer::new(plaintext));
    in_out.zeroize();
    opened.map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];

    #[test]
    fn seal_then_open_returns_plaintext() {
        let sealed = seal(b"tree payload", &KEY, b"header").unwrap();
        let opened = open(&sealed, &KEY, b"header").unwrap();
        assert_eq!(opened.expose(), b"tree payload");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal(b"tree payload", &KEY, b"").unwrap();
        let err = open(&sealed, &[0x43; KEY_LEN], b"").unwrap_err();
        assert!(matches!(err, CryptoError::Decryption));
    }

    #[test]
    fn open_with_wrong_aad_fails() {
        let sealed = seal(b"tree payload", &KEY, b"v1").unwrap();
        assert!(matches!(
            open(&sealed, &KEY, b"v2"),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn nonces_differ_between_calls() {
        let a = seal(b"same", &KEY, b"").unwrap();
        let b = seal(b"same", &KEY, b"").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn wire_format_survives_parse() {
        let sealed = seal(b"payload", &KEY, b"").unwrap();
        let parsed = SealedData::from_bytes(&sealed.to_bytes()).unwrap();
        assert_eq!(parsed, sealed);
    }

    #[test]
    fn from_bytes_rejects_truncated_input() {
        assert!(SealedData::from_bytes(&[0u8; 27]).is_err());
        assert!(SealedData::from_bytes(&[0u8; 28]).is_ok());
    }

    #[test]
    fn seal_rejects_short_key() {
        assert!(matches!(
            seal(b"x", &[0u8; 16], b""),
            Err(CryptoError::Encryption(_))
        ));
    }
}
