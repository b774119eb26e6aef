//! Encrypted container encoding.
//!
//! The core only needs *some* way to turn container bytes plus a
//! [`CompositeKey`] into a [`TreeData`] and back; that seam is the
//! [`ContainerCodec`] trait. [`SealedJsonCodec`] is the bundled format:
//!
//! ```text
//! MAGIC (4) | header_len (u32 LE) | header JSON | nonce || ciphertext || tag
//! ```
//!
//! The payload key is Argon2id(composite digest, header salt). The header
//! bytes are the AEAD associated data, so any header tampering fails
//! authentication.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use strongbox_crypto_core::{derive, open, seal, Argon2idParams, CompositeKey, SealedData};
use zeroize::Zeroizing;

use crate::error::ContainerError;
use crate::model::TreeData;

/// Reads and writes encrypted containers.
pub trait ContainerCodec: Send + Sync {
    /// Decrypt and parse `bytes` with `key`.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::Malformed`] for bad framing or unparsable content
    /// - [`ContainerError::UnsupportedVersion`] for a newer format
    /// - [`ContainerError::WrongKey`] when authentication fails
    fn decode(&self, bytes: &[u8], key: &CompositeKey) -> Result<TreeData, ContainerError>;

    /// Serialize and encrypt `tree` with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] if serialization, derivation or sealing
    /// fails.
    fn encode(&self, tree: &TreeData, key: &CompositeKey) -> Result<Vec<u8>, ContainerError>;

    /// Whether the container may be opened without password or key file.
    /// `false` for anything unreadable.
    fn allows_empty_key(&self, bytes: &[u8]) -> bool;
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const MAGIC: &[u8; 4] = b"SBX1";

/// Newest format version this build reads and the one it writes.
pub const FORMAT_VERSION: u8 = 1;

/// Upper bound on the header JSON length.
pub const MAX_HEADER_LEN: usize = 4096;

/// Largest Argon2id memory cost (KiB) accepted from a header: 1 GiB.
pub const MAX_M_COST_KIB: u32 = 1_048_576;

/// Largest Argon2id pass count accepted from a header.
pub const MAX_T_COST: u32 = 64;

/// Largest Argon2id lane count accepted from a header.
pub const MAX_P_COST: u32 = 16;

const MAGIC_LEN: usize = 4;
const LEN_PREFIX: usize = 4;
const SALT_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Unencrypted container header. Holds format metadata only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerHeader {
    pub version: u8,
    pub kdf: Argon2idParams,
    pub salt: Vec<u8>,
    #[serde(default)]
    pub allow_empty_key: bool,
}

/// Split `bytes` into the parsed header, the raw header bytes and the
/// sealed remainder.
fn split(bytes: &[u8]) -> Result<(ContainerHeader, &[u8], &[u8]), ContainerError> {
    let (magic, rest) = bytes
        .split_first_chunk::<MAGIC_LEN>()
        .ok_or_else(|| ContainerError::Malformed("file too short".into()))?;
    if magic != MAGIC {
        return Err(ContainerError::Malformed("invalid magic bytes".into()));
    }

    let (len_bytes, rest) = rest
        .split_first_chunk::<LEN_PREFIX>()
        .ok_or_else(|| ContainerError::Malformed("missing header length".into()))?;
    let header_len = usize::try_from(u32::from_le_bytes(*len_bytes))
        .map_err(|_| ContainerError::Malformed("header length exceeds platform usize".into()))?;
    if header_len > MAX_HEADER_LEN || header_len > rest.len() {
        return Err(ContainerError::Malformed(format!(
            "header length {header_len} out of range"
        )));
    }

    let (header_bytes, sealed) = rest.split_at(header_len);
    let header: ContainerHeader = serde_json::from_slice(header_bytes)
        .map_err(|e| ContainerError::Malformed(format!("invalid header: {e}")))?;

    if header.version > FORMAT_VERSION {
        return Err(ContainerError::UnsupportedVersion {
            found: header.version,
            supported: FORMAT_VERSION,
        });
    }
    if header.version == 0 {
        return Err(ContainerError::Malformed("version 0".into()));
    }
    // Header costs are unauthenticated until after derivation.
    let kdf = &header.kdf;
    if kdf.m_cost > MAX_M_COST_KIB || kdf.t_cost > MAX_T_COST || kdf.p_cost > MAX_P_COST {
        return Err(ContainerError::Malformed(format!(
            "kdf cost out of range (m={}, t={}, p={})",
            kdf.m_cost, kdf.t_cost, kdf.p_cost
        )));
    }

    Ok((header, header_bytes, sealed))
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Argon2id + AES-256-GCM over a JSON tree.
#[derive(Debug, Clone, Default)]
pub struct SealedJsonCodec {
    params: Argon2idParams,
}

impl SealedJsonCodec {
    /// Codec writing containers with the given KDF cost. Reading always
    /// uses the parameters stored in the header.
    #[must_use]
    pub const fn new(params: Argon2idParams) -> Self {
        Self { params }
    }

    /// Parse just the header.
    ///
    /// # Errors
    ///
    /// Same framing errors as [`ContainerCodec::decode`].
    pub fn read_header(bytes: &[u8]) -> Result<ContainerHeader, ContainerError> {
        split(bytes).map(|(header, _, _)| header)
    }
}

impl ContainerCodec for SealedJsonCodec {
    fn decode(&self, bytes: &[u8], key: &CompositeKey) -> Result<TreeData, ContainerError> {
        let (header, aad, sealed) = split(bytes)?;
        let sealed = SealedData::from_bytes(sealed)
            .map_err(|e| ContainerError::Malformed(e.to_string()))?;

        let payload_key = derive(key.expose()?, &header.salt, &header.kdf)?;
        let plaintext = open(&sealed, payload_key.expose(), aad)
            .map_err(|_| ContainerError::WrongKey)?;

        serde_json::from_slice(plaintext.expose())
            .map_err(|e| ContainerError::Malformed(format!("invalid payload: {e}")))
    }

    fn encode(&self, tree: &TreeData, key: &CompositeKey) -> Result<Vec<u8>, ContainerError> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.try_fill_bytes(&mut salt).map_err(|e| {
            ContainerError::Crypto(strongbox_crypto_core::CryptoError::SecureMemory(format!(
                "CSPRNG fill failed: {e}"
            )))
        })?;

        let header = ContainerHeader {
            version: FORMAT_VERSION,
            kdf: self.params.clone(),
            salt,
            allow_empty_key: tree.meta.allow_empty_key,
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| ContainerError::Malformed(format!("header serialization failed: {e}")))?;
        let header_len = u32::try_from(header_json.len())
            .map_err(|_| ContainerError::Malformed("header too large".into()))?;

        let payload = Zeroizing::new(
            serde_json::to_vec(tree)
                .map_err(|e| ContainerError::Malformed(format!("payload serialization failed: {e}")))?,
        );
        let payload_key = derive(key.expose()?, &header.salt, &header.kdf)?;
        let sealed = seal(&payload, payload_key.expose(), &header_json)?.to_bytes();

        let mut out = Vec::with_capacity(
            MAGIC_LEN
                .saturating_add(LEN_PREFIX)
                .saturating_add(header_json.len())
                .saturating_add(sealed.len()),
        );
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header_json);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn allows_empty_key(&self, bytes: &[u8]) -> bool {
        Self::read_header(bytes).is_ok_and(|h| h.allow_empty_key)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
