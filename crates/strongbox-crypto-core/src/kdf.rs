//! Argon2id key derivation.
//!
//! Turns a composite key digest into the container's payload key. The
//! parameters travel in the container header so a container can always be
//! reopened with the cost it was sealed with.

use crate::error::CryptoError;
use crate::memory::SecretBytes;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Output length of the KDF in bytes (256 bits).
pub const OUTPUT_LEN: usize = 32;

/// Minimum salt length in bytes. Stricter than argon2's 8.
pub const MIN_SALT_LEN: usize = 16;

/// Argon2id parameter set, stored in the container header.
///
/// Fields use the `argon2` crate convention: `m_cost` in KiB, `t_cost`
/// iterations, `p_cost` lanes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2idParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for Argon2idParams {
    /// 64 MiB, 2 passes, 2 lanes.
    fn default() -> Self {
        Self {
            m_cost: 65_536,
            t_cost: 2,
            p_cost: 2,
        }
    }
}

/// Derive a 256-bit key from `secret` and `salt` with Argon2id.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if the salt is shorter than
/// [`MIN_SALT_LEN`], the parameters are rejected by `argon2`, or the
/// derivation itself fails.
pub fn derive(
    secret: &[u8],
    salt: &[u8],
    params: &Argon2idParams,
) -> Result<SecretBytes<OUTPUT_LEN>, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }

    let argon2_params = argon2::Params::new(
        params.m_cost,
        params.t_cost,
        params.p_cost,
        Some(OUTPUT_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = [0u8; OUTPUT_LEN];
    if let Err(e) = argon2.hash_password_into(secret, salt, &mut output) {
        output.zeroize();
        return Err(CryptoError::KeyDerivation(format!(
            "argon2id derivation failed: {e}"
        )));
    }

    Ok(SecretBytes::new(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2idParams {
        Argon2idParams {
            m_cost: 32,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn derive_is_deterministic() {
        let salt = [7u8; 16];
        let a = derive(b"secret", &salt, &cheap()).unwrap();
        let b = derive(b"secret", &salt, &cheap()).unwrap();
        assert_eq!(a.expose(), b.expose());
    }

    #[test]
    fn derive_depends_on_salt() {
        let a = derive(b"secret", &[1u8; 16], &cheap()).unwrap();
        let b = derive(b"secret", &[2u8; 16], &cheap()).unwrap();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn derive_rejects_short_salt() {
        let err = derive(b"secret", &[0u8; 8], &cheap()).unwrap_err();
        assert!(matches!(err, CryptoError::KeyDerivation(_)));
    }

    #[test]
    fn derive_rejects_invalid_params() {
        let params = Argon2idParams {
            m_cost: 1,
            t_cost: 0,
            p_cost: 1,
        };
        assert!(derive(b"secret", &[0u8; 16], &params).is_err());
    }
}
