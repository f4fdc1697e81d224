//! Argon2id key derivation for master passphrase processing.
//!
//! Uses Argon2id with parameters:
//! - Memory cost: 64 MB (65,536 KiB)
//! - Time cost: 3 iterations
//! - Parallelism: 4 lanes
//! - Output length: 32 bytes (256 bits)
//! - Salt length: 16 bytes
//!
//! The memory-hard derivation runs once per login to produce the vault key;
//! per-record keys are expanded from it with HKDF-SHA256 and a per-record
//! salt, so adding a credential never re-runs Argon2.

use crate::crypto::{CryptoError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

/// Derived key length in bytes
pub const KEY_SIZE: usize = 32;

/// Salt length in bytes
pub const SALT_SIZE: usize = 16;

/// Memory cost in KiB (65,536 = 64 MB)
const MEM_COST_KIB: u32 = 65_536;

/// Number of Argon2 iterations
const TIME_COST: u32 = 3;

/// Number of Argon2 lanes
const LANES: u32 = 4;

/// Domain separation label for per-record subkeys
const RECORD_KEY_INFO: &[u8] = b"palisade.credential-record.v1";

/// Random salt for key derivation
pub type Salt = [u8; SALT_SIZE];

/// A 256-bit symmetric key produced by `derive` or `derive_record_key`.
///
/// The key material is zeroized on drop and never shown by `Debug`.
#[derive(Clone)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Generate a fresh random salt
pub fn generate_salt() -> Salt {
    rand::random()
}

/// Derive a 32-byte key from a passphrase using Argon2id.
///
/// When `salt` is `None` a fresh random salt is generated; the salt
/// actually used is returned alongside the key so callers can persist it.
pub fn derive(passphrase: &[u8], salt: Option<Salt>) -> Result<(DerivedKey, Salt)> {
    let salt = salt.unwrap_or_else(generate_salt);

    let params = Params::new(MEM_COST_KIB, TIME_COST, LANES, Some(KEY_SIZE))
        .map_err(|e| CryptoError::Primitive(format!("invalid Argon2 parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase, &salt, &mut output)
        .map_err(|e| CryptoError::Primitive(format!("key derivation failed: {e}")))?;

    Ok((DerivedKey(output), salt))
}

/// Verify a passphrase against a stored verifier.
///
/// Re-derives the key under the stored salt and compares in constant time.
/// Never raises on mismatch, only returns `false`; a primitive failure
/// during re-derivation also counts as a failed verification.
pub fn verify(passphrase: &[u8], expected: &[u8], salt: &Salt) -> bool {
    use subtle::ConstantTimeEq;

    match derive(passphrase, Some(*salt)) {
        Ok((candidate, _)) => {
            let candidate_ref = candidate.as_bytes() as &[u8];
            candidate_ref.ct_eq(expected).into()
        }
        Err(_) => false,
    }
}

/// Expand a per-record subkey from the session vault key.
///
/// Uses HKDF-SHA256 with the record's stored salt as the extraction salt,
/// so every record is encrypted under its own key while the memory-hard
/// Argon2 cost is paid only once per login.
pub fn derive_record_key(vault_key: &DerivedKey, record_salt: &Salt) -> Result<DerivedKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(record_salt), vault_key.as_bytes());

    let mut output = [0u8; KEY_SIZE];
    hkdf.expand(RECORD_KEY_INFO, &mut output)
        .map_err(|e| CryptoError::Primitive(format!("subkey expansion failed: {e}")))?;

    Ok(DerivedKey(output))
}
