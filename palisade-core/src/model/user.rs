//! Vault owner identity.

use crate::crypto::{kdf, Salt};
use crate::model::password::Password;
use crate::{Result, VaultError};
use sha2::{Digest, Sha256};

/// A registered vault owner.
///
/// The plaintext username never leaves memory; only its SHA-256 hash is
/// stored and used as the owner reference on credential rows. The master
/// password is held in its terminal master state, so the passphrase
/// itself is unrecoverable. The vault salt feeds the separate derivation
/// of the encryption key, keeping the stored login verifier useless for
/// decrypting records.
#[derive(Debug, Clone)]
pub struct User {
    username_hash: String,
    master_password: Password,
    vault_salt: Salt,
}

impl User {
    /// Register an identity from a username and its master password.
    ///
    /// A decrypted password is promoted to master here; an encrypted one
    /// is rejected.
    pub fn new(username: &str, mut password: Password) -> Result<Self> {
        let username_hash = Self::hash_username(username);
        if !password.is_master() {
            password.make_master(&username_hash)?;
        }
        Ok(Self {
            username_hash,
            master_password: password,
            vault_salt: kdf::generate_salt(),
        })
    }

    /// SHA-256 hex digest of a username.
    pub fn hash_username(username: &str) -> String {
        hex::encode(Sha256::digest(username.as_bytes()))
    }

    pub fn username_hash(&self) -> &str {
        &self.username_hash
    }

    pub fn master_password(&self) -> &Password {
        &self.master_password
    }

    /// Constant-time check of a login passphrase.
    pub fn verify_passphrase(&self, passphrase: &[u8]) -> bool {
        self.master_password.verify_candidate(passphrase)
    }

    pub(crate) fn vault_salt(&self) -> &Salt {
        &self.vault_salt
    }

    pub(crate) fn from_parts(
        username_hash: String,
        master_password: Password,
        vault_salt: Salt,
    ) -> Result<Self> {
        if !master_password.is_master() {
            return Err(VaultError::InvalidStateTransition {
                operation: "load",
                state: master_password.state_name(),
            });
        }
        Ok(Self {
            username_hash,
            master_password,
            vault_salt,
        })
    }
}
