//! Password lifecycle state machine.
//!
//! A password is always in exactly one of three states:
//!
//! - decrypted: plaintext value plus plaintext metadata, in memory only
//! - encrypted: ciphertext value plus ciphertext metadata, safe to persist
//! - master: no value at all, only an Argon2id verifier and its salt
//!
//! The variants carry exactly the fields valid for that state, so a
//! half-encrypted password or a master with recoverable plaintext cannot
//! be expressed. Promotion to master is one-way.

use crate::crypto::{cipher, kdf, DerivedKey, Salt};
use crate::model::metadata::{EncryptedMetadata, Metadata};
use crate::{Result, VaultError};
use zeroize::Zeroizing;

#[derive(Clone)]
enum State {
    Decrypted {
        value: Zeroizing<Vec<u8>>,
        metadata: Metadata,
    },
    Encrypted {
        value: Vec<u8>,
        metadata: EncryptedMetadata,
    },
    Master {
        verifier: Vec<u8>,
        salt: Salt,
        metadata: Metadata,
    },
}

fn state_name(state: &State) -> &'static str {
    match state {
        State::Decrypted { .. } => "decrypted",
        State::Encrypted { .. } => "encrypted",
        State::Master { .. } => "master",
    }
}

/// A single secret value in one of the three lifecycle states.
#[derive(Clone)]
pub struct Password {
    state: State,
}

impl Password {
    /// New decrypted password holding `value`, with fresh metadata
    /// attributed to `actor`.
    pub fn new(value: impl Into<Vec<u8>>, actor: &str) -> Self {
        Self {
            state: State::Decrypted {
                value: Zeroizing::new(value.into()),
                metadata: Metadata::new(actor),
            },
        }
    }

    pub fn is_decrypted(&self) -> bool {
        matches!(self.state, State::Decrypted { .. })
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.state, State::Encrypted { .. })
    }

    pub fn is_master(&self) -> bool {
        matches!(self.state, State::Master { .. })
    }

    pub fn state_name(&self) -> &'static str {
        state_name(&self.state)
    }

    /// Plaintext value; only available in the decrypted state.
    pub fn plaintext(&self) -> Result<&[u8]> {
        match &self.state {
            State::Decrypted { value, .. } => Ok(value),
            other => Err(transition_error("read", other)),
        }
    }

    /// Metadata in the clear; `None` while encrypted.
    pub fn metadata(&self) -> Option<&Metadata> {
        match &self.state {
            State::Decrypted { metadata, .. } | State::Master { metadata, .. } => Some(metadata),
            State::Encrypted { .. } => None,
        }
    }

    /// Encrypt the value and its metadata under `key`.
    ///
    /// Records the access in the metadata first, so the sealed copy
    /// carries the time it was last touched. Valid only from the
    /// decrypted state.
    pub fn encrypt(&mut self, key: &DerivedKey, actor: &str) -> Result<()> {
        let (value_blob, metadata_blob) = match &mut self.state {
            State::Decrypted { value, metadata } => {
                metadata.accessed(actor);
                let metadata_blob = cipher::encrypt(&metadata.to_bytes()?, key)?;
                let value_blob = cipher::encrypt(value, key)?;
                (value_blob, metadata_blob)
            }
            other => return Err(transition_error("encrypt", other)),
        };

        self.state = State::Encrypted {
            value: value_blob,
            metadata: EncryptedMetadata::new(metadata_blob),
        };
        Ok(())
    }

    /// Decrypt the value and metadata under `key`.
    ///
    /// Fails with [`VaultError::WrongKey`] when the key does not match;
    /// the password stays encrypted in that case.
    pub fn decrypt(&mut self, key: &DerivedKey) -> Result<()> {
        let (value, metadata) = match &self.state {
            State::Encrypted { value, metadata } => {
                let plain_value = Zeroizing::new(cipher::decrypt(value, key)?);
                let plain_metadata = Metadata::from_bytes(&cipher::decrypt(metadata.as_bytes(), key)?)?;
                (plain_value, plain_metadata)
            }
            other => return Err(transition_error("decrypt", other)),
        };

        self.state = State::Decrypted { value, metadata };
        Ok(())
    }

    /// Promote this password to the master role.
    ///
    /// The plaintext is replaced by an Argon2id verifier and its salt;
    /// the original value is unrecoverable afterwards. One-way, and only
    /// valid from the decrypted state.
    pub fn make_master(&mut self, actor: &str) -> Result<()> {
        let (verifier, salt, metadata) = match &mut self.state {
            State::Decrypted { value, metadata } => {
                let (key, salt) = kdf::derive(value, None)?;
                metadata.modified(actor);
                (key.as_bytes().to_vec(), salt, metadata.clone())
            }
            other => return Err(transition_error("promote", other)),
        };

        self.state = State::Master {
            verifier,
            salt,
            metadata,
        };
        Ok(())
    }

    /// Check a candidate passphrase against a master password.
    ///
    /// Constant-time comparison against the stored verifier; always
    /// `false` for non-master passwords.
    pub fn verify_candidate(&self, passphrase: &[u8]) -> bool {
        match &self.state {
            State::Master { verifier, salt, .. } => kdf::verify(passphrase, verifier, salt),
            _ => false,
        }
    }

    pub(crate) fn encrypted_parts(&self) -> Option<(&[u8], &EncryptedMetadata)> {
        match &self.state {
            State::Encrypted { value, metadata } => Some((value, metadata)),
            _ => None,
        }
    }

    pub(crate) fn from_encrypted_parts(value: Vec<u8>, metadata: EncryptedMetadata) -> Self {
        Self {
            state: State::Encrypted { value, metadata },
        }
    }

    pub(crate) fn master_parts(&self) -> Option<(&[u8], &Salt, &Metadata)> {
        match &self.state {
            State::Master {
                verifier,
                salt,
                metadata,
            } => Some((verifier, salt, metadata)),
            _ => None,
        }
    }

    pub(crate) fn from_master_parts(verifier: Vec<u8>, salt: Salt, metadata: Metadata) -> Self {
        Self {
            state: State::Master {
                verifier,
                salt,
                metadata,
            },
        }
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Password({})", self.state_name())
    }
}

fn transition_error(operation: &'static str, state: &State) -> VaultError {
    VaultError::InvalidStateTransition {
        operation,
        state: state_name(state),
    }
}
