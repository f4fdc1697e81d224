//! Credential records: a described secret with its password history.

use crate::crypto::{cipher, kdf, DerivedKey, Salt};
use crate::model::metadata::{EncryptedMetadata, Metadata};
use crate::model::password::Password;
use crate::{Result, VaultError};

/// Maximum number of categories on one record
pub const MAX_CATEGORIES: usize = 5;

/// A non-empty label used to group credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category(String);

impl Category {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "category name must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
enum MetadataState {
    Plain(Metadata),
    Sealed(EncryptedMetadata),
}

/// One credential: description, optional username, an append-only
/// password history, categories, and a free-form note.
///
/// The record and everything in it encrypts and decrypts as a unit; a
/// record is never persisted half-sealed. Each record carries its own
/// random salt from which its encryption key is expanded.
#[derive(Clone)]
pub struct CredentialRecord {
    id: Option<i64>,
    owner: String,
    description: String,
    username: Option<String>,
    history: Vec<Password>,
    categories: Vec<Category>,
    note: Option<String>,
    metadata: MetadataState,
    salt: Salt,
}

impl CredentialRecord {
    /// New record owned by `owner` (a username hash) with its first
    /// password. The initial password must be decrypted.
    pub fn new(
        owner: impl Into<String>,
        description: impl Into<String>,
        username: Option<String>,
        password: Password,
    ) -> Result<Self> {
        let owner = owner.into();
        let description = description.into();
        if description.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "credential description must not be empty".to_string(),
            ));
        }
        if !password.is_decrypted() {
            return Err(VaultError::InvalidStateTransition {
                operation: "enroll",
                state: password.state_name(),
            });
        }

        let metadata = Metadata::new(&owner);
        Ok(Self {
            id: None,
            owner,
            description,
            username,
            history: vec![password],
            categories: Vec::new(),
            note: None,
            metadata: MetadataState::Plain(metadata),
            salt: kdf::generate_salt(),
        })
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Full password history, oldest first. The last entry is current.
    pub fn history(&self) -> &[Password] {
        &self.history
    }

    /// The password currently in effect.
    pub fn current(&self) -> &Password {
        // history is never empty: new() seeds it and nothing removes from it
        &self.history[self.history.len() - 1]
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match &self.metadata {
            MetadataState::Plain(metadata) => Some(metadata),
            MetadataState::Sealed(_) => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.metadata, MetadataState::Sealed(_))
    }

    pub(crate) fn salt(&self) -> &Salt {
        &self.salt
    }

    pub(crate) fn refresh_salt(&mut self) {
        self.salt = kdf::generate_salt();
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Move the record to a new owner hash, as part of a username change.
    pub(crate) fn set_owner(&mut self, owner: String) {
        self.owner = owner;
    }

    /// Append a new password; the previous one stays in the history.
    pub fn add_password(&mut self, password: Password) -> Result<()> {
        if password.is_master() {
            return Err(VaultError::InvalidStateTransition {
                operation: "append",
                state: "master",
            });
        }
        if !password.is_decrypted() {
            return Err(VaultError::InvalidStateTransition {
                operation: "append",
                state: password.state_name(),
            });
        }
        self.touch_modified()?;
        self.history.push(password);
        Ok(())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<()> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "credential description must not be empty".to_string(),
            ));
        }
        self.touch_modified()?;
        self.description = description;
        Ok(())
    }

    pub fn set_username(&mut self, username: Option<String>) -> Result<()> {
        self.touch_modified()?;
        self.username = username;
        Ok(())
    }

    pub fn set_note(&mut self, note: Option<String>) -> Result<()> {
        self.touch_modified()?;
        self.note = note;
        Ok(())
    }

    /// Attach a category, capped at [`MAX_CATEGORIES`] distinct entries.
    pub fn add_category(&mut self, category: Category) -> Result<()> {
        if self.categories.contains(&category) {
            return Err(VaultError::InvalidInput(format!(
                "category {:?} is already attached",
                category.name()
            )));
        }
        if self.categories.len() >= MAX_CATEGORIES {
            return Err(VaultError::InvalidInput(format!(
                "a credential holds at most {MAX_CATEGORIES} categories"
            )));
        }
        self.touch_modified()?;
        self.categories.push(category);
        Ok(())
    }

    pub fn remove_category(&mut self, name: &str) -> Result<()> {
        let index = self
            .categories
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| VaultError::NotFound(format!("category {name:?}")))?;
        self.touch_modified()?;
        self.categories.remove(index);
        Ok(())
    }

    /// Encrypt the record: every password in the history and the record
    /// metadata, as one unit.
    ///
    /// Validates the whole history up front and stages the result, so a
    /// failure leaves the record exactly as it was.
    pub fn encrypt(&mut self, key: &DerivedKey) -> Result<()> {
        let MetadataState::Plain(metadata) = &mut self.metadata else {
            return Err(VaultError::InvalidStateTransition {
                operation: "encrypt",
                state: "encrypted",
            });
        };
        for password in &self.history {
            if !password.is_decrypted() {
                return Err(VaultError::InvalidStateTransition {
                    operation: "encrypt",
                    state: password.state_name(),
                });
            }
        }

        let mut staged = self.history.clone();
        for password in &mut staged {
            password.encrypt(key, &self.owner)?;
        }

        metadata.accessed(&self.owner);
        let sealed = EncryptedMetadata::new(cipher::encrypt(&metadata.to_bytes()?, key)?);

        self.history = staged;
        self.metadata = MetadataState::Sealed(sealed);
        Ok(())
    }

    /// Decrypt the record as one unit. With the wrong key this fails
    /// with [`VaultError::WrongKey`] and the record stays sealed.
    pub fn decrypt(&mut self, key: &DerivedKey) -> Result<()> {
        let sealed = match &self.metadata {
            MetadataState::Sealed(sealed) => sealed,
            MetadataState::Plain(_) => {
                return Err(VaultError::InvalidStateTransition {
                    operation: "decrypt",
                    state: "decrypted",
                });
            }
        };
        for password in &self.history {
            if !password.is_encrypted() {
                return Err(VaultError::InvalidStateTransition {
                    operation: "decrypt",
                    state: password.state_name(),
                });
            }
        }

        let metadata = Metadata::from_bytes(&cipher::decrypt(sealed.as_bytes(), key)?)?;
        let mut staged = self.history.clone();
        for password in &mut staged {
            password.decrypt(key)?;
        }

        self.history = staged;
        self.metadata = MetadataState::Plain(metadata);
        Ok(())
    }

    pub(crate) fn sealed_metadata(&self) -> Result<&EncryptedMetadata> {
        match &self.metadata {
            MetadataState::Sealed(sealed) => Ok(sealed),
            MetadataState::Plain(_) => Err(VaultError::InvalidStateTransition {
                operation: "store",
                state: "decrypted",
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: Option<i64>,
        owner: String,
        description: String,
        username: Option<String>,
        history: Vec<Password>,
        categories: Vec<Category>,
        note: Option<String>,
        metadata: EncryptedMetadata,
        salt: Salt,
    ) -> Self {
        Self {
            id,
            owner,
            description,
            username,
            history,
            categories,
            note,
            metadata: MetadataState::Sealed(metadata),
            salt,
        }
    }

    fn touch_modified(&mut self) -> Result<()> {
        match &mut self.metadata {
            MetadataState::Plain(metadata) => {
                metadata.modified(&self.owner);
                Ok(())
            }
            MetadataState::Sealed(_) => Err(VaultError::InvalidStateTransition {
                operation: "modify",
                state: "encrypted",
            }),
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("username", &self.username)
            .field("passwords", &self.history.len())
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
