//! Vault facade - coordinates crypto, model, and storage layers


use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::breach::{self, AbortFlag, RangeLookup, RecordCheck, DEFAULT_BATCH_CONCURRENCY};
use crate::crypto::kdf;
use crate::crypto::strength::{analyze_password, StrengthReport};
use crate::crypto::DerivedKey;
use crate::import_export::{self, ExportRecord, ImportedRecord};
use crate::model::{Category, CredentialRecord, Password, User};
use crate::platform::{ensure_data_dir, get_default_vault_path};
use crate::session::Session;
use crate::store::Store;
use crate::{Result, VaultError};

/// Single-user credential vault over a SQLite store.
///
/// Every operation that touches secrets takes a [`Session`], obtained
/// from [`Vault::register`] or [`Vault::login`]. Records go to storage
/// encrypted under a per-record key and come back decrypted for use.
pub struct Vault {
    store: Store,
}

impl Vault {
    /// Open (or create) a vault database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            store: Store::open(path)?,
        })
    }

    /// Open the vault at the platform default path, creating the data
    /// directory if necessary.
    pub fn open_default() -> Result<Self> {
        ensure_data_dir()?;
        Self::open(get_default_vault_path())
    }

    /// Fully in-memory vault, for tests and ephemeral use.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::in_memory()?,
        })
    }

    /// Register a new user and hand back their first session.
    pub fn register(&self, username: &str, passphrase: &[u8]) -> Result<Session> {
        if username.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "username must not be blank".to_string(),
            ));
        }
        if passphrase.is_empty() {
            return Err(VaultError::InvalidInput(
                "passphrase must not be empty".to_string(),
            ));
        }

        let username_hash = User::hash_username(username);
        let user = User::new(username, Password::new(passphrase.to_vec(), &username_hash))?;
        self.store.insert_user(&user)?;
        let (vault_key, _) = kdf::derive(passphrase, Some(*user.vault_salt()))?;

        info!(user = %user.username_hash(), "user registered");
        Ok(Session::new(user, vault_key))
    }

    /// Authenticate a user.
    ///
    /// Unknown usernames and wrong passphrases both come back as
    /// `Ok(None)`; the caller cannot tell which it was. `Err` is reserved
    /// for storage and derivation failures.
    pub fn login(&self, username: &str, passphrase: &[u8]) -> Result<Option<Session>> {
        let username_hash = User::hash_username(username);
        let user = match self.store.retrieve_user_by_username_hash(&username_hash) {
            Ok(user) => user,
            Err(VaultError::NotFound(_)) => {
                debug!("login rejected: unknown user");
                return Ok(None);
            }
            Err(other) => return Err(other),
        };

        if !user.verify_passphrase(passphrase) {
            debug!("login rejected: verifier mismatch");
            return Ok(None);
        }

        let (vault_key, _) = kdf::derive(passphrase, Some(*user.vault_salt()))?;
        info!(user = %user.username_hash(), "login succeeded");
        Ok(Some(Session::new(user, vault_key)))
    }

    /// Create a credential record and persist it encrypted.
    ///
    /// The returned record is decrypted, with its storage id assigned.
    pub fn add_credential(
        &self,
        session: &Session,
        description: &str,
        username: Option<String>,
        password: &str,
    ) -> Result<CredentialRecord> {
        let actor = session.username_hash();
        let initial = Password::new(password.as_bytes().to_vec(), actor);
        let mut record = CredentialRecord::new(actor, description, username, initial)?;
        self.persist_new(session, &mut record)?;
        Ok(record)
    }

    /// Load one credential, decrypted for use.
    pub fn credential(&self, session: &Session, id: i64) -> Result<CredentialRecord> {
        let mut record = self.store.retrieve_credential(session.username_hash(), id)?;
        self.unseal(session, &mut record)?;
        Ok(record)
    }

    /// Load every credential the user owns, decrypted, in insertion order.
    pub fn list_credentials(&self, session: &Session) -> Result<Vec<CredentialRecord>> {
        let mut records = self
            .store
            .retrieve_credentials_for_user(session.username_hash())?;
        for record in &mut records {
            self.unseal(session, record)?;
        }
        Ok(records)
    }

    /// Persist edits made to a decrypted record.
    pub fn save_credential(&self, session: &Session, record: &mut CredentialRecord) -> Result<()> {
        self.persist_update(session, record)
    }

    /// Rotate a credential's secret; the old value stays in the history.
    pub fn append_password(
        &self,
        session: &Session,
        id: i64,
        password: &str,
    ) -> Result<CredentialRecord> {
        let mut record = self.credential(session, id)?;
        record.add_password(Password::new(
            password.as_bytes().to_vec(),
            session.username_hash(),
        ))?;
        self.persist_update(session, &mut record)?;
        Ok(record)
    }

    /// Delete one credential.
    pub fn delete_credential(&self, session: &Session, id: i64) -> Result<()> {
        self.store.delete_credential(session.username_hash(), id)?;
        info!(credential = id, "credential deleted");
        Ok(())
    }

    /// Delete the authenticated user and every credential they own.
    pub fn delete_user(&self, session: Session) -> Result<()> {
        self.store.delete_user(session.username_hash())?;
        info!(user = %session.username_hash(), "user deleted");
        Ok(())
    }

    /// Re-key the vault under a new master passphrase.
    ///
    /// Owned credentials are decrypted under the old key and sealed again
    /// under the new one before any row is replaced; the store swap is a
    /// single transaction.
    pub fn change_master_passphrase(
        &mut self,
        session: &mut Session,
        new_passphrase: &[u8],
    ) -> Result<()> {
        if new_passphrase.is_empty() {
            return Err(VaultError::InvalidInput(
                "passphrase must not be empty".to_string(),
            ));
        }
        let current_hash = session.username_hash().to_string();

        let mut master = Password::new(new_passphrase.to_vec(), &current_hash);
        master.make_master(&current_hash)?;
        let user = User::from_parts(current_hash.clone(), master, kdf::generate_salt())?;
        let (vault_key, _) = kdf::derive(new_passphrase, Some(*user.vault_salt()))?;

        let sealed = self.reseal_all(session, &user, &vault_key)?;
        self.store.replace_identity(&current_hash, &user, &sealed)?;
        session.replace_user(user, vault_key);
        info!(user = %current_hash, "master passphrase changed");
        Ok(())
    }

    /// Rename the vault owner.
    ///
    /// The passphrase and vault key are untouched; the username hash is
    /// re-derived and every owned row moves to it in one transaction.
    pub fn change_username(&mut self, session: &mut Session, new_username: &str) -> Result<()> {
        if new_username.trim().is_empty() {
            return Err(VaultError::InvalidInput(
                "username must not be blank".to_string(),
            ));
        }
        let current_hash = session.username_hash().to_string();
        let new_hash = User::hash_username(new_username);
        if new_hash == current_hash {
            return Ok(());
        }

        let user = User::from_parts(
            new_hash,
            session.user().master_password().clone(),
            *session.user().vault_salt(),
        )?;
        let vault_key = session.vault_key().clone();

        let sealed = self.reseal_all(session, &user, &vault_key)?;
        self.store.replace_identity(&current_hash, &user, &sealed)?;
        session.replace_user(user, vault_key);
        info!("username changed");
        Ok(())
    }

    /// How many known breaches the credential's current password appears
    /// in. Zero means confirmed absent; an unreachable endpoint is an
    /// error, never zero.
    pub async fn check_credential(
        &self,
        session: &Session,
        id: i64,
        lookup: &impl RangeLookup,
    ) -> Result<u64> {
        let record = self.credential(session, id)?;
        let plaintext = record.current().plaintext()?.to_vec();
        breach::check_password(&plaintext, lookup).await
    }

    /// Breach-check every credential's current password.
    ///
    /// Storage reads complete before the first lookup is issued, so no
    /// database access spans a network call. Lookups run concurrently and
    /// each record gets its own slot in the report.
    pub async fn check_all_credentials<C>(
        &self,
        session: &Session,
        client: Arc<C>,
        abort: AbortFlag,
    ) -> Result<Vec<RecordCheck>>
    where
        C: RangeLookup + 'static,
    {
        let records = self.list_credentials(session)?;
        let mut candidates = Vec::with_capacity(records.len());
        for record in &records {
            let id = record.id().ok_or_else(|| {
                VaultError::InvalidInput("credential has no storage id".to_string())
            })?;
            candidates.push((id, record.current().plaintext()?.to_vec()));
        }

        debug!(count = candidates.len(), "starting batch breach check");
        breach::check_batch(client, candidates, DEFAULT_BATCH_CONCURRENCY, abort).await
    }

    /// Import credentials from an interchange document.
    ///
    /// The whole document is validated, and every incoming record checked
    /// against existing rows for duplicates, before the first row is
    /// written. Returns the number of credentials imported.
    pub fn import_document(&self, session: &Session, document: &str) -> Result<usize> {
        let imported = import_export::parse_document(document)?;
        let mut records = Vec::with_capacity(imported.len());
        for entry in &imported {
            records.push(self.record_from_import(session, entry)?);
        }

        let mut seen: HashSet<(String, String)> = HashSet::new();
        for record in &records {
            let username = record.username().unwrap_or("");
            let key = (record.description().to_string(), username.to_string());
            let collides = !seen.insert(key)
                || self.store.credential_exists(
                    session.username_hash(),
                    record.description(),
                    username,
                    None,
                )?;
            if collides {
                return Err(VaultError::DuplicateCredential {
                    description: record.description().to_string(),
                    username: record.username().map(str::to_string),
                });
            }
        }

        let count = records.len();
        for record in &mut records {
            self.persist_new(session, record)?;
        }
        info!(count, "credentials imported");
        Ok(count)
    }

    /// Export every credential as a pretty-printed interchange document.
    pub fn export_document(&self, session: &Session) -> Result<String> {
        let records = self.list_credentials(session)?;
        let mut entries = Vec::with_capacity(records.len());
        for record in &records {
            entries.push(ExportRecord::from_record(record)?);
        }
        import_export::export_document(&entries)
    }

    fn record_from_import(
        &self,
        session: &Session,
        entry: &ImportedRecord,
    ) -> Result<CredentialRecord> {
        let actor = session.username_hash();
        let chain = entry.password_chain();
        let (first, rest) = chain.split_first().ok_or_else(|| {
            VaultError::InvalidInput("imported record has no password".to_string())
        })?;

        let mut record = CredentialRecord::new(
            actor,
            entry.description.as_str(),
            entry.username.clone(),
            Password::new(first.as_bytes().to_vec(), actor),
        )?;
        for value in rest {
            record.add_password(Password::new(value.as_bytes().to_vec(), actor))?;
        }
        for name in &entry.categories {
            record.add_category(Category::new(name.clone())?)?;
        }
        if entry.note.is_some() {
            record.set_note(entry.note.clone())?;
        }
        Ok(record)
    }

    /// Seal a fresh record and insert it; the caller's copy stays
    /// decrypted and picks up the assigned id.
    fn persist_new(&self, session: &Session, record: &mut CredentialRecord) -> Result<()> {
        let record_key = kdf::derive_record_key(session.vault_key(), record.salt())?;
        let mut sealed = record.clone();
        sealed.encrypt(&record_key)?;
        let id = self.store.insert_credential(&mut sealed)?;
        record.set_id(id);
        debug!(credential = id, "credential stored");
        Ok(())
    }

    /// Seal an edited record under a fresh salt and overwrite its row.
    fn persist_update(&self, session: &Session, record: &mut CredentialRecord) -> Result<()> {
        record.refresh_salt();
        let record_key = kdf::derive_record_key(session.vault_key(), record.salt())?;
        let mut sealed = record.clone();
        sealed.encrypt(&record_key)?;
        self.store.update_credential(&sealed)?;
        debug!(credential = ?record.id(), "credential updated");
        Ok(())
    }

    fn unseal(&self, session: &Session, record: &mut CredentialRecord) -> Result<()> {
        let record_key = kdf::derive_record_key(session.vault_key(), record.salt())?;
        record.decrypt(&record_key)
    }

    /// Decrypt every owned record and seal it again for a new identity:
    /// fresh salts, new owner stamp, keys derived from `vault_key`.
    /// Nothing is written; a failure anywhere leaves the store untouched.
    fn reseal_all(
        &self,
        session: &Session,
        owner: &User,
        vault_key: &DerivedKey,
    ) -> Result<Vec<CredentialRecord>> {
        let mut records = self.list_credentials(session)?;
        for record in &mut records {
            record.set_owner(owner.username_hash().to_string());
            record.refresh_salt();
            let record_key = kdf::derive_record_key(vault_key, record.salt())?;
            record.encrypt(&record_key)?;
        }
        Ok(records)
    }
}

/// Combined strength and breach standing of a candidate password.
#[derive(Debug, Clone)]
pub struct SafetyReport {
    pub strength: StrengthReport,
    pub breach_count: u64,
}

/// Analyze a candidate password locally and against the breach database.
///
/// An unreachable breach endpoint is an error; a password of unknown
/// standing is never reported as safe.
pub async fn validate_password_safety(
    password: &str,
    lookup: &impl RangeLookup,
) -> Result<SafetyReport> {
    let strength = analyze_password(password);
    let breach_count = breach::check_password(password.as_bytes(), lookup).await?;
    Ok(SafetyReport {
        strength,
        breach_count,
    })
}
