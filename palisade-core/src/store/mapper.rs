//! Entity persistence operations.

use crate::crypto::Salt;
use crate::model::metadata::EncryptedMetadata;
use crate::model::{CredentialRecord, User};
use crate::store::codec;
use crate::store::schema::Store;
use crate::{Result, VaultError};

/// Column values for one credential row, computed before any SQL runs so
/// a validation failure leaves the database untouched.
struct CredentialRow {
    description: String,
    username: String,
    history: Vec<u8>,
    categories: Option<Vec<u8>>,
    note: Option<Vec<u8>>,
    metadata: Vec<u8>,
    salt: Vec<u8>,
}

impl CredentialRow {
    fn from_record(record: &CredentialRecord) -> Result<Self> {
        let metadata = record.sealed_metadata()?.as_bytes().to_vec();
        let history = codec::encode_history(record.history())?;
        let categories = if record.categories().is_empty() {
            None
        } else {
            Some(codec::encode_categories(record.categories())?)
        };
        let note = record.note().map(codec::encode_note).transpose()?;

        Ok(Self {
            description: record.description().to_string(),
            username: record.username().unwrap_or("").to_string(),
            history,
            categories,
            note,
            metadata,
            salt: record.salt().to_vec(),
        })
    }
}

impl Store {
    /// Persist a new user row.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        let blob = codec::encode_user(user)?;
        if self.user_exists(user.username_hash())? {
            return Err(VaultError::DuplicateUser);
        }
        self.conn().execute(
            "INSERT INTO users (username_hash, master_password) VALUES (?1, ?2)",
            (user.username_hash(), blob),
        )?;
        Ok(())
    }

    pub fn user_exists(&self, username_hash: &str) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username_hash = ?1)",
            [username_hash],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn retrieve_user_by_username_hash(&self, username_hash: &str) -> Result<User> {
        let blob: Vec<u8> = self
            .conn()
            .query_row(
                "SELECT master_password FROM users WHERE username_hash = ?1",
                [username_hash],
                |row| row.get(0),
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    VaultError::NotFound(format!("user {username_hash}"))
                }
                other => VaultError::Storage(other),
            })?;

        codec::decode_user(username_hash, &blob)
    }

    /// Persist a new credential row and assign its id.
    ///
    /// The record must be fully encrypted; a decrypted record is refused
    /// before any SQL runs.
    pub fn insert_credential(&self, record: &mut CredentialRecord) -> Result<i64> {
        let row = CredentialRow::from_record(record)?;
        if self.credential_exists(record.owner(), &row.description, &row.username, None)? {
            return Err(VaultError::DuplicateCredential {
                description: row.description,
                username: record.username().map(str::to_string),
            });
        }

        self.conn().execute(
            "INSERT INTO credentials
                (owner_username_hash, description, username, password_history,
                 categories, note, metadata, salt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (
                record.owner(),
                &row.description,
                &row.username,
                &row.history,
                &row.categories,
                &row.note,
                &row.metadata,
                &row.salt,
            ),
        )?;

        let id = self.conn().last_insert_rowid();
        record.set_id(id);
        Ok(id)
    }

    /// Overwrite an existing credential row in place.
    pub fn update_credential(&self, record: &CredentialRecord) -> Result<()> {
        let id = record
            .id()
            .ok_or_else(|| VaultError::InvalidInput("credential has no storage id".to_string()))?;
        let row = CredentialRow::from_record(record)?;
        if self.credential_exists(record.owner(), &row.description, &row.username, Some(id))? {
            return Err(VaultError::DuplicateCredential {
                description: row.description,
                username: record.username().map(str::to_string),
            });
        }

        let affected = self.conn().execute(
            "UPDATE credentials
             SET description = ?1, username = ?2, password_history = ?3,
                 categories = ?4, note = ?5, metadata = ?6, salt = ?7
             WHERE id = ?8 AND owner_username_hash = ?9",
            (
                &row.description,
                &row.username,
                &row.history,
                &row.categories,
                &row.note,
                &row.metadata,
                &row.salt,
                id,
                record.owner(),
            ),
        )?;
        if affected == 0 {
            return Err(VaultError::NotFound(format!("credential {id}")));
        }
        Ok(())
    }

    pub fn delete_credential(&self, owner: &str, id: i64) -> Result<()> {
        let affected = self.conn().execute(
            "DELETE FROM credentials WHERE id = ?1 AND owner_username_hash = ?2",
            (id, owner),
        )?;
        if affected == 0 {
            return Err(VaultError::NotFound(format!("credential {id}")));
        }
        Ok(())
    }

    /// Remove a user row; owned credentials go with it via the cascade.
    pub fn delete_user(&self, username_hash: &str) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE username_hash = ?1", [username_hash])?;
        if affected == 0 {
            return Err(VaultError::NotFound(format!("user {username_hash}")));
        }
        Ok(())
    }

    pub fn retrieve_credential(&self, owner: &str, id: i64) -> Result<CredentialRecord> {
        let raw = self
            .conn()
            .query_row(
                "SELECT id, description, username, password_history, categories, note, metadata, salt
                 FROM credentials WHERE id = ?1 AND owner_username_hash = ?2",
                (id, owner),
                raw_row,
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    VaultError::NotFound(format!("credential {id}"))
                }
                other => VaultError::Storage(other),
            })?;

        record_from_raw(owner, raw)
    }

    /// Replace a user's identity row and the sealed payload of every owned
    /// credential in one transaction.
    ///
    /// Used when the username or master passphrase changes: the records
    /// arrive re-encrypted under the new identity, and either the whole
    /// swap lands or none of it does. A changed username hash cascades to
    /// the owner column on credential rows.
    pub fn replace_identity(
        &mut self,
        current_hash: &str,
        user: &User,
        sealed_records: &[CredentialRecord],
    ) -> Result<()> {
        let user_blob = codec::encode_user(user)?;
        let rows: Vec<(i64, CredentialRow)> = sealed_records
            .iter()
            .map(|record| {
                let id = record.id().ok_or_else(|| {
                    VaultError::InvalidInput("credential has no storage id".to_string())
                })?;
                Ok((id, CredentialRow::from_record(record)?))
            })
            .collect::<Result<_>>()?;
        if user.username_hash() != current_hash && self.user_exists(user.username_hash())? {
            return Err(VaultError::DuplicateUser);
        }

        let tx = self.conn_mut().transaction()?;
        let affected = tx.execute(
            "UPDATE users SET username_hash = ?1, master_password = ?2 WHERE username_hash = ?3",
            (user.username_hash(), &user_blob, current_hash),
        )?;
        if affected == 0 {
            return Err(VaultError::NotFound(format!("user {current_hash}")));
        }
        for (id, row) in &rows {
            let affected = tx.execute(
                "UPDATE credentials
                 SET password_history = ?1, categories = ?2, note = ?3, metadata = ?4, salt = ?5
                 WHERE id = ?6 AND owner_username_hash = ?7",
                (
                    &row.history,
                    &row.categories,
                    &row.note,
                    &row.metadata,
                    &row.salt,
                    id,
                    user.username_hash(),
                ),
            )?;
            if affected == 0 {
                return Err(VaultError::NotFound(format!("credential {id}")));
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All credentials owned by a user, in insertion order, still sealed.
    pub fn retrieve_credentials_for_user(&self, username_hash: &str) -> Result<Vec<CredentialRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, description, username, password_history, categories, note, metadata, salt
             FROM credentials WHERE owner_username_hash = ?1 ORDER BY id",
        )?;
        let raws = stmt
            .query_map([username_hash], raw_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raws.into_iter()
            .map(|raw| record_from_raw(username_hash, raw))
            .collect()
    }

    pub(crate) fn credential_exists(
        &self,
        owner: &str,
        description: &str,
        username: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let exists: bool = match exclude_id {
            Some(id) => self.conn().query_row(
                "SELECT EXISTS(SELECT 1 FROM credentials
                 WHERE owner_username_hash = ?1 AND description = ?2 AND username = ?3 AND id != ?4)",
                (owner, description, username, id),
                |row| row.get(0),
            )?,
            None => self.conn().query_row(
                "SELECT EXISTS(SELECT 1 FROM credentials
                 WHERE owner_username_hash = ?1 AND description = ?2 AND username = ?3)",
                (owner, description, username),
                |row| row.get(0),
            )?,
        };
        Ok(exists)
    }
}

type RawRow = (
    i64,
    String,
    String,
    Vec<u8>,
    Option<Vec<u8>>,
    Option<Vec<u8>>,
    Vec<u8>,
    Vec<u8>,
);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn record_from_raw(owner: &str, raw: RawRow) -> Result<CredentialRecord> {
    let (id, description, username, history_blob, categories_blob, note_blob, metadata_blob, salt_blob) =
        raw;

    let history = codec::decode_history(&history_blob)?;
    let categories = match categories_blob {
        Some(blob) => codec::decode_categories(&blob)?,
        None => Vec::new(),
    };
    let note = note_blob.map(|blob| codec::decode_note(&blob)).transpose()?;
    let salt: Salt = salt_blob.as_slice().try_into().map_err(|_| {
        VaultError::Codec("credential: salt column must be 16 bytes".to_string())
    })?;
    let username = if username.is_empty() { None } else { Some(username) };

    Ok(CredentialRecord::from_parts(
        Some(id),
        owner.to_string(),
        description,
        username,
        history,
        categories,
        note,
        EncryptedMetadata::new(metadata_blob),
        salt,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DerivedKey;
    use crate::model::{Category, Password};

    fn test_key(byte: u8) -> DerivedKey {
        DerivedKey::from_bytes([byte; 32])
    }

    fn store_with_user(username: &str) -> (Store, User) {
        let store = Store::in_memory().unwrap();
        let user = User::new(
            username,
            Password::new(b"master passphrase".to_vec(), "setup"),
        )
        .unwrap();
        store.insert_user(&user).unwrap();
        (store, user)
    }

    fn sealed_record(
        owner: &str,
        description: &str,
        username: Option<&str>,
        key: &DerivedKey,
    ) -> CredentialRecord {
        let mut record = CredentialRecord::new(
            owner,
            description,
            username.map(str::to_string),
            Password::new(b"site secret".to_vec(), owner),
        )
        .unwrap();
        record.encrypt(key).unwrap();
        record
    }

    #[test]
    fn test_insert_and_retrieve_user() {
        let (store, user) = store_with_user("alice");

        let restored = store.retrieve_user_by_username_hash(user.username_hash()).unwrap();
        assert_eq!(restored.username_hash(), user.username_hash());
        assert!(restored.verify_passphrase(b"master passphrase"));
    }

    #[test]
    fn test_missing_user_is_not_found() {
        let store = Store::in_memory().unwrap();
        let result = store.retrieve_user_by_username_hash("no-such-hash");
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let (store, _) = store_with_user("alice");
        let again = User::new("alice", Password::new(b"other pass".to_vec(), "setup")).unwrap();

        assert!(matches!(
            store.insert_user(&again),
            Err(VaultError::DuplicateUser)
        ));
    }

    #[test]
    fn test_credential_roundtrip() {
        let key = test_key(1);
        let (store, user) = store_with_user("alice");
        let owner = user.username_hash().to_string();

        let mut record = CredentialRecord::new(
            owner.as_str(),
            "example.com",
            Some("alice@example.com".to_string()),
            Password::new(b"site secret".to_vec(), owner.as_str()),
        )
        .unwrap();
        record.add_category(Category::new("work").unwrap()).unwrap();
        record.set_note(Some("backup codes in drawer".to_string())).unwrap();
        let salt_before = *record.salt();
        record.encrypt(&key).unwrap();

        let id = store.insert_credential(&mut record).unwrap();
        assert_eq!(record.id(), Some(id));

        let mut loaded = store.retrieve_credential(&owner, id).unwrap();
        assert!(loaded.is_encrypted());
        assert_eq!(loaded.salt(), &salt_before);

        loaded.decrypt(&key).unwrap();
        assert_eq!(loaded.description(), "example.com");
        assert_eq!(loaded.username(), Some("alice@example.com"));
        assert_eq!(loaded.note(), Some("backup codes in drawer"));
        assert_eq!(loaded.categories().len(), 1);
        assert_eq!(loaded.current().plaintext().unwrap(), b"site secret");
        assert!(loaded.metadata().is_some());
    }

    #[test]
    fn test_decrypted_record_refused_at_rest() {
        let (store, user) = store_with_user("alice");
        let mut record = CredentialRecord::new(
            user.username_hash(),
            "example.com",
            None,
            Password::new(b"plaintext".to_vec(), user.username_hash()),
        )
        .unwrap();

        let result = store.insert_credential(&mut record);
        assert!(matches!(
            result,
            Err(VaultError::InvalidStateTransition {
                operation: "store",
                state: "decrypted",
            })
        ));
        assert_eq!(record.id(), None);
    }

    #[test]
    fn test_duplicate_credential_rejected() {
        let key = test_key(2);
        let (store, user) = store_with_user("alice");
        let owner = user.username_hash().to_string();

        let mut first = sealed_record(&owner, "example.com", Some("alice"), &key);
        store.insert_credential(&mut first).unwrap();

        let mut duplicate = sealed_record(&owner, "example.com", Some("alice"), &key);
        assert!(matches!(
            store.insert_credential(&mut duplicate),
            Err(VaultError::DuplicateCredential { .. })
        ));

        // Same description under a different username is a new slot.
        let mut other_username = sealed_record(&owner, "example.com", Some("bob"), &key);
        store.insert_credential(&mut other_username).unwrap();
    }

    #[test]
    fn test_duplicate_without_username_rejected() {
        let key = test_key(3);
        let (store, user) = store_with_user("alice");
        let owner = user.username_hash().to_string();

        let mut first = sealed_record(&owner, "example.com", None, &key);
        store.insert_credential(&mut first).unwrap();

        let mut duplicate = sealed_record(&owner, "example.com", None, &key);
        assert!(matches!(
            store.insert_credential(&mut duplicate),
            Err(VaultError::DuplicateCredential { .. })
        ));
    }

    #[test]
    fn test_update_credential() {
        let key = test_key(4);
        let (store, user) = store_with_user("alice");
        let owner = user.username_hash().to_string();

        let mut record = sealed_record(&owner, "example.com", Some("alice"), &key);
        let id = store.insert_credential(&mut record).unwrap();

        let mut loaded = store.retrieve_credential(&owner, id).unwrap();
        loaded.decrypt(&key).unwrap();
        loaded.set_username(Some("alice@example.com".to_string())).unwrap();
        loaded
            .add_password(Password::new(b"rotated secret".to_vec(), owner.as_str()))
            .unwrap();
        loaded.encrypt(&key).unwrap();
        store.update_credential(&loaded).unwrap();

        let mut reread = store.retrieve_credential(&owner, id).unwrap();
        reread.decrypt(&key).unwrap();
        assert_eq!(reread.username(), Some("alice@example.com"));
        assert_eq!(reread.history().len(), 2);
        assert_eq!(reread.current().plaintext().unwrap(), b"rotated secret");
    }

    #[test]
    fn test_update_missing_credential_is_not_found() {
        let key = test_key(5);
        let (store, user) = store_with_user("alice");
        let owner = user.username_hash().to_string();

        let mut record = sealed_record(&owner, "example.com", None, &key);
        let id = store.insert_credential(&mut record).unwrap();
        store.delete_credential(&owner, id).unwrap();

        assert!(matches!(
            store.update_credential(&record),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_credential() {
        let key = test_key(6);
        let (store, user) = store_with_user("alice");
        let owner = user.username_hash().to_string();

        let mut record = sealed_record(&owner, "example.com", None, &key);
        let id = store.insert_credential(&mut record).unwrap();

        store.delete_credential(&owner, id).unwrap();
        assert!(matches!(
            store.delete_credential(&owner, id),
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            store.retrieve_credential(&owner, id),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_user_cascades_to_credentials() {
        let key = test_key(7);
        let (store, user) = store_with_user("alice");
        let owner = user.username_hash().to_string();

        let mut a = sealed_record(&owner, "one.example", None, &key);
        let mut b = sealed_record(&owner, "two.example", None, &key);
        store.insert_credential(&mut a).unwrap();
        store.insert_credential(&mut b).unwrap();

        store.delete_user(&owner).unwrap();

        let remaining: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(matches!(
            store.retrieve_user_by_username_hash(&owner),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_retrieval_is_scoped_to_owner() {
        let key = test_key(8);
        let (store, alice) = store_with_user("alice");
        let bob = User::new("bob", Password::new(b"bob pass".to_vec(), "setup")).unwrap();
        store.insert_user(&bob).unwrap();

        let mut record = sealed_record(alice.username_hash(), "example.com", None, &key);
        let id = store.insert_credential(&mut record).unwrap();

        assert!(matches!(
            store.retrieve_credential(bob.username_hash(), id),
            Err(VaultError::NotFound(_))
        ));
        assert!(store
            .retrieve_credentials_for_user(bob.username_hash())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_retrieve_all_preserves_insertion_order() {
        let key = test_key(9);
        let (store, user) = store_with_user("alice");
        let owner = user.username_hash().to_string();

        for name in ["one.example", "two.example", "three.example"] {
            let mut record = sealed_record(&owner, name, None, &key);
            store.insert_credential(&mut record).unwrap();
        }

        let records = store.retrieve_credentials_for_user(&owner).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.description()).collect();
        assert_eq!(names, ["one.example", "two.example", "three.example"]);
    }

    fn renamed(user: &User, new_username: &str) -> User {
        User::from_parts(
            User::hash_username(new_username),
            user.master_password().clone(),
            *user.vault_salt(),
        )
        .unwrap()
    }

    #[test]
    fn test_replace_identity_moves_hash_and_rows() {
        let key = test_key(10);
        let (mut store, user) = store_with_user("alice");
        let old_hash = user.username_hash().to_string();

        let mut a = sealed_record(&old_hash, "one.example", None, &key);
        let mut b = sealed_record(&old_hash, "two.example", None, &key);
        store.insert_credential(&mut a).unwrap();
        store.insert_credential(&mut b).unwrap();

        let sealed = store.retrieve_credentials_for_user(&old_hash).unwrap();
        let new_user = renamed(&user, "alicia");
        store.replace_identity(&old_hash, &new_user, &sealed).unwrap();

        assert!(!store.user_exists(&old_hash).unwrap());
        let restored = store
            .retrieve_user_by_username_hash(new_user.username_hash())
            .unwrap();
        assert!(restored.verify_passphrase(b"master passphrase"));

        // Credential rows followed the hash and still decrypt.
        let moved = store
            .retrieve_credentials_for_user(new_user.username_hash())
            .unwrap();
        assert_eq!(moved.len(), 2);
        let mut first = moved.into_iter().next().unwrap();
        first.decrypt(&key).unwrap();
        assert_eq!(first.current().plaintext().unwrap(), b"site secret");
    }

    #[test]
    fn test_replace_identity_rolls_back_on_missing_row() {
        let key = test_key(11);
        let (mut store, user) = store_with_user("alice");
        let old_hash = user.username_hash().to_string();

        let mut record = sealed_record(&old_hash, "example.com", None, &key);
        let id = store.insert_credential(&mut record).unwrap();
        let sealed = store.retrieve_credentials_for_user(&old_hash).unwrap();
        store.delete_credential(&old_hash, id).unwrap();

        let new_user = renamed(&user, "alicia");
        assert!(matches!(
            store.replace_identity(&old_hash, &new_user, &sealed),
            Err(VaultError::NotFound(_))
        ));

        // The user rename rolled back with the rest of the transaction.
        assert!(store.user_exists(&old_hash).unwrap());
        assert!(!store.user_exists(new_user.username_hash()).unwrap());
    }

    #[test]
    fn test_replace_identity_to_taken_hash_rejected() {
        let (mut store, alice) = store_with_user("alice");
        let bob = User::new("bob", Password::new(b"bob pass".to_vec(), "setup")).unwrap();
        store.insert_user(&bob).unwrap();

        let clash = renamed(&alice, "bob");
        assert!(matches!(
            store.replace_identity(alice.username_hash(), &clash, &[]),
            Err(VaultError::DuplicateUser)
        ));
        assert!(store.user_exists(alice.username_hash()).unwrap());
    }
}
