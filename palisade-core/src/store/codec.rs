//! Versioned binary framing for entity blobs.
//!
//! Every blob opens with a one-byte format version, followed by tagged
//! fields laid out as `[tag: u8][len: u32 LE][payload]`. Decoding demands
//! the exact tags in order and rejects trailing bytes, so a truncated,
//! reordered, or foreign blob never half-parses into an entity.

use crate::crypto::{Salt, SALT_SIZE};
use crate::model::metadata::EncryptedMetadata;
use crate::model::{Category, Metadata, Password, User};
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};

/// Current on-disk format version, stamped on every blob and on the
/// vault metadata row.
pub const FORMAT_VERSION: u8 = 1;

// Field tags, one range per entity family.
pub(crate) const TAG_META_CREATED_AT: u8 = 0x01;
pub(crate) const TAG_META_CREATED_BY: u8 = 0x02;
pub(crate) const TAG_META_MODIFIED_AT: u8 = 0x03;
pub(crate) const TAG_META_MODIFIED_BY: u8 = 0x04;
pub(crate) const TAG_META_ACCESSED_AT: u8 = 0x05;
pub(crate) const TAG_META_ACCESSED_BY: u8 = 0x06;

pub(crate) const TAG_USER_VERIFIER: u8 = 0x10;
pub(crate) const TAG_USER_VERIFIER_SALT: u8 = 0x11;
pub(crate) const TAG_USER_VAULT_SALT: u8 = 0x12;
pub(crate) const TAG_USER_METADATA: u8 = 0x13;

pub(crate) const TAG_HISTORY_COUNT: u8 = 0x20;
pub(crate) const TAG_PASSWORD_VALUE: u8 = 0x21;
pub(crate) const TAG_PASSWORD_METADATA: u8 = 0x22;

pub(crate) const TAG_CATEGORY_COUNT: u8 = 0x30;
pub(crate) const TAG_CATEGORY_NAME: u8 = 0x31;

pub(crate) const TAG_NOTE_TEXT: u8 = 0x40;

pub(crate) struct BlobWriter {
    buf: Vec<u8>,
}

impl BlobWriter {
    pub fn new() -> Self {
        Self {
            buf: vec![FORMAT_VERSION],
        }
    }

    pub fn field(&mut self, tag: u8, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| VaultError::Codec(format!("field 0x{tag:02x} exceeds frame size")))?;
        self.buf.push(tag);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    pub fn field_str(&mut self, tag: u8, value: &str) -> Result<()> {
        self.field(tag, value.as_bytes())
    }

    pub fn field_i64(&mut self, tag: u8, value: i64) -> Result<()> {
        self.field(tag, &value.to_le_bytes())
    }

    pub fn field_u32(&mut self, tag: u8, value: u32) -> Result<()> {
        self.field(tag, &value.to_le_bytes())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) struct BlobReader<'a> {
    buf: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> BlobReader<'a> {
    pub fn new(buf: &'a [u8], context: &'static str) -> Result<Self> {
        let Some(&version) = buf.first() else {
            return Err(VaultError::Codec(format!("{context}: empty blob")));
        };
        if version != FORMAT_VERSION {
            return Err(VaultError::Codec(format!(
                "{context}: unsupported format version {version}"
            )));
        }
        Ok(Self {
            buf,
            pos: 1,
            context,
        })
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| VaultError::Codec(format!("{}: truncated blob", self.context)))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn field(&mut self, expected: u8) -> Result<&'a [u8]> {
        let tag = self.take(1)?[0];
        if tag != expected {
            return Err(VaultError::Codec(format!(
                "{}: expected field 0x{expected:02x}, found 0x{tag:02x}",
                self.context
            )));
        }
        let len_bytes = self.take(4)?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        self.take(len as usize)
    }

    pub fn field_str(&mut self, tag: u8) -> Result<String> {
        String::from_utf8(self.field(tag)?.to_vec()).map_err(|_| {
            VaultError::Codec(format!(
                "{}: invalid UTF-8 in field 0x{tag:02x}",
                self.context
            ))
        })
    }

    pub fn field_i64(&mut self, tag: u8) -> Result<i64> {
        let bytes = self.field(tag)?;
        if bytes.len() != 8 {
            return Err(VaultError::Codec(format!(
                "{}: field 0x{tag:02x} must be 8 bytes",
                self.context
            )));
        }
        Ok(i64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn field_u32(&mut self, tag: u8) -> Result<u32> {
        let bytes = self.field(tag)?;
        if bytes.len() != 4 {
            return Err(VaultError::Codec(format!(
                "{}: field 0x{tag:02x} must be 4 bytes",
                self.context
            )));
        }
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn field_timestamp(&mut self, tag: u8) -> Result<DateTime<Utc>> {
        let secs = self.field_i64(tag)?;
        DateTime::from_timestamp(secs, 0).ok_or_else(|| {
            VaultError::Codec(format!("{}: timestamp out of range", self.context))
        })
    }

    pub fn field_salt(&mut self, tag: u8) -> Result<Salt> {
        self.field(tag)?.try_into().map_err(|_| {
            VaultError::Codec(format!(
                "{}: salt must be {SALT_SIZE} bytes",
                self.context
            ))
        })
    }

    pub fn finish(&self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(VaultError::Codec(format!(
                "{}: trailing bytes after last field",
                self.context
            )));
        }
        Ok(())
    }
}

/// Serialize a user's master block: login verifier with its salt, the
/// vault key salt, and the master metadata.
pub(crate) fn encode_user(user: &User) -> Result<Vec<u8>> {
    let Some((verifier, verifier_salt, metadata)) = user.master_password().master_parts() else {
        return Err(VaultError::InvalidStateTransition {
            operation: "store",
            state: user.master_password().state_name(),
        });
    };

    let mut writer = BlobWriter::new();
    writer.field(TAG_USER_VERIFIER, verifier)?;
    writer.field(TAG_USER_VERIFIER_SALT, verifier_salt)?;
    writer.field(TAG_USER_VAULT_SALT, user.vault_salt())?;
    writer.field(TAG_USER_METADATA, &metadata.to_bytes()?)?;
    Ok(writer.finish())
}

pub(crate) fn decode_user(username_hash: &str, blob: &[u8]) -> Result<User> {
    let mut reader = BlobReader::new(blob, "user")?;
    let verifier = reader.field(TAG_USER_VERIFIER)?.to_vec();
    let verifier_salt = reader.field_salt(TAG_USER_VERIFIER_SALT)?;
    let vault_salt = reader.field_salt(TAG_USER_VAULT_SALT)?;
    let metadata = Metadata::from_bytes(reader.field(TAG_USER_METADATA)?)?;
    reader.finish()?;

    let master = Password::from_master_parts(verifier, verifier_salt, metadata);
    User::from_parts(username_hash.to_string(), master, vault_salt)
}

/// Serialize an encrypted password history, oldest first.
///
/// Refuses any password that is not in the encrypted state, so plaintext
/// can never reach a storage row through this path.
pub(crate) fn encode_history(history: &[Password]) -> Result<Vec<u8>> {
    let count = u32::try_from(history.len())
        .map_err(|_| VaultError::Codec("history exceeds frame size".to_string()))?;

    let mut writer = BlobWriter::new();
    writer.field_u32(TAG_HISTORY_COUNT, count)?;
    for password in history {
        let Some((value, metadata)) = password.encrypted_parts() else {
            return Err(VaultError::InvalidStateTransition {
                operation: "store",
                state: password.state_name(),
            });
        };
        writer.field(TAG_PASSWORD_VALUE, value)?;
        writer.field(TAG_PASSWORD_METADATA, metadata.as_bytes())?;
    }
    Ok(writer.finish())
}

pub(crate) fn decode_history(blob: &[u8]) -> Result<Vec<Password>> {
    let mut reader = BlobReader::new(blob, "history")?;
    let count = reader.field_u32(TAG_HISTORY_COUNT)?;

    let mut history = Vec::new();
    for _ in 0..count {
        let value = reader.field(TAG_PASSWORD_VALUE)?.to_vec();
        let metadata = EncryptedMetadata::new(reader.field(TAG_PASSWORD_METADATA)?.to_vec());
        history.push(Password::from_encrypted_parts(value, metadata));
    }
    reader.finish()?;

    if history.is_empty() {
        return Err(VaultError::Codec(
            "history: must hold at least one password".to_string(),
        ));
    }
    Ok(history)
}

pub(crate) fn encode_categories(categories: &[Category]) -> Result<Vec<u8>> {
    let count = u32::try_from(categories.len())
        .map_err(|_| VaultError::Codec("categories exceed frame size".to_string()))?;

    let mut writer = BlobWriter::new();
    writer.field_u32(TAG_CATEGORY_COUNT, count)?;
    for category in categories {
        writer.field_str(TAG_CATEGORY_NAME, category.name())?;
    }
    Ok(writer.finish())
}

pub(crate) fn decode_categories(blob: &[u8]) -> Result<Vec<Category>> {
    let mut reader = BlobReader::new(blob, "categories")?;
    let count = reader.field_u32(TAG_CATEGORY_COUNT)?;

    let mut categories = Vec::new();
    for _ in 0..count {
        let name = reader.field_str(TAG_CATEGORY_NAME)?;
        let category = Category::new(name)
            .map_err(|_| VaultError::Codec("categories: empty name".to_string()))?;
        categories.push(category);
    }
    reader.finish()?;
    Ok(categories)
}

pub(crate) fn encode_note(note: &str) -> Result<Vec<u8>> {
    let mut writer = BlobWriter::new();
    writer.field_str(TAG_NOTE_TEXT, note)?;
    Ok(writer.finish())
}

pub(crate) fn decode_note(blob: &[u8]) -> Result<String> {
    let mut reader = BlobReader::new(blob, "note")?;
    let text = reader.field_str(TAG_NOTE_TEXT)?;
    reader.finish()?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DerivedKey;

    fn test_key(byte: u8) -> DerivedKey {
        DerivedKey::from_bytes([byte; 32])
    }

    fn encrypted_password(value: &[u8], key: &DerivedKey) -> Password {
        let mut password = Password::new(value.to_vec(), "owner-hash");
        password.encrypt(key, "owner-hash").unwrap();
        password
    }

    #[test]
    fn test_user_block_roundtrip() {
        let user = User::new("alice", Password::new(b"master pw".to_vec(), "setup")).unwrap();

        let blob = encode_user(&user).unwrap();
        assert_eq!(blob[0], FORMAT_VERSION);

        let restored = decode_user(user.username_hash(), &blob).unwrap();
        assert_eq!(restored.username_hash(), user.username_hash());
        assert!(restored.verify_passphrase(b"master pw"));
        assert!(!restored.verify_passphrase(b"wrong pw"));
        assert_eq!(restored.vault_salt(), user.vault_salt());
    }

    #[test]
    fn test_user_block_rejects_corruption() {
        let user = User::new("alice", Password::new(b"master pw".to_vec(), "setup")).unwrap();
        let blob = encode_user(&user).unwrap();

        // Unknown version byte
        let mut bad_version = blob.clone();
        bad_version[0] = 99;
        assert!(matches!(
            decode_user("h", &bad_version),
            Err(VaultError::Codec(_))
        ));

        // Truncation
        assert!(matches!(
            decode_user("h", &blob[..blob.len() - 4]),
            Err(VaultError::Codec(_))
        ));

        // Trailing garbage
        let mut trailing = blob.clone();
        trailing.push(0);
        assert!(matches!(
            decode_user("h", &trailing),
            Err(VaultError::Codec(_))
        ));

        // Wrong leading tag
        let mut bad_tag = blob;
        bad_tag[1] = TAG_NOTE_TEXT;
        assert!(matches!(decode_user("h", &bad_tag), Err(VaultError::Codec(_))));
    }

    #[test]
    fn test_history_roundtrip_preserves_order() {
        let key = test_key(1);
        let history = vec![
            encrypted_password(b"first", &key),
            encrypted_password(b"second", &key),
        ];

        let blob = encode_history(&history).unwrap();
        let mut restored = decode_history(&blob).unwrap();

        assert_eq!(restored.len(), 2);
        for password in &mut restored {
            password.decrypt(&key).unwrap();
        }
        assert_eq!(restored[0].plaintext().unwrap(), b"first");
        assert_eq!(restored[1].plaintext().unwrap(), b"second");
    }

    #[test]
    fn test_history_refuses_plaintext_at_rest() {
        let key = test_key(2);
        let history = vec![
            encrypted_password(b"sealed", &key),
            Password::new(b"still plaintext".to_vec(), "owner-hash"),
        ];

        let result = encode_history(&history);
        assert!(matches!(
            result,
            Err(VaultError::InvalidStateTransition {
                operation: "store",
                state: "decrypted",
            })
        ));
    }

    #[test]
    fn test_history_refuses_master_at_rest() {
        let mut master = Password::new(b"pw".to_vec(), "a");
        master.make_master("a").unwrap();

        let result = encode_history(&[master]);
        assert!(matches!(
            result,
            Err(VaultError::InvalidStateTransition {
                operation: "store",
                state: "master",
            })
        ));
    }

    #[test]
    fn test_empty_history_rejected_on_decode() {
        let blob = encode_history(&[]).unwrap();
        assert!(matches!(decode_history(&blob), Err(VaultError::Codec(_))));
    }

    #[test]
    fn test_categories_roundtrip() {
        let categories = vec![
            Category::new("work").unwrap(),
            Category::new("finance").unwrap(),
        ];

        let blob = encode_categories(&categories).unwrap();
        let restored = decode_categories(&blob).unwrap();

        assert_eq!(restored, categories);
        assert_eq!(decode_categories(&encode_categories(&[]).unwrap()).unwrap(), vec![]);
    }

    #[test]
    fn test_note_roundtrip() {
        let blob = encode_note("backup codes in the drawer").unwrap();
        assert_eq!(decode_note(&blob).unwrap(), "backup codes in the drawer");
    }

    #[test]
    fn test_foreign_blob_rejected() {
        assert!(matches!(decode_note(&[]), Err(VaultError::Codec(_))));
        assert!(matches!(
            decode_history(&[FORMAT_VERSION, 0xFF, 1, 0, 0, 0, 7]),
            Err(VaultError::Codec(_))
        ));
    }
}
