//! Audit metadata attached to passwords and credential records.

use crate::store::codec::{
    BlobReader, BlobWriter, TAG_META_ACCESSED_AT, TAG_META_ACCESSED_BY, TAG_META_CREATED_AT,
    TAG_META_CREATED_BY, TAG_META_MODIFIED_AT, TAG_META_MODIFIED_BY,
};
use crate::Result;
use chrono::{DateTime, Utc};

/// Creation, modification, and last-access times, with the acting
/// identity recorded for each event.
///
/// Timestamps are kept at second precision, matching what the storage
/// layer persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    created_at: DateTime<Utc>,
    created_by: String,
    modified_at: DateTime<Utc>,
    modified_by: String,
    accessed_at: DateTime<Utc>,
    accessed_by: String,
}

fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

impl Metadata {
    /// Fresh metadata with all three events stamped to now by `actor`.
    pub fn new(actor: &str) -> Self {
        let now = now_secs();
        Self {
            created_at: now,
            created_by: actor.to_string(),
            modified_at: now,
            modified_by: actor.to_string(),
            accessed_at: now,
            accessed_by: actor.to_string(),
        }
    }

    /// Record a read access by `actor`.
    pub fn accessed(&mut self, actor: &str) {
        self.accessed_at = now_secs();
        self.accessed_by = actor.to_string();
    }

    /// Record a modification by `actor`. A modification is also an access,
    /// stamped at the same instant.
    pub fn modified(&mut self, actor: &str) {
        let now = now_secs();
        self.modified_at = now;
        self.modified_by = actor.to_string();
        self.accessed_at = now;
        self.accessed_by = actor.to_string();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn modified_by(&self) -> &str {
        &self.modified_by
    }

    pub fn accessed_at(&self) -> DateTime<Utc> {
        self.accessed_at
    }

    pub fn accessed_by(&self) -> &str {
        &self.accessed_by
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BlobWriter::new();
        writer.field_i64(TAG_META_CREATED_AT, self.created_at.timestamp())?;
        writer.field_str(TAG_META_CREATED_BY, &self.created_by)?;
        writer.field_i64(TAG_META_MODIFIED_AT, self.modified_at.timestamp())?;
        writer.field_str(TAG_META_MODIFIED_BY, &self.modified_by)?;
        writer.field_i64(TAG_META_ACCESSED_AT, self.accessed_at.timestamp())?;
        writer.field_str(TAG_META_ACCESSED_BY, &self.accessed_by)?;
        Ok(writer.finish())
    }

    pub(crate) fn from_bytes(blob: &[u8]) -> Result<Self> {
        let mut reader = BlobReader::new(blob, "metadata")?;
        let created_at = reader.field_timestamp(TAG_META_CREATED_AT)?;
        let created_by = reader.field_str(TAG_META_CREATED_BY)?;
        let modified_at = reader.field_timestamp(TAG_META_MODIFIED_AT)?;
        let modified_by = reader.field_str(TAG_META_MODIFIED_BY)?;
        let accessed_at = reader.field_timestamp(TAG_META_ACCESSED_AT)?;
        let accessed_by = reader.field_str(TAG_META_ACCESSED_BY)?;
        reader.finish()?;

        Ok(Self {
            created_at,
            created_by,
            modified_at,
            modified_by,
            accessed_at,
            accessed_by,
        })
    }
}

/// Ciphertext of a serialized [`Metadata`], opaque until decrypted.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedMetadata(Vec<u8>);

impl EncryptedMetadata {
    pub(crate) fn new(blob: Vec<u8>) -> Self {
        Self(blob)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptedMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedMetadata({} bytes)", self.0.len())
    }
}
