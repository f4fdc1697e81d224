//! JSON interchange documents for credential records.
//!
//! Import is strict: the whole document is validated before a single
//! record is handed back, so a malformed later record rejects the batch
//! and nothing is partially applied.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::model::{CredentialRecord, MAX_CATEGORIES};
use crate::{Result, VaultError};

const RECORD_KEYS: &[&str] = &[
    "description",
    "password",
    "username",
    "categories",
    "note",
    "created_at",
    "last_modified",
];
const PASSWORD_KEYS: &[&str] = &["current_password", "old_passwords"];

/// Everything wrong with one record of an import document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFormatError {
    /// Zero-based index of the offending record.
    pub record: usize,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub malformed: Vec<String>,
}

impl ImportFormatError {
    fn new(record: usize) -> Self {
        Self {
            record,
            missing: Vec::new(),
            unexpected: Vec::new(),
            malformed: Vec::new(),
        }
    }

    fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.malformed.is_empty()
    }
}

impl std::fmt::Display for ImportFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record {} rejected", self.record)?;
        if !self.missing.is_empty() {
            write!(f, "; missing required keys: {}", self.missing.join(", "))?;
        }
        if !self.unexpected.is_empty() {
            write!(f, "; unrecognized keys: {}", self.unexpected.join(", "))?;
        }
        if !self.malformed.is_empty() {
            write!(f, "; malformed values: {}", self.malformed.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ImportFormatError {}

/// One credential parsed out of an interchange document, validated and
/// ready to be added to a vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedRecord {
    pub description: String,
    pub username: Option<String>,
    pub current_password: String,
    pub old_passwords: Vec<String>,
    pub categories: Vec<String>,
    pub note: Option<String>,
    pub created_at: Option<i64>,
    pub last_modified: Option<i64>,
}

impl ImportedRecord {
    /// Passwords oldest first, the final entry being current.
    pub fn password_chain(&self) -> Vec<&str> {
        self.old_passwords
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.current_password.as_str()))
            .collect()
    }
}

/// Parse and validate an interchange document.
///
/// Returns every record or nothing: the first record with a missing
/// required key, a key outside the recognized set, or a malformed value
/// fails the whole document.
pub fn parse_document(document: &str) -> Result<Vec<ImportedRecord>> {
    let root: Value = serde_json::from_str(document).map_err(|e| {
        VaultError::InvalidInput(format!("import document is not valid JSON: {e}"))
    })?;
    let Value::Array(entries) = root else {
        return Err(VaultError::InvalidInput(
            "import document must be a JSON array of records".to_string(),
        ));
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_record(index, entry).map_err(VaultError::from))
        .collect()
}

fn parse_record(
    index: usize,
    entry: &Value,
) -> std::result::Result<ImportedRecord, ImportFormatError> {
    let mut error = ImportFormatError::new(index);

    let Value::Object(fields) = entry else {
        error.malformed.push("record must be a JSON object".to_string());
        return Err(error);
    };

    for key in fields.keys() {
        if !RECORD_KEYS.contains(&key.as_str()) {
            error.unexpected.push(key.clone());
        }
    }

    let description = match fields.get("description") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(_) => {
            error
                .malformed
                .push("description must be a non-empty string".to_string());
            None
        }
        None => {
            error.missing.push("description".to_string());
            None
        }
    };

    let mut current_password = None;
    let mut old_passwords = Vec::new();
    match fields.get("password") {
        Some(Value::Object(password)) => {
            for key in password.keys() {
                if !PASSWORD_KEYS.contains(&key.as_str()) {
                    error.unexpected.push(format!("password.{key}"));
                }
            }
            match password.get("current_password") {
                Some(Value::String(s)) => current_password = Some(s.clone()),
                Some(_) => error
                    .malformed
                    .push("password.current_password must be a string".to_string()),
                None => error.missing.push("password.current_password".to_string()),
            }
            match password.get("old_passwords") {
                Some(Value::Array(values)) => {
                    for value in values {
                        match value {
                            Value::String(s) => old_passwords.push(s.clone()),
                            _ => {
                                error.malformed.push(
                                    "password.old_passwords entries must be strings".to_string(),
                                );
                                break;
                            }
                        }
                    }
                }
                Some(_) => error
                    .malformed
                    .push("password.old_passwords must be an array of strings".to_string()),
                None => {}
            }
        }
        Some(_) => error.malformed.push("password must be an object".to_string()),
        None => error.missing.push("password.current_password".to_string()),
    }

    let username = match fields.get("username") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            error.malformed.push("username must be a string".to_string());
            None
        }
        None => None,
    };

    let mut categories: Vec<String> = Vec::new();
    match fields.get("categories") {
        Some(Value::Array(values)) => {
            if values.len() > MAX_CATEGORIES {
                error
                    .malformed
                    .push(format!("categories exceeds the {MAX_CATEGORIES} tag limit"));
            } else {
                for value in values {
                    match value {
                        Value::String(s) if !s.trim().is_empty() => {
                            if categories.contains(s) {
                                error.malformed.push(format!("categories repeats {s:?}"));
                            } else {
                                categories.push(s.clone());
                            }
                        }
                        _ => error
                            .malformed
                            .push("categories entries must be non-empty strings".to_string()),
                    }
                }
            }
        }
        Some(_) => error
            .malformed
            .push("categories must be an array of strings".to_string()),
        None => {}
    }

    let note = match fields.get("note") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            error.malformed.push("note must be a string".to_string());
            None
        }
        None => None,
    };

    let created_at = parse_timestamp(fields.get("created_at"), "created_at", &mut error);
    let last_modified = parse_timestamp(fields.get("last_modified"), "last_modified", &mut error);

    match (description, current_password) {
        (Some(description), Some(current_password)) if error.is_clean() => Ok(ImportedRecord {
            description,
            username,
            current_password,
            old_passwords,
            categories,
            note,
            created_at,
            last_modified,
        }),
        _ => Err(error),
    }
}

fn parse_timestamp(value: Option<&Value>, key: &str, error: &mut ImportFormatError) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(secs) => Some(secs),
            None => {
                error
                    .malformed
                    .push(format!("{key} must be an integral timestamp"));
                None
            }
        },
        Some(_) => {
            error
                .malformed
                .push(format!("{key} must be a numeric timestamp"));
            None
        }
        None => None,
    }
}

/// Password block of one exported record.
#[derive(Debug, Serialize)]
pub struct ExportPassword {
    pub current_password: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub old_passwords: Vec<String>,
}

/// One credential in the interchange document shape.
#[derive(Debug, Serialize)]
pub struct ExportRecord {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password: ExportPassword,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
}

impl ExportRecord {
    /// Capture a decrypted credential record.
    ///
    /// Secret bytes must be valid UTF-8, the document format being textual.
    pub fn from_record(record: &CredentialRecord) -> Result<Self> {
        let mut history = Vec::with_capacity(record.history().len());
        for password in record.history() {
            let text = String::from_utf8(password.plaintext()?.to_vec()).map_err(|_| {
                VaultError::InvalidInput(
                    "password bytes are not valid UTF-8 and cannot be exported as text"
                        .to_string(),
                )
            })?;
            history.push(text);
        }
        let current_password = history.pop().ok_or_else(|| {
            VaultError::InvalidInput("credential has no password history".to_string())
        })?;
        let metadata = record.metadata();

        Ok(Self {
            description: record.description().to_string(),
            username: record.username().map(str::to_string),
            password: ExportPassword {
                current_password,
                old_passwords: history,
            },
            categories: record
                .categories()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            note: record.note().map(str::to_string),
            created_at: metadata.map(|m| m.created_at().timestamp()),
            last_modified: metadata.map(|m| m.modified_at().timestamp()),
        })
    }
}

/// Render records as a pretty-printed interchange document.
pub fn export_document(records: &[ExportRecord]) -> Result<String> {
    serde_json::to_string_pretty(records)
        .map_err(|e| VaultError::InvalidInput(format!("export serialization failed: {e}")))
}

/// Timestamped export file name, unique to the second.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("vault-export-{}.json", now.format("%Y%m%dT%H%M%SZ"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DerivedKey;
    use crate::model::{Category, Password};
    use chrono::TimeZone;

    #[test]
    fn test_parse_minimal_record() {
        let doc = r#"[
            {"description": "example.com", "password": {"current_password": "hunter2"}}
        ]"#;

        let records = parse_document(doc).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "example.com");
        assert_eq!(records[0].current_password, "hunter2");
        assert_eq!(records[0].username, None);
        assert!(records[0].old_passwords.is_empty());
        assert!(records[0].categories.is_empty());
        assert_eq!(records[0].note, None);
        assert_eq!(records[0].password_chain(), vec!["hunter2"]);
    }

    #[test]
    fn test_parse_full_record() {
        let doc = r#"[
            {
                "description": "example.com",
                "username": "alice@example.com",
                "password": {
                    "current_password": "new-secret",
                    "old_passwords": ["first-secret", "second-secret"]
                },
                "categories": ["work", "email"],
                "note": "rotated after the march incident",
                "created_at": 1700000000,
                "last_modified": 1710000000
            }
        ]"#;

        let records = parse_document(doc).unwrap();
        let record = &records[0];
        assert_eq!(record.username.as_deref(), Some("alice@example.com"));
        assert_eq!(record.old_passwords, vec!["first-secret", "second-secret"]);
        assert_eq!(
            record.password_chain(),
            vec!["first-secret", "second-secret", "new-secret"]
        );
        assert_eq!(record.categories, vec!["work", "email"]);
        assert_eq!(record.note.as_deref(), Some("rotated after the march incident"));
        assert_eq!(record.created_at, Some(1_700_000_000));
        assert_eq!(record.last_modified, Some(1_710_000_000));
    }

    #[test]
    fn test_missing_current_password_rejects_whole_document() {
        let doc = r#"[
            {"description": "ok.example", "password": {"current_password": "fine"}},
            {"description": "broken.example", "password": {}}
        ]"#;

        let err = parse_document(doc).unwrap_err();
        let VaultError::ImportFormat(detail) = err else {
            panic!("expected ImportFormat, got {err:?}");
        };
        assert_eq!(detail.record, 1);
        assert_eq!(detail.missing, vec!["password.current_password"]);
    }

    #[test]
    fn test_missing_password_object_reported_as_missing_key() {
        let doc = r#"[{"description": "example.com"}]"#;

        let err = parse_document(doc).unwrap_err();
        let VaultError::ImportFormat(detail) = err else {
            panic!("expected ImportFormat, got {err:?}");
        };
        assert_eq!(detail.record, 0);
        assert_eq!(detail.missing, vec!["password.current_password"]);
    }

    #[test]
    fn test_unrecognized_keys_rejected_with_paths() {
        let doc = r#"[
            {
                "description": "example.com",
                "password": {"current_password": "x", "hint": "pet name"},
                "favorite": true
            }
        ]"#;

        let err = parse_document(doc).unwrap_err();
        let VaultError::ImportFormat(detail) = err else {
            panic!("expected ImportFormat, got {err:?}");
        };
        assert!(detail.unexpected.contains(&"favorite".to_string()));
        assert!(detail.unexpected.contains(&"password.hint".to_string()));
    }

    #[test]
    fn test_non_array_document_rejected() {
        let err = parse_document(r#"{"description": "example.com"}"#).unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));

        let err = parse_document("not json at all").unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
    }

    #[test]
    fn test_non_object_record_rejected() {
        let err = parse_document(r#"["just a string"]"#).unwrap_err();
        let VaultError::ImportFormat(detail) = err else {
            panic!("expected ImportFormat, got {err:?}");
        };
        assert_eq!(detail.record, 0);
        assert!(!detail.malformed.is_empty());
    }

    #[test]
    fn test_category_limit_and_duplicates_rejected() {
        let over_limit = r#"[
            {
                "description": "example.com",
                "password": {"current_password": "x"},
                "categories": ["a", "b", "c", "d", "e", "f"]
            }
        ]"#;
        assert!(matches!(
            parse_document(over_limit),
            Err(VaultError::ImportFormat(_))
        ));

        let duplicated = r#"[
            {
                "description": "example.com",
                "password": {"current_password": "x"},
                "categories": ["work", "work"]
            }
        ]"#;
        assert!(matches!(
            parse_document(duplicated),
            Err(VaultError::ImportFormat(_))
        ));
    }

    #[test]
    fn test_non_numeric_timestamp_rejected() {
        let doc = r#"[
            {
                "description": "example.com",
                "password": {"current_password": "x"},
                "created_at": "2024-01-01"
            }
        ]"#;

        let err = parse_document(doc).unwrap_err();
        let VaultError::ImportFormat(detail) = err else {
            panic!("expected ImportFormat, got {err:?}");
        };
        assert!(detail.malformed.iter().any(|m| m.contains("created_at")));
    }

    #[test]
    fn test_empty_document_imports_nothing() {
        assert!(parse_document("[]").unwrap().is_empty());
    }

    #[test]
    fn test_export_omits_absent_fields() {
        let record = ExportRecord {
            description: "example.com".to_string(),
            username: None,
            password: ExportPassword {
                current_password: "hunter2".to_string(),
                old_passwords: Vec::new(),
            },
            categories: Vec::new(),
            note: None,
            created_at: None,
            last_modified: None,
        };

        let doc = export_document(&[record]).unwrap();
        let parsed: Value = serde_json::from_str(&doc).unwrap();
        let entry = &parsed[0];
        assert_eq!(entry["description"], "example.com");
        assert_eq!(entry["password"]["current_password"], "hunter2");
        assert!(entry.get("username").is_none());
        assert!(entry.get("categories").is_none());
        assert!(entry["password"].get("old_passwords").is_none());
    }

    #[test]
    fn test_export_document_reimports_cleanly() {
        let record = ExportRecord {
            description: "example.com".to_string(),
            username: Some("alice".to_string()),
            password: ExportPassword {
                current_password: "current".to_string(),
                old_passwords: vec!["older".to_string()],
            },
            categories: vec!["work".to_string()],
            note: Some("a note".to_string()),
            created_at: Some(1_700_000_000),
            last_modified: Some(1_710_000_000),
        };

        let doc = export_document(&[record]).unwrap();
        let imported = parse_document(&doc).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].description, "example.com");
        assert_eq!(imported[0].password_chain(), vec!["older", "current"]);
        assert_eq!(imported[0].categories, vec!["work"]);
    }

    #[test]
    fn test_export_record_from_decrypted_credential() {
        let mut record = CredentialRecord::new(
            "owner-hash",
            "example.com",
            Some("alice".to_string()),
            Password::new(b"first".to_vec(), "owner-hash"),
        )
        .unwrap();
        record.add_password(Password::new(b"second".to_vec(), "owner-hash")).unwrap();
        record.add_category(Category::new("work").unwrap()).unwrap();

        let export = ExportRecord::from_record(&record).unwrap();
        assert_eq!(export.description, "example.com");
        assert_eq!(export.password.current_password, "second");
        assert_eq!(export.password.old_passwords, vec!["first"]);
        assert_eq!(export.categories, vec!["work"]);
        assert!(export.created_at.is_some());
    }

    #[test]
    fn test_export_refuses_sealed_credential() {
        let key = DerivedKey::from_bytes([7; 32]);
        let mut record = CredentialRecord::new(
            "owner-hash",
            "example.com",
            None,
            Password::new(b"secret".to_vec(), "owner-hash"),
        )
        .unwrap();
        record.encrypt(&key).unwrap();

        assert!(matches!(
            ExportRecord::from_record(&record),
            Err(VaultError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_export_file_name_is_timestamped() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        assert_eq!(export_file_name(at), "vault-export-20240309T143005Z.json");
    }
}
