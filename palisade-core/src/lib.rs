//! Palisade Core Library
//!
//! This library provides the core engine for the Palisade credential vault:
//! cryptographic operations, the credential data model, SQLite persistence,
//! breach checking, and JSON import/export.

pub mod breach;
pub mod crypto;
pub mod import_export;
pub mod model;
pub mod platform;
pub mod session;
pub mod store;
pub mod vault;

pub use breach::{AbortFlag, BatchStatus, HibpClient, RangeLookup, RecordCheck};
pub use crypto::{CryptoError, DerivedKey, Salt};
pub use crypto::generate::{generate_secure_password, GeneratorConfig};
pub use crypto::strength::{analyze_password, StrengthRating, StrengthReport};
pub use import_export::{ImportFormatError, ImportedRecord};
pub use model::{Category, CredentialRecord, Metadata, Password, User};
pub use platform::{ensure_data_dir, get_data_dir, get_default_vault_path};
pub use session::Session;
pub use vault::{validate_password_safety, SafetyReport, Vault};

use thiserror::Error;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// General error type for vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("invalid state transition: cannot {operation} in {state} state")]
    InvalidStateTransition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("crypto primitive failure: {0}")]
    CryptoFailure(String),

    #[error("decryption failed: wrong key")]
    WrongKey,

    #[error("user is already registered")]
    DuplicateUser,

    #[error("duplicate credential: description {description:?}, username {username:?}")]
    DuplicateCredential {
        description: String,
        username: Option<String>,
    },

    #[error("invalid import document: {0}")]
    ImportFormat(#[from] ImportFormatError),

    #[error("breach check unavailable: {0}")]
    BreachCheckUnavailable(String),

    #[error("malformed stored blob: {0}")]
    Codec(String),

    #[error("vault format version mismatch: expected {expected}, found {found}")]
    FormatVersion { expected: i32, found: i32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Primitive(msg) => VaultError::CryptoFailure(msg),
            CryptoError::WrongKey => VaultError::WrongKey,
        }
    }
}
