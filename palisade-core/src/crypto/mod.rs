//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - Argon2id key derivation and passphrase verification
//! - HKDF-SHA256 per-record subkey derivation
//! - AES-256-GCM encryption/decryption of entity blobs
//! - Password generation and strength analysis

pub mod cipher;
pub mod generate;
pub mod kdf;
pub mod strength;

pub use cipher::{decrypt, encrypt};
pub use kdf::{
    derive, derive_record_key, generate_salt, verify, DerivedKey, Salt, KEY_SIZE, SALT_SIZE,
};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("{0}")]
    Primitive(String),

    #[error("decryption failed - wrong key or tampered data")]
    WrongKey,
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
