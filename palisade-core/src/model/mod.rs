//! Entity model for the vault.
//!
//! A [`User`] owns [`CredentialRecord`]s; each record carries an
//! append-only history of [`Password`]s plus audit [`Metadata`]. Passwords
//! and metadata move through an explicit encryption lifecycle, and the
//! types here make the illegal combinations unrepresentable.

pub mod metadata;
pub mod password;
pub mod record;
pub mod user;

pub use metadata::{EncryptedMetadata, Metadata};
pub use password::Password;
pub use record::{Category, CredentialRecord, MAX_CATEGORIES};
pub use user::User;
