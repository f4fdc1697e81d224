//! SQLite persistence for vault entities.
//!
//! Entities land in the database as opaque versioned blobs; only the
//! searchable plaintext columns (description, username) and the owner
//! hash are visible to SQL. The mapper refuses to persist anything that
//! is still decrypted.

pub mod codec;
pub mod mapper;
pub mod schema;

pub use schema::Store;
