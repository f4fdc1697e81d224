//! Database schema and connection management.

use crate::store::codec::FORMAT_VERSION;
use crate::{Result, VaultError};
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;

/// Vault database connection and schema manager.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open a vault database at `path`, creating the schema on first use
    /// and refusing databases written by a newer format.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory vault database
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let store = Self { conn };
        store.initialize_schema()?;
        store.validate_format_version()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.create_vault_meta_table()?;
        self.create_users_table()?;
        self.create_credentials_table()?;
        self.create_indexes()?;
        Ok(())
    }

    fn create_vault_meta_table(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS vault_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                format_version INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn create_users_table(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                username_hash TEXT PRIMARY KEY,
                master_password BLOB NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    // username is TEXT NOT NULL DEFAULT '' rather than nullable: SQLite
    // treats NULLs as distinct in UNIQUE indexes, which would let
    // username-less duplicates through.
    fn create_credentials_table(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_username_hash TEXT NOT NULL,
                description TEXT NOT NULL,
                username TEXT NOT NULL DEFAULT '',
                password_history BLOB NOT NULL,
                categories BLOB,
                note BLOB,
                metadata BLOB NOT NULL,
                salt BLOB NOT NULL,
                FOREIGN KEY (owner_username_hash) REFERENCES users(username_hash)
                    ON DELETE CASCADE ON UPDATE CASCADE,
                UNIQUE (owner_username_hash, description, username)
            )",
            [],
        )?;
        Ok(())
    }

    fn create_indexes(&self) -> Result<()> {
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_credentials_owner
             ON credentials(owner_username_hash)",
            [],
        )?;
        Ok(())
    }

    /// Check the vault-level format row, stamping it on first open.
    fn validate_format_version(&self) -> Result<()> {
        let expected = i32::from(FORMAT_VERSION);
        let found = match self.conn.query_row(
            "SELECT format_version FROM vault_meta WHERE id = 1",
            [],
            |row| row.get::<_, i32>(0),
        ) {
            Ok(version) => Some(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(err) => return Err(err.into()),
        };

        match found {
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(VaultError::FormatVersion { expected, found }),
            None => {
                self.conn.execute(
                    "INSERT INTO vault_meta (id, format_version, created_at) VALUES (1, ?1, ?2)",
                    (expected, Utc::now().timestamp()),
                )?;
                Ok(())
            }
        }
    }

    /// Reference to the underlying connection
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable connection access for transactional writes
    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
