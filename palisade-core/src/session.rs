//! Authenticated session state.

use crate::crypto::DerivedKey;
use crate::model::User;

/// Proof of a completed login: the authenticated user plus the vault key
/// derived from their passphrase.
///
/// Created at registration or login, dropped at logout; the key inside
/// zeroizes itself when the session goes away.
pub struct Session {
    user: User,
    vault_key: DerivedKey,
}

impl Session {
    pub(crate) fn new(user: User, vault_key: DerivedKey) -> Self {
        Self { user, vault_key }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn username_hash(&self) -> &str {
        self.user.username_hash()
    }

    pub(crate) fn vault_key(&self) -> &DerivedKey {
        &self.vault_key
    }

    /// Swap in a rebuilt identity after a username or passphrase change.
    pub(crate) fn replace_user(&mut self, user: User, vault_key: DerivedKey) {
        self.user = user;
        self.vault_key = vault_key;
    }
}
