//! Process-lifetime secret cache.
//!
//! One instance is constructed at the composition root and passed by
//! reference into the protocol server — never reached through globals.  The
//! cache avoids re-prompting for the passphrase *value* within one run; it
//! never stands in for an authentication check, which the server performs on
//! every request regardless of a cache hit.

use std::collections::HashMap;

use crate::Secret;

#[derive(Default)]
pub struct SessionCache {
    entries: HashMap<String, Secret>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key_id: &str) -> Option<&Secret> {
        self.entries.get(key_id)
    }

    /// Insert or overwrite the secret for `key_id`.
    pub fn insert(&mut self, key_id: impl Into<String>, secret: Secret) {
        self.entries.insert(key_id.into(), secret);
    }

    /// Drop every cached secret.  Has no effect on persistent storage.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
