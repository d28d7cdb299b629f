//! In-memory credential store.
//!
//! Clones share the same records, so a test can hand one clone to a session
//! and inspect the other.

use crate::error::{Error, Result};
use crate::traits::{CredentialStore, PeerIdentity, StoredCredentials};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Credential store backed by a shared map.
///
/// # Example
///
/// ```
/// use keyturn_store::{CredentialStore, MemoryCredentialStore, PeerIdentity};
///
/// let store = MemoryCredentialStore::new();
/// let peer = PeerIdentity::new("00:11:22:33:44:55", "66:77:88:99:AA:BB");
/// assert!(store.load(&peer).unwrap().is_none());
/// ```
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    records: Arc<RwLock<HashMap<PeerIdentity, StoredCredentials>>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pairings.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether no pairing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a record exists for `peer`.
    pub fn contains(&self, peer: &PeerIdentity) -> bool {
        self.records
            .read()
            .map(|r| r.contains_key(peer))
            .unwrap_or(false)
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Unavailable("credential map lock poisoned".into())
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, peer: &PeerIdentity) -> Result<Option<StoredCredentials>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(peer).cloned())
    }

    fn save(&self, peer: &PeerIdentity, credentials: &StoredCredentials) -> Result<()> {
        credentials.validate()?;
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert(peer.clone(), credentials.clone());
        tracing::info!(
            remote = %peer.remote_address,
            authorization_id = credentials.authorization.id,
            "Saved pairing credentials"
        );
        Ok(())
    }

    fn clear(&self, peer: &PeerIdentity) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.remove(peer).is_some() {
            tracing::info!(remote = %peer.remote_address, "Cleared pairing credentials");
        }
        Ok(())
    }
}
