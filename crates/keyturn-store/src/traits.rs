//! Credential store contract and the records it persists.

use crate::error::{Error, Result};
use keyturn_crypto::kex::{Curve, EphemeralKeyPair};
use keyturn_crypto::SharedSecret;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Identifies one controller/lock pairing: the local adapter and the remote
/// device address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Local adapter address (e.g. `"00:1A:7D:DA:71:13"`).
    pub local_address: String,
    /// Remote lock address.
    pub remote_address: String,
}

impl PeerIdentity {
    /// Create a peer identity.
    pub fn new(local_address: impl Into<String>, remote_address: impl Into<String>) -> Self {
        Self {
            local_address: local_address.into(),
            remote_address: remote_address.into(),
        }
    }

    /// Filesystem-safe key derived from both addresses.
    ///
    /// ```
    /// use keyturn_store::PeerIdentity;
    ///
    /// let peer = PeerIdentity::new("00:1A:7D:DA:71:13", "54:D2:72:AB:CD:EF");
    /// assert_eq!(peer.storage_key(), "001a7dda7113_54d272abcdef");
    /// ```
    pub fn storage_key(&self) -> String {
        fn clean(address: &str) -> String {
            address
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect()
        }
        format!(
            "{}_{}",
            clean(&self.local_address),
            clean(&self.remote_address)
        )
    }
}

/// Authorization identity assigned by the lock.
///
/// `raw` is the on-wire little-endian encoding of `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationIdentity {
    /// Numeric authorization id.
    pub id: u32,
    /// Raw wire bytes.
    pub raw: Vec<u8>,
}

impl AuthorizationIdentity {
    /// Build from a numeric id.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            raw: id.to_le_bytes().to_vec(),
        }
    }

    /// Decode from 4 little-endian wire bytes.
    pub fn from_raw(raw: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = raw.try_into().ok()?;
        Some(Self {
            id: u32::from_le_bytes(bytes),
            raw: raw.to_vec(),
        })
    }
}

/// Long-term material of a completed pairing.
#[derive(Clone)]
pub struct StoredCredentials {
    /// Curve of the local key pair.
    pub curve: Curve,
    /// Local private key bytes.
    pub local_private_key: Zeroizing<Vec<u8>>,
    /// Local public key bytes.
    pub local_public_key: Vec<u8>,
    /// Derived shared secret.
    pub shared_secret: SharedSecret,
    /// Lock public key bytes.
    pub peer_public_key: Vec<u8>,
    /// Identity assigned by the lock.
    pub authorization: AuthorizationIdentity,
    /// Lock UUID reported alongside the authorization id.
    pub peer_uuid: Option<[u8; 16]>,
}

impl StoredCredentials {
    /// Check that the record is complete and self-consistent.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRecord` for wrong key lengths, a private key that
    /// does not match the public key, or raw id bytes that disagree with `id`.
    pub fn validate(&self) -> Result<()> {
        let key_len = self.curve.public_key_len();
        if self.local_public_key.len() != key_len || self.peer_public_key.len() != key_len {
            return Err(Error::InvalidRecord(format!(
                "{:?} public keys must be {} bytes",
                self.curve, key_len
            )));
        }

        let restored = EphemeralKeyPair::from_private(self.curve, &self.local_private_key)
            .map_err(|e| Error::InvalidRecord(format!("local private key: {}", e)))?;
        if restored.public_key() != self.local_public_key.as_slice() {
            return Err(Error::InvalidRecord(
                "local private key does not match public key".into(),
            ));
        }

        if self.authorization.raw != self.authorization.id.to_le_bytes() {
            return Err(Error::InvalidRecord(
                "authorization id raw bytes disagree with id".into(),
            ));
        }

        Ok(())
    }
}

impl core::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("curve", &self.curve)
            .field("local_private_key", &"<redacted>")
            .field("local_public_key", &self.local_public_key.len())
            .field("shared_secret", &self.shared_secret)
            .field("peer_public_key", &self.peer_public_key.len())
            .field("authorization", &self.authorization)
            .field("peer_uuid", &self.peer_uuid)
            .finish()
    }
}

/// Persists pairing credentials per peer.
///
/// Implementations must make `save` durable before returning, so a restarted
/// process sees the pairing, and must never replace a valid record with one
/// that fails [`StoredCredentials::validate`].
pub trait CredentialStore: Send + Sync {
    /// Load the credentials stored for `peer`, if any.
    fn load(&self, peer: &PeerIdentity) -> Result<Option<StoredCredentials>>;

    /// Store `credentials` for `peer`, replacing any previous record.
    fn save(&self, peer: &PeerIdentity, credentials: &StoredCredentials) -> Result<()>;

    /// Remove every record for `peer`. Clearing an absent record is not an error.
    fn clear(&self, peer: &PeerIdentity) -> Result<()>;
}

impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    fn load(&self, peer: &PeerIdentity) -> Result<Option<StoredCredentials>> {
        (**self).load(peer)
    }

    fn save(&self, peer: &PeerIdentity, credentials: &StoredCredentials) -> Result<()> {
        (**self).save(peer, credentials)
    }

    fn clear(&self, peer: &PeerIdentity) -> Result<()> {
        (**self).clear(peer)
    }
}
