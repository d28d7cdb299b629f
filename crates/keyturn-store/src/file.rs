//! File-backed credential store.
//!
//! One record per peer, named after [`PeerIdentity::storage_key`]. Records
//! are JSON with hex-encoded key material. With a sealing key the JSON is
//! encrypted with AES-256-GCM before it touches disk:
//!
//! `nonce[12] || ciphertext || tag[16]`
//!
//! The peer's storage key is bound as associated data, so a sealed record
//! copied to another peer's file name fails to open.
//!
//! Writes go to a temporary file that is synced and renamed over the
//! previous record.

use crate::error::{Error, Result};
use crate::traits::{AuthorizationIdentity, CredentialStore, PeerIdentity, StoredCredentials};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use keyturn_crypto::kex::Curve;
use keyturn_crypto::SharedSecret;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const RECORD_VERSION: u8 = 1;
const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

/// On-disk form of [`StoredCredentials`].
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct CredentialRecord {
    version: u8,
    #[zeroize(skip)]
    curve: Curve,
    local_private_key: String,
    local_public_key: String,
    shared_secret: String,
    peer_public_key: String,
    authorization_id: u32,
    authorization_id_raw: String,
    peer_uuid: Option<String>,
}

impl CredentialRecord {
    fn from_credentials(credentials: &StoredCredentials) -> Self {
        Self {
            version: RECORD_VERSION,
            curve: credentials.curve,
            local_private_key: hex::encode(&*credentials.local_private_key),
            local_public_key: hex::encode(&credentials.local_public_key),
            shared_secret: hex::encode(credentials.shared_secret.as_bytes()),
            peer_public_key: hex::encode(&credentials.peer_public_key),
            authorization_id: credentials.authorization.id,
            authorization_id_raw: hex::encode(&credentials.authorization.raw),
            peer_uuid: credentials.peer_uuid.map(hex::encode),
        }
    }

    fn to_credentials(&self) -> Result<StoredCredentials> {
        if self.version != RECORD_VERSION {
            return Err(Error::InvalidRecord(format!(
                "unsupported record version {}",
                self.version
            )));
        }

        let shared_secret = Zeroizing::new(decode_hex("shared_secret", &self.shared_secret)?);
        let raw_id = decode_hex("authorization_id_raw", &self.authorization_id_raw)?;
        let authorization = AuthorizationIdentity::from_raw(&raw_id)
            .ok_or_else(|| Error::InvalidRecord("authorization_id_raw must be 4 bytes".into()))?;
        if authorization.id != self.authorization_id {
            return Err(Error::InvalidRecord(
                "authorization id disagrees with raw bytes".into(),
            ));
        }

        let peer_uuid = match &self.peer_uuid {
            Some(encoded) => {
                let bytes = decode_hex("peer_uuid", encoded)?;
                Some(
                    bytes
                        .try_into()
                        .map_err(|_| Error::InvalidRecord("peer_uuid must be 16 bytes".into()))?,
                )
            }
            None => None,
        };

        Ok(StoredCredentials {
            curve: self.curve,
            local_private_key: Zeroizing::new(decode_hex(
                "local_private_key",
                &self.local_private_key,
            )?),
            local_public_key: decode_hex("local_public_key", &self.local_public_key)?,
            shared_secret: SharedSecret::from_slice(&shared_secret)?,
            peer_public_key: decode_hex("peer_public_key", &self.peer_public_key)?,
            authorization,
            peer_uuid,
        })
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| Error::InvalidRecord(format!("{}: {}", field, e)))
}

/// Credential store writing one file per peer into a directory.
pub struct FileCredentialStore {
    directory: PathBuf,
    sealing_key: Option<Zeroizing<[u8; 32]>>,
}

impl FileCredentialStore {
    /// Open (creating if needed) a store of plain JSON records in `directory`.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            sealing_key: None,
        })
    }

    /// Open a store whose records are sealed with `key`.
    pub fn open_sealed(directory: impl Into<PathBuf>, key: [u8; 32]) -> Result<Self> {
        let mut store = Self::open(directory)?;
        store.sealing_key = Some(Zeroizing::new(key));
        Ok(store)
    }

    /// Directory holding the records.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the record for `peer`.
    pub fn record_path(&self, peer: &PeerIdentity) -> PathBuf {
        let extension = if self.sealing_key.is_some() {
            "sealed"
        } else {
            "json"
        };
        self.directory
            .join(format!("{}.{}", peer.storage_key(), extension))
    }

    fn seal(&self, peer: &PeerIdentity, plaintext: &[u8]) -> Result<Vec<u8>> {
        let Some(key) = &self.sealing_key else {
            return Ok(plaintext.to_vec());
        };

        let cipher = Aes256Gcm::new_from_slice(&**key)
            .map_err(|e| Error::Sealing(format!("Cipher init failed: {}", e)))?;

        let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
        rand::rngs::OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| Error::Sealing(format!("Random source unavailable: {}", e)))?;

        let aad = peer.storage_key();
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|e| Error::Sealing(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn unseal(&self, peer: &PeerIdentity, stored: Vec<u8>) -> Result<Zeroizing<Vec<u8>>> {
        let Some(key) = &self.sealing_key else {
            return Ok(Zeroizing::new(stored));
        };

        if stored.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
            return Err(Error::Sealing(
                "Record too short (need nonce[12] + tag[16])".into(),
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&**key)
            .map_err(|e| Error::Sealing(format!("Cipher init failed: {}", e)))?;
        let (nonce, ciphertext) = stored.split_at(GCM_NONCE_LEN);
        let aad = peer.storage_key();

        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: aad.as_bytes(),
                },
            )
            .map(Zeroizing::new)
            .map_err(|e| Error::Sealing(format!("Decryption failed: {}", e)))
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            restrict_permissions(&file)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> Result<()> {
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, peer: &PeerIdentity) -> Result<Option<StoredCredentials>> {
        let path = self.record_path(peer);
        let stored = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let json = self.unseal(peer, stored)?;
        let record: CredentialRecord = serde_json::from_slice(&json)?;
        let credentials = record.to_credentials()?;
        credentials.validate()?;

        tracing::debug!(
            remote = %peer.remote_address,
            authorization_id = credentials.authorization.id,
            "Loaded pairing credentials"
        );
        Ok(Some(credentials))
    }

    fn save(&self, peer: &PeerIdentity, credentials: &StoredCredentials) -> Result<()> {
        credentials.validate()?;

        let record = CredentialRecord::from_credentials(credentials);
        let json = Zeroizing::new(serde_json::to_vec_pretty(&record)?);
        let bytes = self.seal(peer, &json)?;
        self.write_atomically(&self.record_path(peer), &bytes)?;

        tracing::info!(
            remote = %peer.remote_address,
            authorization_id = credentials.authorization.id,
            sealed = self.sealing_key.is_some(),
            "Saved pairing credentials"
        );
        Ok(())
    }

    fn clear(&self, peer: &PeerIdentity) -> Result<()> {
        let path = self.record_path(peer);
        for candidate in [path.clone(), path.with_extension("tmp")] {
            match fs::remove_file(&candidate) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(remote = %peer.remote_address, "Cleared pairing credentials");
        Ok(())
    }
}
