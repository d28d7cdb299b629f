//! Typed payloads of the handshake messages.
//!
//! Each struct encodes to the exact fixed-length payload the
//! [`MessageLayout`](crate::frame::MessageLayout) declares. The three
//! authorization payloads may be sealed with the shared secret; the command
//! id is bound as associated data so a sealed payload cannot be replayed
//! under another command.

use crate::command::Command;
use crate::config::{IdType, CLIENT_NAME_LEN};
use crate::frame::{
    check_len, read_u16_le, read_u32_le, AUTHORIZATION_DATA_LEN, AUTHORIZATION_ID_LEN,
    CONFIRMATION_LEN, ERROR_REPORT_LEN, PEER_AUTHENTICATOR_LEN,
};
use crate::{Error, Result};
use keyturn_crypto::mac::AUTHENTICATOR_LEN;
use keyturn_crypto::random::NONCE_LEN;
use keyturn_crypto::{aead, SecureRng, SharedSecret};
use zeroize::Zeroizing;

type Tag = [u8; AUTHENTICATOR_LEN];
type Nonce = [u8; NONCE_LEN];

fn array<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[..N]);
    out
}

/// Lock authenticator: tag plus the lock's second nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAuthenticator {
    /// Authenticator over lock key, controller key and `nonce`.
    pub tag: Tag,
    /// Lock nonce.
    pub nonce: Nonce,
}

impl PeerAuthenticator {
    /// Serialize.
    pub fn encode(&self) -> Vec<u8> {
        [&self.tag[..], &self.nonce[..]].concat()
    }

    /// Parse.
    pub fn decode(data: &[u8]) -> Result<Self> {
        check_len(data, PEER_AUTHENTICATOR_LEN)?;
        Ok(Self {
            tag: array(data),
            nonce: array(&data[AUTHENTICATOR_LEN..]),
        })
    }
}

/// Controller identity sent after mutual authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationData {
    /// Authenticator over the fields and both nonces.
    pub tag: Tag,
    /// Client kind.
    pub id_type: IdType,
    /// Host application id.
    pub app_id: u32,
    /// Zero-padded name.
    pub name: [u8; CLIENT_NAME_LEN],
    /// Controller nonce.
    pub nonce: Nonce,
}

impl AuthorizationData {
    /// Serialize.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(AUTHORIZATION_DATA_LEN);
        out.extend_from_slice(&self.tag);
        out.push(self.id_type.to_u8());
        out.extend_from_slice(&self.app_id.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.nonce);
        out
    }

    /// Parse.
    pub fn decode(data: &[u8]) -> Result<Self> {
        check_len(data, AUTHORIZATION_DATA_LEN)?;
        let mut offset = AUTHENTICATOR_LEN;
        let id_type = IdType::from_u8(data[offset])
            .ok_or_else(|| Error::InvalidMessage(format!("id type {}", data[offset])))?;
        offset += 1;
        let app_id = read_u32_le(&data[offset..]);
        offset += 4;
        let name = array(&data[offset..]);
        offset += CLIENT_NAME_LEN;

        Ok(Self {
            tag: array(data),
            id_type,
            app_id,
            name,
            nonce: array(&data[offset..]),
        })
    }
}

/// Authorization id assigned by the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    /// Authenticator over id, uuid and both nonces.
    pub tag: Tag,
    /// Assigned authorization id.
    pub authorization_id: u32,
    /// Lock UUID.
    pub uuid: [u8; 16],
    /// Lock nonce.
    pub nonce: Nonce,
}

impl AuthorizationGrant {
    /// Serialize.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(AUTHORIZATION_ID_LEN);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.authorization_id.to_le_bytes());
        out.extend_from_slice(&self.uuid);
        out.extend_from_slice(&self.nonce);
        out
    }

    /// Parse.
    pub fn decode(data: &[u8]) -> Result<Self> {
        check_len(data, AUTHORIZATION_ID_LEN)?;
        let offset = AUTHENTICATOR_LEN;
        Ok(Self {
            tag: array(data),
            authorization_id: read_u32_le(&data[offset..]),
            uuid: array(&data[offset + 4..]),
            nonce: array(&data[offset + 20..]),
        })
    }
}

/// Controller echo of the assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationConfirmation {
    /// Authenticator over id and lock nonce.
    pub tag: Tag,
    /// Echoed authorization id.
    pub authorization_id: u32,
}

impl AuthorizationConfirmation {
    /// Serialize.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CONFIRMATION_LEN);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.authorization_id.to_le_bytes());
        out
    }

    /// Parse.
    pub fn decode(data: &[u8]) -> Result<Self> {
        check_len(data, CONFIRMATION_LEN)?;
        Ok(Self {
            tag: array(data),
            authorization_id: read_u32_le(&data[AUTHENTICATOR_LEN..]),
        })
    }
}

/// Lock error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReport {
    /// Lock error code, see [`PeerError`](crate::command::PeerError).
    pub code: u8,
    /// Raw id of the command that failed.
    pub command: u16,
}

impl ErrorReport {
    /// Serialize.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ERROR_REPORT_LEN);
        out.push(self.code);
        out.extend_from_slice(&self.command.to_le_bytes());
        out
    }

    /// Parse.
    pub fn decode(data: &[u8]) -> Result<Self> {
        check_len(data, ERROR_REPORT_LEN)?;
        Ok(Self {
            code: data[0],
            command: read_u16_le(&data[1..]),
        })
    }
}

/// Seal an authorization payload if the framing asks for it.
pub fn seal_payload(
    secret: &SharedSecret,
    rng: &mut dyn SecureRng,
    command: Command,
    plaintext: &[u8],
    encrypted: bool,
) -> Result<Vec<u8>> {
    if !encrypted {
        return Ok(plaintext.to_vec());
    }
    Ok(aead::seal(secret, rng, plaintext, &command.to_le_bytes())?)
}

/// Open a payload produced by [`seal_payload`].
///
/// # Errors
///
/// Returns `Error::InvalidMessage` if the payload does not authenticate.
pub fn open_payload(
    secret: &SharedSecret,
    command: Command,
    payload: &[u8],
    encrypted: bool,
) -> Result<Zeroizing<Vec<u8>>> {
    if !encrypted {
        return Ok(Zeroizing::new(payload.to_vec()));
    }
    aead::open(secret, payload, &command.to_le_bytes())
        .map_err(|e| Error::InvalidMessage(format!("{:?} payload: {}", command, e)))
}
