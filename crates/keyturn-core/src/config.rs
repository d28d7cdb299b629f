//! Pairing configuration.
//!
//! Every struct derives `serde` with `#[serde(default)]`, so hosts can load a
//! partial JSON document and get defaults for the rest.

use crate::{Error, Result};
use keyturn_crypto::Curve;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default notification fragment size (BLE ATT payload at the minimum MTU).
pub const DEFAULT_FRAGMENT_SIZE: usize = 20;

/// Smallest usable fragment size: the first fragment must hold a command id.
pub const MIN_FRAGMENT_SIZE: usize = 2;

/// Length of the zero-padded client name on the wire.
pub const CLIENT_NAME_LEN: usize = 32;

/// Authentication state machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Curve for the key agreement.
    pub curve: Curve,
    /// Deadline for each awaited peer message in milliseconds.
    pub response_timeout_ms: u64,
    /// Fragment errors tolerated per handshake before it fails.
    pub fragment_error_tolerance: u32,
    /// Wire framing parameters.
    pub framing: FramingConfig,
    /// Identity announced to the lock.
    pub client: ClientIdentity,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            curve: Curve::X25519,
            response_timeout_ms: 5000,
            fragment_error_tolerance: 2,
            framing: FramingConfig::default(),
            client: ClientIdentity::default(),
        }
    }
}

impl AuthConfig {
    /// Per-message response deadline.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Reject configurations the state machine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.response_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "response_timeout_ms must be positive".into(),
            ));
        }
        if self.framing.fragment_size < MIN_FRAGMENT_SIZE {
            return Err(Error::InvalidConfig(format!(
                "fragment_size must be at least {}",
                MIN_FRAGMENT_SIZE
            )));
        }
        self.client.name_bytes()?;
        Ok(())
    }
}

/// Framing parameters of the pairing characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Maximum notification payload size in bytes.
    pub fragment_size: usize,
    /// Append and verify a CRC-16/CCITT-FALSE trailer.
    pub checksum: bool,
    /// Seal authorization data, id and confirmation with the shared secret.
    pub encrypted_authorization: bool,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            checksum: true,
            encrypted_authorization: true,
        }
    }
}

/// Kind of client being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum IdType {
    /// Phone or desktop app.
    #[default]
    App = 0,
    /// Network bridge.
    Bridge = 1,
    /// Key fob.
    Fob = 2,
}

impl IdType {
    /// Convert to wire format.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from wire format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::App),
            1 => Some(Self::Bridge),
            2 => Some(Self::Fob),
            _ => None,
        }
    }
}

/// Identity the controller announces in its authorization data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    /// Client kind.
    pub id_type: IdType,
    /// Application id chosen by the host.
    pub app_id: u32,
    /// Display name, at most 32 bytes of UTF-8.
    pub name: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            id_type: IdType::App,
            app_id: 0,
            name: "keyturn".into(),
        }
    }
}

impl ClientIdentity {
    /// Name as sent on the wire: UTF-8, zero-padded to 32 bytes.
    pub fn name_bytes(&self) -> Result<[u8; CLIENT_NAME_LEN]> {
        let raw = self.name.as_bytes();
        if raw.len() > CLIENT_NAME_LEN {
            return Err(Error::InvalidConfig(format!(
                "client name is {} bytes, limit is {}",
                raw.len(),
                CLIENT_NAME_LEN
            )));
        }
        let mut padded = [0u8; CLIENT_NAME_LEN];
        padded[..raw.len()].copy_from_slice(raw);
        Ok(padded)
    }
}
