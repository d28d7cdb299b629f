//! Credential persistence for keyturn lock pairing.
//!
//! Implements:
//! - [`CredentialStore`]: the load/save/clear contract used by the
//!   authentication state machine
//! - [`MemoryCredentialStore`]: shared in-process store
//! - [`FileCredentialStore`]: one JSON record per peer, optionally sealed at
//!   rest with AES-256-GCM
//!
//! Credentials are only ever written after a handshake reached its terminal
//! success state; stores refuse records that fail validation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{Error, Result};
pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
pub use traits::{AuthorizationIdentity, CredentialStore, PeerIdentity, StoredCredentials};
