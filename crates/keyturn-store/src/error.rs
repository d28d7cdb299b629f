//! Credential store errors.

use thiserror::Error;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Backing storage not available.
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),

    /// Record failed validation (partial or inconsistent key material).
    #[error("Invalid credential record: {0}")]
    InvalidRecord(String),

    /// At-rest sealing or unsealing failed.
    #[error("Credential sealing failed: {0}")]
    Sealing(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record encoding error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key material could not be decoded.
    #[error("Crypto error: {0}")]
    Crypto(#[from] keyturn_crypto::Error),
}
