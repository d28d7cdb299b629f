//! Transport layer errors.

use keyturn_core::ErrorCode;
use thiserror::Error;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The other end of the transport is gone.
    #[error("Transport closed")]
    Closed,

    /// The handshake ended in the `Error` state.
    #[error("Pairing failed: {0:?}")]
    PairingFailed(ErrorCode),

    /// Protocol error from core.
    #[error("Protocol error: {0}")]
    Protocol(#[from] keyturn_core::Error),
}
