//! Error types for pairing operations.

use crate::command::Command;
use crate::reassembly::FragmentFault;
use thiserror::Error;

/// Result type alias for pairing operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Pairing operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A peer authenticator did not verify.
    #[error("Authenticator mismatch")]
    AuthenticatorMismatch,

    /// The peer answered with a failure status or an error report.
    #[error("Peer rejected pairing (code 0x{0:02X})")]
    PeerRejected(u8),

    /// A complete message arrived that the current state does not expect.
    #[error("Unexpected message: {0:?}")]
    UnexpectedMessage(Command),

    /// Reassembly-level inconsistency.
    #[error("Unexpected fragment: {0}")]
    UnexpectedFragment(FragmentFault),

    /// Session keys requested before the handshake completed.
    #[error("Session not established")]
    SessionNotEstablished,

    /// A complete message whose content cannot be decoded.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Insufficient data.
    #[error("Insufficient data: need {0} bytes")]
    InsufficientData(usize),

    /// Handshake material missing for the current step.
    #[error("Invalid state transition")]
    InvalidState,

    /// `start` was called while a handshake is running.
    #[error("Handshake already in progress")]
    HandshakeInProgress,

    /// `start` was called from `Authenticated` or `Error` without a reset.
    #[error("Session must be cleared before a new handshake")]
    ResetRequired,

    /// Configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] keyturn_crypto::Error),

    /// Credential persistence error.
    #[error("Credential store error: {0}")]
    Store(#[from] keyturn_store::Error),
}

impl Error {
    /// The session error code this error is reported as.
    ///
    /// Configuration errors and a rejected `start` never reach the session
    /// state; they map to the closest code for hosts that log codes only.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::AuthenticatorMismatch => ErrorCode::AuthenticatorMismatch,
            Error::PeerRejected(_) => ErrorCode::PeerRejected,
            Error::UnexpectedMessage(_)
            | Error::InvalidState
            | Error::HandshakeInProgress
            | Error::ResetRequired => ErrorCode::UnexpectedMessage,
            Error::UnexpectedFragment(_) => ErrorCode::UnexpectedFragment,
            Error::SessionNotEstablished => ErrorCode::SessionNotEstablished,
            Error::Crypto(keyturn_crypto::Error::RandomSourceUnavailable(_)) => {
                ErrorCode::RandomSourceUnavailable
            }
            Error::InvalidMessage(_)
            | Error::InsufficientData(_)
            | Error::InvalidConfig(_)
            | Error::Crypto(_) => ErrorCode::InvalidMessage,
            Error::Store(_) => ErrorCode::Storage,
        }
    }
}

/// Session error codes reported through `error()` and `ErrorOccurred`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// No peer response within the deadline (0x01).
    Timeout = 0x01,
    /// Peer authenticator failed verification (0x02).
    AuthenticatorMismatch = 0x02,
    /// Peer returned a failure status (0x03).
    PeerRejected = 0x03,
    /// Message out of the expected order (0x04).
    UnexpectedMessage = 0x04,
    /// Secure random source failed (0x05).
    RandomSourceUnavailable = 0x05,
    /// Fragment errors beyond the tolerated count (0x06).
    UnexpectedFragment = 0x06,
    /// Session keys used before pairing completed (0x07).
    SessionNotEstablished = 0x07,
    /// Undecodable message content (0x08).
    InvalidMessage = 0x08,
    /// Credentials could not be persisted (0x09).
    Storage = 0x09,
}

impl ErrorCode {
    /// Convert to a numeric code.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from a numeric code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Timeout),
            0x02 => Some(Self::AuthenticatorMismatch),
            0x03 => Some(Self::PeerRejected),
            0x04 => Some(Self::UnexpectedMessage),
            0x05 => Some(Self::RandomSourceUnavailable),
            0x06 => Some(Self::UnexpectedFragment),
            0x07 => Some(Self::SessionNotEstablished),
            0x08 => Some(Self::InvalidMessage),
            0x09 => Some(Self::Storage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_roundtrip() {
        for value in 0x01..=0x09 {
            let code = ErrorCode::from_u8(value).unwrap();
            assert_eq!(code.to_u8(), value);
        }
        assert_eq!(ErrorCode::from_u8(0x00), None);
        assert_eq!(ErrorCode::from_u8(0x0A), None);
    }

    #[test]
    fn test_random_failure_keeps_its_code() {
        let err = Error::from(keyturn_crypto::Error::RandomSourceUnavailable(
            "closed".into(),
        ));
        assert_eq!(err.code(), ErrorCode::RandomSourceUnavailable);

        let err = Error::from(keyturn_crypto::Error::AuthTagMismatch);
        assert_eq!(err.code(), ErrorCode::InvalidMessage);
    }

    #[test]
    fn test_store_failure_maps_to_storage() {
        let err = Error::from(keyturn_store::Error::Unavailable("offline".into()));
        assert_eq!(err.code(), ErrorCode::Storage);
    }
}
