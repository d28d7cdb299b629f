//! Pairing command identifiers and lock status codes.
//!
//! All identifiers are little-endian `u16` on the wire.

/// Command identifier carried in the first two bytes of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    /// Ask the lock to send a message (payload: requested command id).
    RequestData = 0x0001,
    /// Public key of the sender.
    PublicKey = 0x0003,
    /// Lock challenge nonce.
    Challenge = 0x0004,
    /// Authenticator over both public keys and a nonce.
    AuthorizationAuthenticator = 0x0005,
    /// Controller identity and nonce.
    AuthorizationData = 0x0006,
    /// Authorization id assigned by the lock.
    AuthorizationId = 0x0007,
    /// Final lock status.
    Status = 0x000E,
    /// Lock error report.
    ErrorReport = 0x0012,
    /// Controller echo of the assigned authorization id.
    AuthorizationIdConfirmation = 0x001E,
}

impl Command {
    /// Every known command.
    pub const ALL: [Command; 9] = [
        Command::RequestData,
        Command::PublicKey,
        Command::Challenge,
        Command::AuthorizationAuthenticator,
        Command::AuthorizationData,
        Command::AuthorizationId,
        Command::Status,
        Command::ErrorReport,
        Command::AuthorizationIdConfirmation,
    ];

    /// Convert to wire format.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Convert from wire format.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::RequestData),
            0x0003 => Some(Self::PublicKey),
            0x0004 => Some(Self::Challenge),
            0x0005 => Some(Self::AuthorizationAuthenticator),
            0x0006 => Some(Self::AuthorizationData),
            0x0007 => Some(Self::AuthorizationId),
            0x000E => Some(Self::Status),
            0x0012 => Some(Self::ErrorReport),
            0x001E => Some(Self::AuthorizationIdConfirmation),
            _ => None,
        }
    }

    /// Little-endian wire bytes.
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.to_u16().to_le_bytes()
    }
}

/// Which side a frame travels towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Controller to lock (characteristic writes).
    ToLock,
    /// Lock to controller (notifications).
    ToController,
}

/// Status byte: pairing complete.
pub const STATUS_COMPLETE: u8 = 0x00;
/// Status byte: request accepted, completion follows.
pub const STATUS_ACCEPTED: u8 = 0x01;

/// Error codes a lock reports in an `ErrorReport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PeerError {
    /// Lock is not in pairing mode (0x10).
    NotPairing = 0x10,
    /// Controller authenticator did not verify (0x11).
    BadAuthenticator = 0x11,
    /// Malformed parameter (0x12).
    BadParameter = 0x12,
    /// No free authorization slots (0x13).
    MaxUsers = 0x13,
    /// Frame checksum mismatch (0xFD).
    BadCrc = 0xFD,
    /// Frame length mismatch (0xFE).
    BadLength = 0xFE,
    /// Unspecified failure (0xFF).
    Unknown = 0xFF,
}

impl PeerError {
    /// Convert to wire format.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from wire format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x10 => Some(Self::NotPairing),
            0x11 => Some(Self::BadAuthenticator),
            0x12 => Some(Self::BadParameter),
            0x13 => Some(Self::MaxUsers),
            0xFD => Some(Self::BadCrc),
            0xFE => Some(Self::BadLength),
            0xFF => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids() {
        for command in Command::ALL {
            assert_eq!(Command::from_u16(command.to_u16()), Some(command));
        }
        assert_eq!(Command::AuthorizationIdConfirmation.to_le_bytes(), [0x1E, 0x00]);
        assert_eq!(Command::from_u16(0x0002), None);
        assert_eq!(Command::from_u16(0xFFFF), None);
    }

    #[test]
    fn test_peer_error_codes() {
        assert_eq!(PeerError::from_u8(0x11), Some(PeerError::BadAuthenticator));
        assert_eq!(PeerError::BadCrc.to_u8(), 0xFD);
        assert_eq!(PeerError::from_u8(0x00), None);
    }
}
