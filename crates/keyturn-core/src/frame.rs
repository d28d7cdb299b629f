//! Frame codec for the pairing characteristic.
//!
//! Wire format (all integers little-endian):
//!
//! ```text
//! command: u16 | payload | crc: u16 (optional)
//! ```
//!
//! The CRC is CRC-16/CCITT-FALSE over command and payload. Each command has
//! a fixed payload length per direction, which is what the reassembler uses
//! as the declared message length.

use crate::command::{Command, Direction};
use crate::config::FramingConfig;
use crate::reassembly::FragmentFault;
use crate::{Error, Result};
use crc::{Crc, CRC_16_IBM_3740};
use keyturn_crypto::aead::SEAL_OVERHEAD;
use keyturn_crypto::mac::AUTHENTICATOR_LEN;
use keyturn_crypto::random::NONCE_LEN;
use keyturn_crypto::Curve;

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Length of the command id header.
pub const HEADER_LEN: usize = 2;
/// Length of the CRC trailer.
pub const CRC_LEN: usize = 2;

/// `RequestData` payload: requested command id.
pub const REQUEST_DATA_LEN: usize = 2;
/// Controller authenticator payload.
pub const CONTROLLER_AUTHENTICATOR_LEN: usize = AUTHENTICATOR_LEN;
/// Lock authenticator payload: tag followed by a nonce.
pub const PEER_AUTHENTICATOR_LEN: usize = AUTHENTICATOR_LEN + NONCE_LEN;
/// Plain authorization data: tag, id type, app id, name, nonce.
pub const AUTHORIZATION_DATA_LEN: usize = AUTHENTICATOR_LEN + 1 + 4 + 32 + NONCE_LEN;
/// Plain authorization id: tag, id, uuid, nonce.
pub const AUTHORIZATION_ID_LEN: usize = AUTHENTICATOR_LEN + 4 + 16 + NONCE_LEN;
/// Plain authorization id confirmation: tag, id.
pub const CONFIRMATION_LEN: usize = AUTHENTICATOR_LEN + 4;
/// Status payload.
pub const STATUS_LEN: usize = 1;
/// Error report payload: code, command id.
pub const ERROR_REPORT_LEN: usize = 3;

/// Fixed message lengths for one framing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLayout {
    /// Curve, which fixes the public key length.
    pub curve: Curve,
    /// Whether frames carry a CRC trailer.
    pub checksum: bool,
    /// Whether authorization payloads are sealed.
    pub encrypted_authorization: bool,
}

impl MessageLayout {
    /// Layout for `curve` under `framing`.
    pub fn new(curve: Curve, framing: &FramingConfig) -> Self {
        Self {
            curve,
            checksum: framing.checksum,
            encrypted_authorization: framing.encrypted_authorization,
        }
    }

    fn sealed(&self, plain: usize) -> usize {
        if self.encrypted_authorization {
            plain + SEAL_OVERHEAD
        } else {
            plain
        }
    }

    /// Payload length of `command` travelling in `direction`, or `None` if
    /// the command never travels that way.
    pub fn payload_len(&self, command: Command, direction: Direction) -> Option<usize> {
        use Command::*;
        use Direction::*;

        match (command, direction) {
            (RequestData, ToLock) => Some(REQUEST_DATA_LEN),
            (PublicKey, _) => Some(self.curve.public_key_len()),
            (Challenge, ToController) => Some(NONCE_LEN),
            (AuthorizationAuthenticator, ToLock) => Some(CONTROLLER_AUTHENTICATOR_LEN),
            (AuthorizationAuthenticator, ToController) => Some(PEER_AUTHENTICATOR_LEN),
            (AuthorizationData, ToLock) => Some(self.sealed(AUTHORIZATION_DATA_LEN)),
            (AuthorizationId, ToController) => Some(self.sealed(AUTHORIZATION_ID_LEN)),
            (AuthorizationIdConfirmation, ToLock) => Some(self.sealed(CONFIRMATION_LEN)),
            (Status, ToController) => Some(STATUS_LEN),
            (ErrorReport, ToController) => Some(ERROR_REPORT_LEN),
            _ => None,
        }
    }

    /// Full frame length including header and trailer.
    pub fn frame_len(&self, command: Command, direction: Direction) -> Option<usize> {
        let trailer = if self.checksum { CRC_LEN } else { 0 };
        self.payload_len(command, direction)
            .map(|len| HEADER_LEN + len + trailer)
    }
}

/// Serialize a frame.
pub fn encode_frame(command: Command, payload: &[u8], checksum: bool) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    frame.extend_from_slice(&command.to_le_bytes());
    frame.extend_from_slice(payload);
    if checksum {
        let crc = CRC16.checksum(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
    }
    frame
}

/// Parse a complete frame, verifying and stripping the CRC.
pub fn decode_frame(frame: &[u8], checksum: bool) -> Result<(Command, &[u8])> {
    let trailer = if checksum { CRC_LEN } else { 0 };
    if frame.len() < HEADER_LEN + trailer {
        return Err(Error::UnexpectedFragment(FragmentFault::ShortHeader));
    }

    let raw_command = read_u16_le(&frame[..HEADER_LEN]);
    let command = Command::from_u16(raw_command)
        .ok_or(Error::UnexpectedFragment(FragmentFault::UnknownCommand(raw_command)))?;

    let body_end = frame.len() - trailer;
    if checksum {
        let expected = read_u16_le(&frame[body_end..]);
        if CRC16.checksum(&frame[..body_end]) != expected {
            return Err(Error::UnexpectedFragment(FragmentFault::ChecksumMismatch));
        }
    }

    Ok((command, &frame[HEADER_LEN..body_end]))
}

/// Split a frame into notification-sized pieces.
pub fn fragment(frame: &[u8], fragment_size: usize) -> Vec<Vec<u8>> {
    frame
        .chunks(fragment_size.max(1))
        .map(<[u8]>::to_vec)
        .collect()
}

pub(crate) fn check_len(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        Err(Error::InsufficientData(needed))
    } else {
        Ok(())
    }
}

#[inline]
pub(crate) fn read_u16_le(data: &[u8]) -> u16 {
    u16::from_le_bytes([data[0], data[1]])
}

#[inline]
pub(crate) fn read_u32_le(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}
