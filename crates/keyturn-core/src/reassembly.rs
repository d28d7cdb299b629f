//! Fragment reassembly for lock notifications.
//!
//! A message starts with a fragment carrying its command id. The declared
//! length comes from the fixed [`MessageLayout`], so the number of fragments
//! is known from the first one. Every fragment but the last must be exactly
//! `fragment_size` bytes.
//!
//! Any inconsistency drops the partial message and yields
//! [`Error::UnexpectedFragment`]; the next fragment is read as a new header.
//! A continuation that does not fit the partial message is itself re-read as
//! a header, so a short message the lock sends mid-stream (typically an
//! error report) is still delivered. A message is only ever delivered whole.

use crate::command::{Command, Direction};
use crate::frame::{decode_frame, read_u16_le, MessageLayout, HEADER_LEN};
use crate::{Error, Result};
use core::fmt;

/// Why a fragment was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentFault {
    /// Zero-length notification.
    Empty,
    /// First fragment too short to hold a command id.
    ShortHeader,
    /// Command id unknown or not valid in this direction.
    UnknownCommand(u16),
    /// Fragment longer than the configured fragment size.
    Oversized {
        /// Fragment length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Bytes beyond the declared message length.
    Overflow,
    /// More fragments than the declared length allows.
    TooManyFragments,
    /// A short fragment before the message was complete.
    ShortFragment,
    /// CRC trailer mismatch.
    ChecksumMismatch,
}

impl fmt::Display for FragmentFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentFault::Empty => write!(f, "empty fragment"),
            FragmentFault::ShortHeader => write!(f, "fragment shorter than command header"),
            FragmentFault::UnknownCommand(id) => write!(f, "unknown command 0x{:04X}", id),
            FragmentFault::Oversized { len, max } => {
                write!(f, "fragment of {} bytes exceeds {}", len, max)
            }
            FragmentFault::Overflow => write!(f, "data beyond declared length"),
            FragmentFault::TooManyFragments => write!(f, "more fragments than declared"),
            FragmentFault::ShortFragment => write!(f, "short fragment before message end"),
            FragmentFault::ChecksumMismatch => write!(f, "checksum mismatch"),
        }
    }
}

/// A reassembled message with header and trailer stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMessage {
    /// Command id.
    pub command: Command,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct PendingMessage {
    command: Command,
    declared_len: usize,
    expected_fragment_count: usize,
    received_fragment_count: usize,
    data: Vec<u8>,
}

/// Accumulates fragments into complete messages.
#[derive(Debug)]
pub struct Reassembler {
    layout: MessageLayout,
    direction: Direction,
    fragment_size: usize,
    pending: Option<PendingMessage>,
}

impl Reassembler {
    /// Reassembler for messages travelling in `direction`.
    pub fn new(layout: MessageLayout, direction: Direction, fragment_size: usize) -> Self {
        Self {
            layout,
            direction,
            fragment_size: fragment_size.max(HEADER_LEN),
            pending: None,
        }
    }

    /// Whether no message is partially received.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Feed one notification payload.
    ///
    /// Returns `Ok(Some(_))` when a message completes, `Ok(None)` while more
    /// fragments are expected.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedFragment`; the partial message is dropped.
    pub fn feed(&mut self, fragment: &[u8]) -> Result<Option<CompleteMessage>> {
        let continuing = self.pending.is_some();
        let result = self.accept(fragment);
        if result.is_ok() {
            return result;
        }
        self.pending = None;

        if continuing {
            if let Ok(restarted) = self.accept(fragment) {
                tracing::debug!("Partial message dropped for a new header");
                return Ok(restarted);
            }
            self.pending = None;
        }
        result
    }

    fn accept(&mut self, fragment: &[u8]) -> Result<Option<CompleteMessage>> {
        if fragment.is_empty() {
            return Err(fault(FragmentFault::Empty));
        }
        if fragment.len() > self.fragment_size {
            return Err(fault(FragmentFault::Oversized {
                len: fragment.len(),
                max: self.fragment_size,
            }));
        }

        let pending = match self.pending.take() {
            Some(mut pending) => {
                pending.received_fragment_count += 1;
                pending.data.extend_from_slice(fragment);
                pending
            }
            None => self.begin(fragment)?,
        };

        if pending.data.len() > pending.declared_len {
            return Err(fault(FragmentFault::Overflow));
        }
        if pending.received_fragment_count > pending.expected_fragment_count {
            return Err(fault(FragmentFault::TooManyFragments));
        }

        if pending.data.len() < pending.declared_len {
            if fragment.len() < self.fragment_size {
                return Err(fault(FragmentFault::ShortFragment));
            }
            self.pending = Some(pending);
            return Ok(None);
        }

        let (command, payload) = decode_frame(&pending.data, self.layout.checksum)?;
        debug_assert_eq!(command, pending.command);
        tracing::trace!(
            ?command,
            fragments = pending.received_fragment_count,
            "Reassembled message"
        );
        Ok(Some(CompleteMessage {
            command,
            payload: payload.to_vec(),
        }))
    }

    fn begin(&self, fragment: &[u8]) -> Result<PendingMessage> {
        if fragment.len() < HEADER_LEN {
            return Err(fault(FragmentFault::ShortHeader));
        }

        let raw = read_u16_le(fragment);
        let command = Command::from_u16(raw).ok_or(fault(FragmentFault::UnknownCommand(raw)))?;
        let declared_len = self
            .layout
            .frame_len(command, self.direction)
            .ok_or(fault(FragmentFault::UnknownCommand(raw)))?;

        Ok(PendingMessage {
            command,
            declared_len,
            expected_fragment_count: declared_len.div_ceil(self.fragment_size),
            received_fragment_count: 1,
            data: fragment.to_vec(),
        })
    }
}

fn fault(fault: FragmentFault) -> Error {
    Error::UnexpectedFragment(fault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FramingConfig;
    use crate::frame::{encode_frame, fragment};
    use keyturn_crypto::Curve;
    use proptest::prelude::*;

    fn layout() -> MessageLayout {
        MessageLayout::new(Curve::X25519, &FramingConfig::default())
    }

    fn reassembler() -> Reassembler {
        Reassembler::new(layout(), Direction::ToController, 20)
    }

    fn public_key_frame() -> Vec<u8> {
        let key: Vec<u8> = (0..32).collect();
        encode_frame(Command::PublicKey, &key, true)
    }

    fn assert_fault(result: Result<Option<CompleteMessage>>, expected: FragmentFault) {
        match result {
            Err(Error::UnexpectedFragment(actual)) => assert_eq!(actual, expected),
            other => panic!("expected {:?}, got {:?}", expected, other),
        }
    }

    #[test]
    fn test_multi_fragment_message() {
        let mut r = reassembler();
        let frame = public_key_frame();
        let pieces = fragment(&frame, 20);
        assert_eq!(pieces.len(), 2);

        assert_eq!(r.feed(&pieces[0]).unwrap(), None);
        assert!(!r.is_idle());
        let message = r.feed(&pieces[1]).unwrap().unwrap();
        assert_eq!(message.command, Command::PublicKey);
        assert_eq!(message.payload, (0..32).collect::<Vec<u8>>());
        assert!(r.is_idle());
    }

    #[test]
    fn test_single_fragment_message() {
        let mut r = reassembler();
        let frame = encode_frame(Command::Status, &[0x00], true);
        let message = r.feed(&frame).unwrap().unwrap();
        assert_eq!(message.command, Command::Status);
        assert_eq!(message.payload, vec![0x00]);
    }

    #[test]
    fn test_empty_and_short_headers() {
        let mut r = reassembler();
        assert_fault(r.feed(&[]), FragmentFault::Empty);
        assert_fault(r.feed(&[0x03]), FragmentFault::ShortHeader);
        assert!(r.is_idle());
    }

    #[test]
    fn test_command_not_valid_in_direction() {
        let mut r = reassembler();
        // RequestData only travels towards the lock.
        assert_fault(r.feed(&[0x01, 0x00, 0x03, 0x00]), FragmentFault::UnknownCommand(1));
        assert_fault(r.feed(&[0x99, 0x00]), FragmentFault::UnknownCommand(0x99));
    }

    #[test]
    fn test_new_header_mid_message_replaces_partial() {
        let mut r = reassembler();
        let key_frame = public_key_frame();
        let report = encode_frame(Command::ErrorReport, &[0x11, 0x05, 0x00], true);

        assert_eq!(r.feed(&key_frame[..20]).unwrap(), None);
        // The lock gives up and reports an error where the key continuation belongs.
        let message = r.feed(&report).unwrap().unwrap();
        assert_eq!(message.command, Command::ErrorReport);
        assert_eq!(message.payload, vec![0x11, 0x05, 0x00]);
        assert!(r.is_idle());
    }

    #[test]
    fn test_bad_continuation_that_is_no_header_faults() {
        let mut r = reassembler();
        let key_frame = public_key_frame();

        assert_eq!(r.feed(&key_frame[..20]).unwrap(), None);
        assert_fault(r.feed(&[0x99, 0x99, 0x01]), FragmentFault::ShortFragment);
        assert!(r.is_idle());

        let status = encode_frame(Command::Status, &[0x00], true);
        assert_eq!(r.feed(&status).unwrap().unwrap().command, Command::Status);
    }

    #[test]
    fn test_overflow_rejected() {
        let mut r = reassembler();
        let mut frame = encode_frame(Command::Status, &[0x00], true);
        frame.push(0xAA);
        assert_fault(r.feed(&frame), FragmentFault::Overflow);

        let key_frame = public_key_frame();
        assert_eq!(r.feed(&key_frame[..20]).unwrap(), None);
        let mut tail = key_frame[20..].to_vec();
        tail.extend_from_slice(&[0, 0, 0]);
        assert_fault(r.feed(&tail), FragmentFault::Overflow);
    }

    #[test]
    fn test_oversized_fragment_rejected() {
        let mut r = reassembler();
        assert_fault(
            r.feed(&public_key_frame()),
            FragmentFault::Oversized { len: 36, max: 20 },
        );
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let mut r = reassembler();
        let mut frame = public_key_frame();
        frame[10] ^= 0xFF;
        let pieces = fragment(&frame, 20);
        assert_eq!(r.feed(&pieces[0]).unwrap(), None);
        assert_fault(r.feed(&pieces[1]), FragmentFault::ChecksumMismatch);
    }

    #[test]
    fn test_reordered_fragments_never_yield_partial() {
        let payload: Vec<u8> = (0..124).collect();
        let frame = encode_frame(Command::AuthorizationId, &payload, true);
        let mut pieces = fragment(&frame, 20);
        assert_eq!(pieces.len(), 7);
        // The short final piece arrives second.
        let last = pieces.remove(6);
        pieces.insert(1, last);

        let mut r = reassembler();
        let mut delivered = Vec::new();
        let mut faults = 0;
        for piece in &pieces {
            match r.feed(piece) {
                Ok(Some(message)) => delivered.push(message),
                Ok(None) => {}
                Err(Error::UnexpectedFragment(_)) => faults += 1,
                Err(e) => panic!("unexpected error {:?}", e),
            }
        }
        assert!(delivered.is_empty());
        assert!(faults >= 1);
    }

    #[test]
    fn test_whole_frames_with_unbounded_fragment_size() {
        let mut r = Reassembler::new(layout(), Direction::ToLock, usize::MAX);
        let frame = encode_frame(Command::AuthorizationData, &[0x11; 141], true);
        let message = r.feed(&frame).unwrap().unwrap();
        assert_eq!(message.command, Command::AuthorizationData);
        assert_eq!(message.payload.len(), 141);
    }

    proptest! {
        #[test]
        fn test_arbitrary_fragments_yield_only_whole_messages(
            fragments in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..24), 0..64)
        ) {
            let mut r = reassembler();
            for piece in &fragments {
                if let Ok(Some(message)) = r.feed(piece) {
                    let expected = layout().payload_len(message.command, Direction::ToController);
                    prop_assert_eq!(Some(message.payload.len()), expected);
                }
            }
        }

        #[test]
        fn test_any_fragment_size_reassembles(size in 2usize..200, id in any::<u32>()) {
            let mut payload = id.to_le_bytes().to_vec();
            payload.resize(124, 0xA5);
            let frame = encode_frame(Command::AuthorizationId, &payload, true);

            let mut r = Reassembler::new(layout(), Direction::ToController, size);
            let mut delivered = Vec::new();
            for piece in fragment(&frame, size) {
                if let Some(message) = r.feed(&piece).unwrap() {
                    delivered.push(message);
                }
            }
            prop_assert_eq!(delivered.len(), 1);
            prop_assert_eq!(&delivered[0].payload, &payload);
        }
    }
}
