//! The byte-level seam between the pairing state machine and a radio.

use crate::Result;

/// Write/notify primitives of the lock's pairing characteristic.
///
/// Connection setup, MTU negotiation and subscription happen before a
/// transport is handed to the driver.
#[async_trait::async_trait]
pub trait PairingTransport: Send {
    /// Write one complete frame to the lock.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Wait for the next notification payload. `None` once the link is closed.
    ///
    /// Must be cancel-safe: the driver races it against its deadline.
    async fn next_notification(&mut self) -> Option<Vec<u8>>;
}
