//! In-memory transport backed by tokio channels.
//!
//! [`channel_pair`] returns the controller side, implementing
//! [`PairingTransport`], and a [`LockEndpoint`] that a test or an emulator
//! drives. [`LockEndpoint::serve`] runs a [`SimulatedLock`] on it.

use crate::transport::PairingTransport;
use crate::{Error, Result};
use keyturn_core::peer::SimulatedLock;
use tokio::sync::mpsc;

/// Controller side of an in-memory link.
#[derive(Debug)]
pub struct ChannelTransport {
    writes: mpsc::Sender<Vec<u8>>,
    notifications: mpsc::Receiver<Vec<u8>>,
}

/// Lock side of an in-memory link.
#[derive(Debug)]
pub struct LockEndpoint {
    /// Frames written by the controller.
    pub frames: mpsc::Receiver<Vec<u8>>,
    /// Notifications towards the controller.
    pub notifications: mpsc::Sender<Vec<u8>>,
}

/// Create a connected transport/endpoint pair with `capacity` slots per
/// direction.
pub fn channel_pair(capacity: usize) -> (ChannelTransport, LockEndpoint) {
    let (write_tx, write_rx) = mpsc::channel(capacity);
    let (notify_tx, notify_rx) = mpsc::channel(capacity);
    (
        ChannelTransport {
            writes: write_tx,
            notifications: notify_rx,
        },
        LockEndpoint {
            frames: write_rx,
            notifications: notify_tx,
        },
    )
}

#[async_trait::async_trait]
impl PairingTransport for ChannelTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.writes
            .send(frame.to_vec())
            .await
            .map_err(|_| Error::Closed)
    }

    async fn next_notification(&mut self) -> Option<Vec<u8>> {
        self.notifications.recv().await
    }
}

impl LockEndpoint {
    /// Answer controller frames with `lock` until either side hangs up.
    /// Returns the lock for inspection.
    pub async fn serve(mut self, mut lock: SimulatedLock) -> SimulatedLock {
        while let Some(frame) = self.frames.recv().await {
            if let Err(e) = lock.handle_frame(&frame) {
                tracing::debug!(error = %e, "Simulated lock rejected frame");
            }
            while let Some(notification) = lock.poll_notification() {
                if self.notifications.send(notification).await.is_err() {
                    return lock;
                }
            }
        }
        lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_and_notifications_flow() {
        let (mut transport, mut endpoint) = channel_pair(4);

        transport.write_frame(&[0x01, 0x00]).await.unwrap();
        assert_eq!(endpoint.frames.recv().await, Some(vec![0x01, 0x00]));

        endpoint.notifications.send(vec![0x03]).await.unwrap();
        assert_eq!(transport.next_notification().await, Some(vec![0x03]));
    }

    #[tokio::test]
    async fn test_closed_endpoint() {
        let (mut transport, endpoint) = channel_pair(4);
        drop(endpoint);
        assert!(matches!(
            transport.write_frame(&[0x01]).await,
            Err(Error::Closed)
        ));
        assert_eq!(transport.next_notification().await, None);
    }
}
