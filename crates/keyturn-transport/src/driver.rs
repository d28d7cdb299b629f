//! Runs a [`PairingAuthenticator`] over a [`PairingTransport`] on tokio.
//!
//! The state machine owns no clock and no I/O. The driver flushes its
//! outgoing frames, feeds it notifications and sleeps until its deadline,
//! reading time from `tokio::time` so paused-clock tests run instantly.

use crate::transport::PairingTransport;
use crate::{Error, Result};
use keyturn_core::{AuthEvent, AuthState, ErrorCode, PairingAuthenticator};
use keyturn_store::CredentialStore;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// Drives one pairing attempt to completion.
pub struct PairingDriver<S: CredentialStore, T: PairingTransport> {
    authenticator: PairingAuthenticator<S>,
    transport: T,
    events: Option<mpsc::UnboundedSender<AuthEvent>>,
}

impl<S: CredentialStore, T: PairingTransport> PairingDriver<S, T> {
    /// Wrap an authenticator and a connected transport.
    pub fn new(authenticator: PairingAuthenticator<S>, transport: T) -> Self {
        Self {
            authenticator,
            transport,
            events: None,
        }
    }

    /// Forward every [`AuthEvent`] to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<AuthEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// The wrapped state machine.
    pub fn authenticator(&self) -> &PairingAuthenticator<S> {
        &self.authenticator
    }

    /// Give back the state machine and transport.
    pub fn into_inner(self) -> (PairingAuthenticator<S>, T) {
        (self.authenticator, self.transport)
    }

    /// Start a handshake and run it until it succeeds or fails. The session
    /// must be `Unauthenticated`; clear a failed or paired one first.
    ///
    /// A closed transport is reported to the state machine as a write
    /// failure and ends in [`ErrorCode::Timeout`].
    pub async fn run(&mut self) -> Result<()> {
        let Self {
            authenticator,
            transport,
            events,
        } = self;

        authenticator.start_authentication_process(Instant::now().into_std())?;
        tracing::debug!(peer = ?authenticator.peer(), "Pairing started");

        loop {
            while let Some(frame) = authenticator.poll_transmit() {
                if let Err(e) = transport.write_frame(&frame).await {
                    tracing::warn!(error = %e, "Frame write failed");
                    authenticator.handle_write_failure(Instant::now().into_std());
                    break;
                }
            }

            while let Some(event) = authenticator.poll_event() {
                if let Some(tx) = events.as_ref() {
                    // A dropped receiver only means nobody is listening.
                    let _ = tx.send(event);
                }
            }

            match authenticator.state() {
                AuthState::Authenticated => {
                    tracing::info!(
                        authorization_id = ?authenticator.authorization_id(),
                        "Pairing complete"
                    );
                    return Ok(());
                }
                AuthState::Error => {
                    let code = authenticator.error().unwrap_or(ErrorCode::Timeout);
                    tracing::warn!(?code, "Pairing failed");
                    return Err(Error::PairingFailed(code));
                }
                _ => {}
            }

            let deadline = authenticator.poll_timeout().map(Instant::from_std);
            let expiry = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                notification = transport.next_notification() => match notification {
                    Some(bytes) => {
                        authenticator.handle_notification(&bytes, Instant::now().into_std());
                    }
                    None => {
                        tracing::warn!("Transport closed during pairing");
                        authenticator.handle_write_failure(Instant::now().into_std());
                    }
                },
                () = expiry => {
                    authenticator.handle_timeout(Instant::now().into_std());
                }
            }
        }
    }
}

impl<S: CredentialStore, T: PairingTransport> std::fmt::Debug for PairingDriver<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingDriver")
            .field("authenticator", &self.authenticator)
            .field("forwarding_events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}
