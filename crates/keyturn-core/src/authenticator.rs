//! Controller-side pairing state machine.
//!
//! [`PairingAuthenticator`] is sans-IO: it never touches the transport or a
//! clock. The host feeds notifications and the current time, then drains
//! outbound frames with [`poll_transmit`](PairingAuthenticator::poll_transmit),
//! host events with [`poll_event`](PairingAuthenticator::poll_event), and
//! schedules a wakeup at [`poll_timeout`](PairingAuthenticator::poll_timeout).
//!
//! Handshake key material lives in a private `Handshake` record that is
//! replaced wholesale on start, failure and reset. Its key types zero their
//! memory on drop, so replacing the record wipes the previous attempt.

use crate::command::{Command, Direction, STATUS_ACCEPTED, STATUS_COMPLETE};
use crate::config::AuthConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::frame::{encode_frame, MessageLayout};
use crate::message::{
    open_payload, seal_payload, AuthorizationConfirmation, AuthorizationData, AuthorizationGrant,
    ErrorReport, PeerAuthenticator,
};
use crate::reassembly::{CompleteMessage, Reassembler};
use crate::state::{transition, Action, AuthState, Event};
use keyturn_crypto::mac::{compute_authenticator, verify_authenticator};
use keyturn_crypto::random::{generate_nonce, os_rng, random_array, NONCE_LEN};
use keyturn_crypto::{aead, EphemeralKeyPair, SecureRng, SharedSecret};
use keyturn_store::{AuthorizationIdentity, CredentialStore, PeerIdentity, StoredCredentials};
use std::collections::VecDeque;
use std::time::Instant;
use zeroize::Zeroizing;

/// Notification to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The state machine entered a new state.
    StateChanged(AuthState),
    /// The handshake failed with this code.
    ErrorOccurred(ErrorCode),
    /// The handshake finished; `true` on success.
    Finished(bool),
}

/// Material of one handshake attempt.
#[derive(Default)]
struct Handshake {
    key_pair: Option<EphemeralKeyPair>,
    peer_public_key: Option<Vec<u8>>,
    shared_secret: Option<SharedSecret>,
    challenge: Option<[u8; NONCE_LEN]>,
    peer_nonce: Option<[u8; NONCE_LEN]>,
    local_nonce: Option<Zeroizing<[u8; NONCE_LEN]>>,
    grant_nonce: Option<[u8; NONCE_LEN]>,
    authorization: Option<AuthorizationIdentity>,
    peer_uuid: Option<[u8; 16]>,
}

impl Handshake {
    fn key_pair(&self) -> Result<&EphemeralKeyPair> {
        self.key_pair.as_ref().ok_or(Error::InvalidState)
    }

    fn peer_public_key(&self) -> Result<&[u8]> {
        self.peer_public_key.as_deref().ok_or(Error::InvalidState)
    }

    fn secret(&self) -> Result<&SharedSecret> {
        self.shared_secret.as_ref().ok_or(Error::InvalidState)
    }

    fn nonce(nonce: &Option<[u8; NONCE_LEN]>) -> Result<&[u8; NONCE_LEN]> {
        nonce.as_ref().ok_or(Error::InvalidState)
    }

    fn local_nonce(&self) -> Result<&[u8; NONCE_LEN]> {
        self.local_nonce.as_deref().ok_or(Error::InvalidState)
    }

    fn authorization(&self) -> Result<&AuthorizationIdentity> {
        self.authorization.as_ref().ok_or(Error::InvalidState)
    }
}

/// What a performed action asks the dispatcher to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Enter the transition's next state.
    Advance,
    /// Remain in the current state and re-arm its deadline.
    Stay,
    /// Nothing happened.
    Ignored,
    /// The event was refused.
    Rejected,
    /// Enter `Error` with this code.
    Fail(ErrorCode),
}

/// Pairing and authentication session for one lock.
pub struct PairingAuthenticator<S: CredentialStore> {
    config: AuthConfig,
    peer: PeerIdentity,
    store: S,
    rng: Box<dyn SecureRng>,
    state: AuthState,
    error: Option<ErrorCode>,
    peer_error: Option<u8>,
    reassembler: Reassembler,
    handshake: Handshake,
    credentials: Option<StoredCredentials>,
    fragment_errors: u32,
    deadline: Option<Instant>,
    transmit: VecDeque<Vec<u8>>,
    events: VecDeque<AuthEvent>,
}

impl<S: CredentialStore> PairingAuthenticator<S> {
    /// Create a session, restoring stored credentials for `peer` if present.
    pub fn new(config: AuthConfig, peer: PeerIdentity, store: S) -> Result<Self> {
        Self::with_rng(config, peer, store, os_rng())
    }

    /// Create a session drawing randomness from `rng`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for an unusable configuration. A stored
    /// record that cannot be read is logged and treated as absent, so the
    /// host can still [`clear_settings`](Self::clear_settings) and re-pair.
    pub fn with_rng(
        config: AuthConfig,
        peer: PeerIdentity,
        store: S,
        rng: Box<dyn SecureRng>,
    ) -> Result<Self> {
        config.validate()?;

        let layout = MessageLayout::new(config.curve, &config.framing);
        let reassembler =
            Reassembler::new(layout, Direction::ToController, config.framing.fragment_size);
        let credentials = match store.load(&peer) {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(
                    remote = %peer.remote_address,
                    error = %e,
                    "Ignoring unreadable stored credentials"
                );
                None
            }
        };
        let state = if credentials.is_some() {
            tracing::debug!(remote = %peer.remote_address, "Restored pairing credentials");
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };

        Ok(Self {
            config,
            peer,
            store,
            rng,
            state,
            error: None,
            peer_error: None,
            reassembler,
            handshake: Handshake::default(),
            credentials,
            fragment_errors: 0,
            deadline: None,
            transmit: VecDeque::new(),
            events: VecDeque::new(),
        })
    }

    // === Host operations ===

    /// Start a fresh handshake from `Unauthenticated`.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandshakeInProgress` if a handshake is running and
    /// `Error::ResetRequired` from `Authenticated` or `Error`; call
    /// [`clear_settings`](Self::clear_settings) first.
    pub fn start_authentication_process(&mut self, now: Instant) -> Result<()> {
        match self.dispatch(Event::Start, None, now) {
            Outcome::Rejected if self.state.is_at_rest() => Err(Error::ResetRequired),
            Outcome::Rejected => Err(Error::HandshakeInProgress),
            _ => Ok(()),
        }
    }

    /// Feed one notification payload from the pairing characteristic.
    pub fn handle_notification(&mut self, fragment: &[u8], now: Instant) {
        if self.state.is_at_rest() {
            tracing::debug!(
                state = ?self.state,
                len = fragment.len(),
                "Ignoring notification outside a handshake"
            );
            return;
        }

        match self.reassembler.feed(fragment) {
            Ok(Some(message)) => {
                let command = message.command;
                self.dispatch(Event::Received(command), Some(message), now);
            }
            Ok(None) => {}
            Err(e) => {
                self.fragment_errors += 1;
                tracing::warn!(
                    error = %e,
                    count = self.fragment_errors,
                    tolerance = self.config.fragment_error_tolerance,
                    "Dropped malformed notification"
                );
                if self.fragment_errors > self.config.fragment_error_tolerance {
                    self.fail(e.code());
                }
            }
        }
    }

    /// Fire the deadline if `now` has reached it.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            self.dispatch(Event::Timeout, None, now);
        }
    }

    /// Report that the transport could not write a frame.
    pub fn handle_write_failure(&mut self, now: Instant) {
        self.dispatch(Event::WriteFailed, None, now);
    }

    /// Discard all key material for this peer, in memory and persisted, and
    /// return to `Unauthenticated`.
    ///
    /// The session is reset even if the store fails to clear.
    pub fn clear_settings(&mut self, now: Instant) -> Result<()> {
        self.dispatch(Event::Reset, None, now);
        self.store.clear(&self.peer)?;
        Ok(())
    }

    /// Next frame to write to the lock.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.transmit.pop_front()
    }

    /// Next host event.
    pub fn poll_event(&mut self) -> Option<AuthEvent> {
        self.events.pop_front()
    }

    /// Deadline of the current awaiting state.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.deadline
    }

    // === Accessors ===

    /// Whether the session holds verified, complete credentials.
    pub fn is_valid(&self) -> bool {
        self.state == AuthState::Authenticated && self.credentials.is_some()
    }

    /// Current state.
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Last handshake error.
    pub fn error(&self) -> Option<ErrorCode> {
        self.error
    }

    /// Raw code the lock rejected the last handshake with: the status byte
    /// of a failing `Status`, or the code of an `ErrorReport`.
    pub fn peer_error(&self) -> Option<u8> {
        self.peer_error
    }

    /// Peer this session pairs with.
    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    /// Configuration in use.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authorization id assigned by the lock, once valid.
    pub fn authorization_id(&self) -> Option<u32> {
        self.valid_credentials().map(|c| c.authorization.id)
    }

    /// Wire bytes of the authorization id, once valid.
    pub fn authorization_id_raw_data(&self) -> Option<&[u8]> {
        self.valid_credentials()
            .map(|c| c.authorization.raw.as_slice())
    }

    /// Shared secret of the established session.
    pub fn shared_secret(&self) -> Result<&SharedSecret> {
        self.valid_credentials()
            .map(|c| &c.shared_secret)
            .ok_or(Error::SessionNotEstablished)
    }

    /// Encrypt with the session secret under a caller-supplied 24-byte nonce.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotEstablished` unless [`is_valid`](Self::is_valid).
    pub fn encrypt_data(&self, data: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        Ok(aead::encrypt(self.shared_secret()?, nonce, data)?)
    }

    /// Decrypt data produced by [`encrypt_data`](Self::encrypt_data).
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotEstablished` unless valid, and
    /// `Error::Crypto(AuthTagMismatch)` for tampered data.
    pub fn decrypt_data(&self, data: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        Ok(aead::decrypt(self.shared_secret()?, nonce, data)?)
    }

    /// Draw `len` bytes from the session's secure random source.
    pub fn generate_nonce(&mut self, len: usize) -> Result<Vec<u8>> {
        Ok(generate_nonce(self.rng.as_mut(), len)?)
    }

    fn valid_credentials(&self) -> Option<&StoredCredentials> {
        if self.state == AuthState::Authenticated {
            self.credentials.as_ref()
        } else {
            None
        }
    }

    // === Dispatch ===

    /// Run `event` through the table, then keep proceeding through transient
    /// states. Returns the outcome of the first step.
    fn dispatch(&mut self, event: Event, message: Option<CompleteMessage>, now: Instant) -> Outcome {
        let mut event = event;
        let mut message = message;
        let mut first = None;

        loop {
            let t = transition(self.state, event);
            let outcome = match self.perform(t.action, message.take()) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(state = ?self.state, action = ?t.action, error = %e, "Handshake step failed");
                    Outcome::Fail(e.code())
                }
            };
            first.get_or_insert(outcome);

            match outcome {
                Outcome::Advance => self.enter(t.next, now),
                Outcome::Stay => self.arm_deadline(now),
                Outcome::Fail(code) => self.fail(code),
                Outcome::Ignored | Outcome::Rejected => {}
            }

            if outcome != Outcome::Advance || !self.state.is_transient() {
                break;
            }
            event = Event::Proceed;
        }

        first.unwrap_or(Outcome::Ignored)
    }

    fn enter(&mut self, next: AuthState, now: Instant) {
        if next != self.state {
            tracing::debug!(from = ?self.state, to = ?next, "State changed");
            self.state = next;
            self.events.push_back(AuthEvent::StateChanged(next));
            if next == AuthState::Authenticated {
                self.events.push_back(AuthEvent::Finished(true));
            }
        }
        self.arm_deadline(now);
    }

    fn arm_deadline(&mut self, now: Instant) {
        self.deadline = if self.state.is_awaiting() {
            Some(now + self.config.response_timeout())
        } else {
            None
        };
    }

    fn fail(&mut self, code: ErrorCode) {
        tracing::warn!(
            state = ?self.state,
            error = ?code,
            remote = %self.peer.remote_address,
            "Pairing failed"
        );
        self.handshake = Handshake::default();
        self.reassembler.reset();
        self.deadline = None;
        self.error = Some(code);
        self.state = AuthState::Error;
        self.events.push_back(AuthEvent::StateChanged(AuthState::Error));
        self.events.push_back(AuthEvent::ErrorOccurred(code));
        self.events.push_back(AuthEvent::Finished(false));
    }

    fn wipe(&mut self) {
        self.handshake = Handshake::default();
        self.credentials = None;
        self.error = None;
        self.peer_error = None;
        self.fragment_errors = 0;
        self.reassembler.reset();
        self.transmit.clear();
        self.deadline = None;
    }

    fn queue(&mut self, command: Command, payload: &[u8]) {
        let frame = encode_frame(command, payload, self.config.framing.checksum);
        tracing::debug!(?command, len = frame.len(), "Queued frame");
        self.transmit.push_back(frame);
    }

    fn payload(message: Option<CompleteMessage>) -> Result<Vec<u8>> {
        message
            .map(|m| m.payload)
            .ok_or(Error::InvalidState)
    }

    // === Actions ===

    fn perform(&mut self, action: Action, message: Option<CompleteMessage>) -> Result<Outcome> {
        match action {
            Action::RequestPublicKey => {
                self.wipe();
                self.queue(Command::RequestData, &Command::PublicKey.to_le_bytes());
            }
            Action::AcceptPeerPublicKey => {
                let key = Self::payload(message)?;
                if key.len() != self.config.curve.public_key_len() {
                    return Err(Error::InvalidMessage(format!(
                        "public key of {} bytes",
                        key.len()
                    )));
                }
                self.handshake.peer_public_key = Some(key);
            }
            Action::GenerateKeyPair => {
                let key_pair = EphemeralKeyPair::generate(self.config.curve, self.rng.as_mut())?;
                let secret = key_pair
                    .derive_shared_secret(self.handshake.peer_public_key()?)
                    .map_err(|e| Error::InvalidMessage(format!("lock public key: {}", e)))?;
                self.handshake.key_pair = Some(key_pair);
                self.handshake.shared_secret = Some(secret);
            }
            Action::SendPublicKey => {
                let public_key = self.handshake.key_pair()?.public_key().to_vec();
                self.queue(Command::PublicKey, &public_key);
            }
            Action::AcceptChallenge => {
                let payload = Self::payload(message)?;
                let nonce = payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::InvalidMessage("challenge length".into()))?;
                self.handshake.challenge = Some(nonce);
            }
            Action::SendAuthenticator => {
                let hs = &self.handshake;
                let tag = compute_authenticator(
                    hs.secret()?,
                    &[
                        hs.key_pair()?.public_key(),
                        hs.peer_public_key()?,
                        Handshake::nonce(&hs.challenge)?,
                    ],
                )?;
                self.queue(Command::AuthorizationAuthenticator, &tag);
            }
            Action::VerifyPeerAuthenticator => {
                let peer = PeerAuthenticator::decode(&Self::payload(message)?)?;
                let hs = &self.handshake;
                let verified = verify_authenticator(
                    hs.secret()?,
                    &[hs.peer_public_key()?, hs.key_pair()?.public_key(), &peer.nonce],
                    &peer.tag,
                );
                if !verified {
                    return Err(Error::AuthenticatorMismatch);
                }
                self.handshake.peer_nonce = Some(peer.nonce);
            }
            Action::SendAuthorizationData => {
                let local_nonce = Zeroizing::new(random_array::<NONCE_LEN>(self.rng.as_mut())?);
                let client = &self.config.client;
                let name = client.name_bytes()?;
                let hs = &self.handshake;
                let secret = hs.secret()?;
                let tag = compute_authenticator(
                    secret,
                    &[
                        &[client.id_type.to_u8()],
                        &client.app_id.to_le_bytes(),
                        &name,
                        &local_nonce[..],
                        Handshake::nonce(&hs.peer_nonce)?,
                    ],
                )?;
                let data = AuthorizationData {
                    tag,
                    id_type: client.id_type,
                    app_id: client.app_id,
                    name,
                    nonce: *local_nonce,
                };
                let payload = seal_payload(
                    secret,
                    self.rng.as_mut(),
                    Command::AuthorizationData,
                    &data.encode(),
                    self.config.framing.encrypted_authorization,
                )?;
                self.handshake.local_nonce = Some(local_nonce);
                self.queue(Command::AuthorizationData, &payload);
            }
            Action::AcceptAuthorizationId => {
                let payload = Self::payload(message)?;
                let hs = &self.handshake;
                let plain = open_payload(
                    hs.secret()?,
                    Command::AuthorizationId,
                    &payload,
                    self.config.framing.encrypted_authorization,
                )?;
                let grant = AuthorizationGrant::decode(&plain)?;
                let verified = verify_authenticator(
                    hs.secret()?,
                    &[
                        &grant.authorization_id.to_le_bytes(),
                        &grant.uuid,
                        &grant.nonce,
                        hs.local_nonce()?,
                    ],
                    &grant.tag,
                );
                if !verified {
                    return Err(Error::AuthenticatorMismatch);
                }
                tracing::debug!(authorization_id = grant.authorization_id, "Authorization id assigned");
                self.handshake.authorization = Some(AuthorizationIdentity::new(grant.authorization_id));
                self.handshake.peer_uuid = Some(grant.uuid);
                self.handshake.grant_nonce = Some(grant.nonce);
            }
            Action::SendAuthorizationIdConfirmation => {
                let hs = &self.handshake;
                let secret = hs.secret()?;
                let authorization_id = hs.authorization()?.id;
                let tag = compute_authenticator(
                    secret,
                    &[
                        &authorization_id.to_le_bytes(),
                        Handshake::nonce(&hs.grant_nonce)?,
                    ],
                )?;
                let confirmation = AuthorizationConfirmation {
                    tag,
                    authorization_id,
                };
                let payload = seal_payload(
                    secret,
                    self.rng.as_mut(),
                    Command::AuthorizationIdConfirmation,
                    &confirmation.encode(),
                    self.config.framing.encrypted_authorization,
                )?;
                self.queue(Command::AuthorizationIdConfirmation, &payload);
            }
            Action::EvaluateStatus => {
                let payload = Self::payload(message)?;
                match payload.first().copied() {
                    Some(STATUS_COMPLETE) => self.complete()?,
                    Some(STATUS_ACCEPTED) => return Ok(Outcome::Stay),
                    Some(status) => {
                        self.peer_error = Some(status);
                        return Err(Error::PeerRejected(status));
                    }
                    None => return Err(Error::InvalidMessage("empty status".into())),
                }
            }
            Action::Fail(code) => {
                if let Some(message) = message.filter(|m| m.command == Command::ErrorReport) {
                    if let Ok(report) = ErrorReport::decode(&message.payload) {
                        tracing::warn!(
                            code = report.code,
                            command = report.command,
                            "Lock reported an error"
                        );
                        self.peer_error = Some(report.code);
                    }
                }
                return Ok(Outcome::Fail(code));
            }
            Action::Ignore => return Ok(Outcome::Ignored),
            Action::Reject => return Ok(Outcome::Rejected),
            Action::Wipe => self.wipe(),
        }
        Ok(Outcome::Advance)
    }

    /// Persist the completed pairing. Runs on the terminal success step only.
    fn complete(&mut self) -> Result<()> {
        let hs = &self.handshake;
        let key_pair = hs.key_pair()?;
        let credentials = StoredCredentials {
            curve: key_pair.curve(),
            local_private_key: key_pair.private_key(),
            local_public_key: key_pair.public_key().to_vec(),
            shared_secret: hs.secret()?.clone(),
            peer_public_key: hs.peer_public_key()?.to_vec(),
            authorization: hs.authorization()?.clone(),
            peer_uuid: hs.peer_uuid,
        };

        self.store.save(&self.peer, &credentials)?;
        tracing::info!(
            remote = %self.peer.remote_address,
            authorization_id = credentials.authorization.id,
            "Pairing complete"
        );
        self.credentials = Some(credentials);
        self.handshake = Handshake::default();
        Ok(())
    }
}

impl<S: CredentialStore> core::fmt::Debug for PairingAuthenticator<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PairingAuthenticator")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("error", &self.error)
            .field("peer_error", &self.peer_error)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
