//! Lock-side responder for offline testing.
//!
//! [`SimulatedLock`] speaks the same wire protocol as a real lock in pairing
//! mode. It consumes whole controller frames and queues its answers as
//! notifications already split at the configured fragment size.
//! [`LockBehaviour`] makes it misbehave in the ways real locks do.

use crate::command::{Command, Direction, PeerError, STATUS_COMPLETE};
use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::frame::{encode_frame, fragment, read_u16_le, MessageLayout};
use crate::message::{
    open_payload, seal_payload, AuthorizationConfirmation, AuthorizationData, AuthorizationGrant,
    ErrorReport, PeerAuthenticator,
};
use crate::reassembly::{CompleteMessage, FragmentFault, Reassembler};
use keyturn_crypto::mac::{compute_authenticator, verify_authenticator};
use keyturn_crypto::random::{os_rng, random_array, NONCE_LEN};
use keyturn_crypto::{EphemeralKeyPair, SecureRng, SharedSecret};
use std::collections::VecDeque;

/// Ways the simulated lock deviates from the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockBehaviour {
    /// Authorization id handed out on success.
    pub authorization_id: u32,
    /// UUID reported with the authorization id.
    pub uuid: [u8; 16],
    /// Stop answering after receiving this command.
    pub silent_after: Option<Command>,
    /// Flip a byte of the lock authenticator.
    pub tamper_authenticator: bool,
    /// Final status byte; anything but `STATUS_COMPLETE` rejects the pairing.
    pub final_status: u8,
}

impl Default for LockBehaviour {
    fn default() -> Self {
        Self {
            authorization_id: 1,
            uuid: [0x4B; 16],
            silent_after: None,
            tamper_authenticator: false,
            final_status: STATUS_COMPLETE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    KeySent,
    ChallengeSent,
    AuthenticatorSent,
    AuthorizationIdSent,
    Done,
}

/// A lock in pairing mode.
pub struct SimulatedLock {
    config: AuthConfig,
    behaviour: LockBehaviour,
    rng: Box<dyn SecureRng>,
    reassembler: Reassembler,
    stage: Stage,
    silent: bool,
    key_pair: Option<EphemeralKeyPair>,
    controller_public_key: Vec<u8>,
    shared_secret: Option<SharedSecret>,
    challenge: [u8; NONCE_LEN],
    lock_nonce: [u8; NONCE_LEN],
    controller_nonce: [u8; NONCE_LEN],
    grant_nonce: [u8; NONCE_LEN],
    client_name: Option<[u8; 32]>,
    paired_id: Option<u32>,
    outbox: VecDeque<Vec<u8>>,
}

impl SimulatedLock {
    /// Lock sharing the controller's curve and framing.
    pub fn new(config: &AuthConfig, behaviour: LockBehaviour) -> Self {
        let layout = MessageLayout::new(config.curve, &config.framing);
        Self {
            config: config.clone(),
            behaviour,
            rng: os_rng(),
            // Controller writes arrive whole.
            reassembler: Reassembler::new(layout, Direction::ToLock, usize::MAX),
            stage: Stage::Idle,
            silent: false,
            key_pair: None,
            controller_public_key: Vec::new(),
            shared_secret: None,
            challenge: [0; NONCE_LEN],
            lock_nonce: [0; NONCE_LEN],
            controller_nonce: [0; NONCE_LEN],
            grant_nonce: [0; NONCE_LEN],
            client_name: None,
            paired_id: None,
            outbox: VecDeque::new(),
        }
    }

    /// Authorization id of a completed pairing.
    pub fn paired_authorization_id(&self) -> Option<u32> {
        self.paired_id
    }

    /// Name the controller announced, trailing zero padding removed.
    pub fn client_name(&self) -> Option<String> {
        self.client_name.map(|name| {
            let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
            String::from_utf8_lossy(&name[..end]).into_owned()
        })
    }

    /// Shared secret the lock derived.
    pub fn shared_secret(&self) -> Option<&SharedSecret> {
        self.shared_secret.as_ref()
    }

    /// Next notification fragment for the controller.
    pub fn poll_notification(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop_front()
    }

    /// Process one frame written by the controller.
    ///
    /// Protocol violations are answered with an `ErrorReport`; they are
    /// returned as errors as well so tests can assert on them.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<()> {
        if self.silent {
            return Ok(());
        }

        let message = match self.reassembler.feed(frame) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(e) => {
                let code = match e {
                    Error::UnexpectedFragment(FragmentFault::ChecksumMismatch) => PeerError::BadCrc,
                    _ => PeerError::BadLength,
                };
                let command = if frame.len() >= 2 { read_u16_le(frame) } else { 0 };
                self.report(code, command);
                return Err(e);
            }
        };

        let command = message.command;
        if self.behaviour.silent_after == Some(command) {
            tracing::debug!(?command, "Simulated lock going silent");
            self.silent = true;
            return Ok(());
        }

        let result = self.respond(message);
        if let Err(e) = &result {
            let code = match e {
                Error::AuthenticatorMismatch => PeerError::BadAuthenticator,
                Error::UnexpectedMessage(_) => PeerError::Unknown,
                _ => PeerError::BadParameter,
            };
            self.report(code, command.to_u16());
            self.stage = Stage::Idle;
        }
        result
    }

    fn respond(&mut self, message: CompleteMessage) -> Result<()> {
        let payload = message.payload;
        match (self.stage, message.command) {
            (Stage::Idle, Command::RequestData) => {
                if read_u16_le(&payload) != Command::PublicKey.to_u16() {
                    return Err(Error::InvalidMessage("unsupported request".into()));
                }
                let key_pair = EphemeralKeyPair::generate(self.config.curve, self.rng.as_mut())?;
                let public_key = key_pair.public_key().to_vec();
                self.key_pair = Some(key_pair);
                self.send(Command::PublicKey, &public_key);
                self.stage = Stage::KeySent;
            }
            (Stage::KeySent, Command::PublicKey) => {
                let key_pair = self.key_pair.as_ref().ok_or(Error::InvalidState)?;
                self.shared_secret = Some(key_pair.derive_shared_secret(&payload)?);
                self.controller_public_key = payload;
                self.challenge = random_array(self.rng.as_mut())?;
                let challenge = self.challenge;
                self.send(Command::Challenge, &challenge);
                self.stage = Stage::ChallengeSent;
            }
            (Stage::ChallengeSent, Command::AuthorizationAuthenticator) => {
                let lock_key = self.lock_public_key()?;
                let secret = self.secret()?;
                let verified = verify_authenticator(
                    secret,
                    &[&self.controller_public_key, &lock_key, &self.challenge],
                    &payload,
                );
                if !verified {
                    return Err(Error::AuthenticatorMismatch);
                }

                let nonce = random_array(self.rng.as_mut())?;
                let secret = self.secret()?;
                let mut tag = compute_authenticator(
                    secret,
                    &[&lock_key, &self.controller_public_key, &nonce],
                )?;
                if self.behaviour.tamper_authenticator {
                    tag[0] ^= 0x01;
                }
                self.lock_nonce = nonce;
                let reply = PeerAuthenticator { tag, nonce }.encode();
                self.send(Command::AuthorizationAuthenticator, &reply);
                self.stage = Stage::AuthenticatorSent;
            }
            (Stage::AuthenticatorSent, Command::AuthorizationData) => {
                let secret = self.secret()?;
                let plain = open_payload(
                    secret,
                    Command::AuthorizationData,
                    &payload,
                    self.config.framing.encrypted_authorization,
                )?;
                let data = AuthorizationData::decode(&plain)?;
                let verified = verify_authenticator(
                    secret,
                    &[
                        &[data.id_type.to_u8()],
                        &data.app_id.to_le_bytes(),
                        &data.name,
                        &data.nonce,
                        &self.lock_nonce,
                    ],
                    &data.tag,
                );
                if !verified {
                    return Err(Error::AuthenticatorMismatch);
                }
                self.controller_nonce = data.nonce;
                self.client_name = Some(data.name);

                self.grant_nonce = random_array(self.rng.as_mut())?;
                let secret = self.shared_secret.as_ref().ok_or(Error::InvalidState)?;
                let authorization_id = self.behaviour.authorization_id;
                let uuid = self.behaviour.uuid;
                let tag = compute_authenticator(
                    secret,
                    &[
                        &authorization_id.to_le_bytes(),
                        &uuid,
                        &self.grant_nonce,
                        &self.controller_nonce,
                    ],
                )?;
                let grant = AuthorizationGrant {
                    tag,
                    authorization_id,
                    uuid,
                    nonce: self.grant_nonce,
                };
                let sealed = seal_payload(
                    secret,
                    self.rng.as_mut(),
                    Command::AuthorizationId,
                    &grant.encode(),
                    self.config.framing.encrypted_authorization,
                )?;
                self.send(Command::AuthorizationId, &sealed);
                self.stage = Stage::AuthorizationIdSent;
            }
            (Stage::AuthorizationIdSent, Command::AuthorizationIdConfirmation) => {
                let secret = self.secret()?;
                let plain = open_payload(
                    secret,
                    Command::AuthorizationIdConfirmation,
                    &payload,
                    self.config.framing.encrypted_authorization,
                )?;
                let confirmation = AuthorizationConfirmation::decode(&plain)?;
                let verified = confirmation.authorization_id == self.behaviour.authorization_id
                    && verify_authenticator(
                        secret,
                        &[
                            &confirmation.authorization_id.to_le_bytes(),
                            &self.grant_nonce,
                        ],
                        &confirmation.tag,
                    );
                if !verified {
                    return Err(Error::AuthenticatorMismatch);
                }

                let status = self.behaviour.final_status;
                if status == STATUS_COMPLETE {
                    self.paired_id = Some(confirmation.authorization_id);
                }
                self.send(Command::Status, &[status]);
                self.stage = Stage::Done;
            }
            (_, command) => return Err(Error::UnexpectedMessage(command)),
        }
        Ok(())
    }

    fn lock_public_key(&self) -> Result<Vec<u8>> {
        self.key_pair
            .as_ref()
            .map(|k| k.public_key().to_vec())
            .ok_or(Error::InvalidState)
    }

    fn secret(&self) -> Result<&SharedSecret> {
        self.shared_secret.as_ref().ok_or(Error::InvalidState)
    }

    fn send(&mut self, command: Command, payload: &[u8]) {
        let frame = encode_frame(command, payload, self.config.framing.checksum);
        self.outbox
            .extend(fragment(&frame, self.config.framing.fragment_size));
    }

    fn report(&mut self, code: PeerError, command: u16) {
        tracing::debug!(?code, command, "Simulated lock reporting error");
        let report = ErrorReport {
            code: code.to_u8(),
            command,
        };
        self.send(Command::ErrorReport, &report.encode());
    }
}
