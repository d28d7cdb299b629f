//! Pairing states and the transition table.
//!
//! [`transition`] is a pure function of `(state, event)`; the side effect it
//! names is performed by the [`PairingAuthenticator`](crate::PairingAuthenticator).
//! A state names the step about to run, so transient states advance on
//! [`Event::Proceed`] once their action has completed and awaiting states
//! advance on the peer message they wait for.

use crate::command::Command;
use crate::error::ErrorCode;

/// Authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    /// No pairing in progress and none restored.
    Unauthenticated,
    /// Public key requested, awaiting the lock key.
    RequestPublicKey,
    /// Generating the local key pair and shared secret.
    GenerateKeyPair,
    /// Sending the local public key.
    SendPublicKey,
    /// Awaiting the lock challenge.
    ReadChallenge,
    /// Sending the controller authenticator.
    ComputeAndSendAuthenticator,
    /// Awaiting the lock authenticator.
    ReadPeerAuthenticator,
    /// Sending the authorization data.
    AuthenticateData,
    /// Awaiting the assigned authorization id.
    AwaitAuthorizationId,
    /// Sending the authorization id confirmation.
    ConfirmAuthorizationId,
    /// Awaiting the final status.
    AwaitStatus,
    /// Paired; session keys usable.
    Authenticated,
    /// Handshake failed; see `error()`.
    Error,
}

impl AuthState {
    /// States in success-path order.
    pub const HANDSHAKE: [AuthState; 11] = [
        AuthState::RequestPublicKey,
        AuthState::GenerateKeyPair,
        AuthState::SendPublicKey,
        AuthState::ReadChallenge,
        AuthState::ComputeAndSendAuthenticator,
        AuthState::ReadPeerAuthenticator,
        AuthState::AuthenticateData,
        AuthState::AwaitAuthorizationId,
        AuthState::ConfirmAuthorizationId,
        AuthState::AwaitStatus,
        AuthState::Authenticated,
    ];

    /// Whether no handshake is running.
    pub fn is_at_rest(self) -> bool {
        matches!(
            self,
            AuthState::Unauthenticated | AuthState::Authenticated | AuthState::Error
        )
    }

    /// Whether the state waits for a peer message under a deadline.
    pub fn is_awaiting(self) -> bool {
        self.expected_command().is_some()
    }

    /// Whether the state completes on its own.
    pub fn is_transient(self) -> bool {
        !self.is_at_rest() && !self.is_awaiting()
    }

    /// Peer message an awaiting state expects.
    pub fn expected_command(self) -> Option<Command> {
        match self {
            AuthState::RequestPublicKey => Some(Command::PublicKey),
            AuthState::ReadChallenge => Some(Command::Challenge),
            AuthState::ReadPeerAuthenticator => Some(Command::AuthorizationAuthenticator),
            AuthState::AwaitAuthorizationId => Some(Command::AuthorizationId),
            AuthState::AwaitStatus => Some(Command::Status),
            _ => None,
        }
    }
}

/// Input to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Host asked to start a handshake.
    Start,
    /// A complete peer message arrived.
    Received(Command),
    /// The current transient step finished.
    Proceed,
    /// The awaiting deadline passed.
    Timeout,
    /// The transport could not write a frame.
    WriteFailed,
    /// Host reset (`clear_settings`).
    Reset,
}

/// Side effect of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Wipe handshake material and request the lock public key.
    RequestPublicKey,
    /// Store the lock public key.
    AcceptPeerPublicKey,
    /// Generate the local key pair and derive the shared secret.
    GenerateKeyPair,
    /// Send the local public key.
    SendPublicKey,
    /// Store the lock challenge nonce.
    AcceptChallenge,
    /// Send the controller authenticator.
    SendAuthenticator,
    /// Verify the lock authenticator.
    VerifyPeerAuthenticator,
    /// Send the authorization data under a fresh nonce.
    SendAuthorizationData,
    /// Open and verify the assigned authorization id.
    AcceptAuthorizationId,
    /// Send the authorization id confirmation.
    SendAuthorizationIdConfirmation,
    /// Check the final status and persist credentials.
    EvaluateStatus,
    /// Abort the handshake with an error.
    Fail(ErrorCode),
    /// Nothing to do.
    Ignore,
    /// Refuse the event; the caller gets an error.
    Reject,
    /// Wipe all key material and return to `Unauthenticated`.
    Wipe,
}

/// Result of [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State entered when the action succeeds.
    pub next: AuthState,
    /// Side effect to perform.
    pub action: Action,
}

impl Transition {
    fn to(next: AuthState, action: Action) -> Self {
        Self { next, action }
    }

    fn stay(state: AuthState, action: Action) -> Self {
        Self::to(state, action)
    }

    fn fail(code: ErrorCode) -> Self {
        Self::to(AuthState::Error, Action::Fail(code))
    }
}

/// Look up the transition for `event` in `state`.
///
/// ```
/// use keyturn_core::command::Command;
/// use keyturn_core::state::{transition, Action, AuthState, Event};
///
/// let t = transition(AuthState::ReadChallenge, Event::Received(Command::Challenge));
/// assert_eq!(t.next, AuthState::ComputeAndSendAuthenticator);
/// assert_eq!(t.action, Action::AcceptChallenge);
/// ```
pub fn transition(state: AuthState, event: Event) -> Transition {
    use AuthState as S;

    match event {
        Event::Reset => Transition::to(S::Unauthenticated, Action::Wipe),

        Event::Start if state == S::Unauthenticated => {
            Transition::to(S::RequestPublicKey, Action::RequestPublicKey)
        }
        Event::Start => Transition::stay(state, Action::Reject),

        Event::Timeout if state.is_awaiting() => Transition::fail(ErrorCode::Timeout),
        Event::Timeout => Transition::stay(state, Action::Ignore),

        Event::WriteFailed if state.is_at_rest() => Transition::stay(state, Action::Ignore),
        Event::WriteFailed => Transition::fail(ErrorCode::Timeout),

        Event::Proceed => match state {
            S::GenerateKeyPair => Transition::to(S::SendPublicKey, Action::GenerateKeyPair),
            S::SendPublicKey => Transition::to(S::ReadChallenge, Action::SendPublicKey),
            S::ComputeAndSendAuthenticator => {
                Transition::to(S::ReadPeerAuthenticator, Action::SendAuthenticator)
            }
            S::AuthenticateData => {
                Transition::to(S::AwaitAuthorizationId, Action::SendAuthorizationData)
            }
            S::ConfirmAuthorizationId => {
                Transition::to(S::AwaitStatus, Action::SendAuthorizationIdConfirmation)
            }
            _ => Transition::stay(state, Action::Ignore),
        },

        Event::Received(_) if state.is_at_rest() => Transition::stay(state, Action::Ignore),
        Event::Received(Command::ErrorReport) => Transition::fail(ErrorCode::PeerRejected),
        Event::Received(command) => match (state, command) {
            (S::RequestPublicKey, Command::PublicKey) => {
                Transition::to(S::GenerateKeyPair, Action::AcceptPeerPublicKey)
            }
            (S::ReadChallenge, Command::Challenge) => {
                Transition::to(S::ComputeAndSendAuthenticator, Action::AcceptChallenge)
            }
            (S::ReadPeerAuthenticator, Command::AuthorizationAuthenticator) => {
                Transition::to(S::AuthenticateData, Action::VerifyPeerAuthenticator)
            }
            (S::AwaitAuthorizationId, Command::AuthorizationId) => {
                Transition::to(S::ConfirmAuthorizationId, Action::AcceptAuthorizationId)
            }
            (S::AwaitStatus, Command::Status) => {
                Transition::to(S::Authenticated, Action::EvaluateStatus)
            }
            _ => Transition::fail(ErrorCode::UnexpectedMessage),
        },
    }
}
