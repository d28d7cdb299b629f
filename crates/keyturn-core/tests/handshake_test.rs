//! End-to-end pairing against the simulated lock.

use keyturn_core::command::STATUS_COMPLETE;
use keyturn_core::peer::{LockBehaviour, SimulatedLock};
use keyturn_core::{AuthConfig, AuthEvent, AuthState, Command, Error, ErrorCode, PairingAuthenticator};
use keyturn_crypto::aead::SESSION_NONCE_LEN;
use keyturn_crypto::Curve;
use keyturn_store::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, PeerIdentity, StoredCredentials,
};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn peer() -> PeerIdentity {
    PeerIdentity::new("00:1A:7D:DA:71:13", "54:D2:72:AB:CD:EF")
}

/// Exchange frames until both sides are quiet, delivering at most
/// `max_frames` controller frames to the lock.
fn pump<S: CredentialStore>(
    auth: &mut PairingAuthenticator<S>,
    lock: &mut SimulatedLock,
    now: Instant,
    max_frames: usize,
) -> usize {
    let mut delivered = 0;
    loop {
        let mut progressed = false;
        while delivered < max_frames {
            let Some(frame) = auth.poll_transmit() else {
                break;
            };
            let _ = lock.handle_frame(&frame);
            delivered += 1;
            progressed = true;
        }
        while let Some(notification) = lock.poll_notification() {
            auth.handle_notification(&notification, now);
            progressed = true;
        }
        if !progressed {
            return delivered;
        }
    }
}

fn events<S: CredentialStore>(auth: &mut PairingAuthenticator<S>) -> Vec<AuthEvent> {
    std::iter::from_fn(|| auth.poll_event()).collect()
}

fn pair(
    config: AuthConfig,
    behaviour: LockBehaviour,
) -> (
    PairingAuthenticator<MemoryCredentialStore>,
    SimulatedLock,
    MemoryCredentialStore,
) {
    let store = MemoryCredentialStore::new();
    let mut lock = SimulatedLock::new(&config, behaviour);
    let mut auth = PairingAuthenticator::new(config, peer(), store.clone()).unwrap();
    let now = Instant::now();
    auth.start_authentication_process(now).unwrap();
    pump(&mut auth, &mut lock, now, usize::MAX);
    (auth, lock, store)
}

#[test]
fn test_happy_path_every_curve_and_framing() {
    for curve in [Curve::X25519, Curve::P256] {
        for encrypted in [true, false] {
            let mut config = AuthConfig::default();
            config.curve = curve;
            config.framing.encrypted_authorization = encrypted;
            config.framing.checksum = encrypted;
            config.client.name = "Front door app".into();

            let behaviour = LockBehaviour {
                authorization_id: 0x0102_0304,
                ..Default::default()
            };
            let (mut auth, lock, store) = pair(config, behaviour);

            assert_eq!(auth.state(), AuthState::Authenticated, "{:?}/{}", curve, encrypted);
            assert!(auth.is_valid());
            assert_eq!(auth.error(), None);
            assert_eq!(auth.authorization_id(), Some(0x0102_0304));
            assert_eq!(auth.authorization_id(), lock.paired_authorization_id());
            assert_eq!(
                auth.authorization_id_raw_data(),
                Some(&[0x04, 0x03, 0x02, 0x01][..])
            );
            assert_eq!(lock.client_name().as_deref(), Some("Front door app"));
            assert_eq!(
                auth.shared_secret().unwrap().as_bytes(),
                lock.shared_secret().unwrap().as_bytes()
            );

            let stored = store.load(&peer()).unwrap().unwrap();
            assert_eq!(stored.authorization.id, 0x0102_0304);
            assert_eq!(stored.curve, curve);
            assert_eq!(stored.peer_uuid, Some([0x4B; 16]));

            let mut expected: Vec<AuthEvent> = AuthState::HANDSHAKE
                .iter()
                .map(|&s| AuthEvent::StateChanged(s))
                .collect();
            expected.push(AuthEvent::Finished(true));
            assert_eq!(events(&mut auth), expected);
        }
    }
}

#[test]
fn test_happy_path_across_fragment_sizes() {
    for fragment_size in [2, 7, 20, 64, 512] {
        let mut config = AuthConfig::default();
        config.framing.fragment_size = fragment_size;
        let (auth, lock, _) = pair(config, LockBehaviour::default());
        assert!(auth.is_valid(), "fragment size {}", fragment_size);
        assert_eq!(auth.authorization_id(), lock.paired_authorization_id());
    }
}

#[test]
fn test_silent_lock_times_out_at_deadline() {
    let config = AuthConfig {
        response_timeout_ms: 1500,
        ..Default::default()
    };
    let behaviour = LockBehaviour {
        silent_after: Some(Command::RequestData),
        ..Default::default()
    };
    let mut lock = SimulatedLock::new(&config, behaviour);
    let store = MemoryCredentialStore::new();
    let mut auth = PairingAuthenticator::new(config, peer(), store.clone()).unwrap();

    let start = Instant::now();
    auth.start_authentication_process(start).unwrap();
    pump(&mut auth, &mut lock, start, usize::MAX);
    assert_eq!(auth.state(), AuthState::RequestPublicKey);

    let deadline = auth.poll_timeout().unwrap();
    assert_eq!(deadline, start + Duration::from_millis(1500));
    auth.handle_timeout(deadline);

    assert_eq!(auth.state(), AuthState::Error);
    assert_eq!(auth.error(), Some(ErrorCode::Timeout));
    let emitted = events(&mut auth);
    assert!(emitted.contains(&AuthEvent::ErrorOccurred(ErrorCode::Timeout)));
    assert_eq!(emitted.last(), Some(&AuthEvent::Finished(false)));
    assert!(store.is_empty());
}

#[test]
fn test_tampered_lock_authenticator_fails() {
    let behaviour = LockBehaviour {
        tamper_authenticator: true,
        ..Default::default()
    };
    let (mut auth, lock, store) = pair(AuthConfig::default(), behaviour);

    assert_eq!(auth.state(), AuthState::Error);
    assert_eq!(auth.error(), Some(ErrorCode::AuthenticatorMismatch));
    assert!(!auth.is_valid());
    assert!(matches!(auth.shared_secret(), Err(Error::SessionNotEstablished)));
    assert_eq!(lock.paired_authorization_id(), None);
    assert!(store.is_empty());
    assert_eq!(events(&mut auth).last(), Some(&AuthEvent::Finished(false)));
}

#[test]
fn test_rejecting_status_fails_without_persisting() {
    let behaviour = LockBehaviour {
        final_status: 0x13,
        ..Default::default()
    };
    let (mut auth, _, store) = pair(AuthConfig::default(), behaviour);

    assert_eq!(auth.error(), Some(ErrorCode::PeerRejected));
    assert_eq!(auth.peer_error(), Some(0x13));
    assert!(events(&mut auth).contains(&AuthEvent::ErrorOccurred(ErrorCode::PeerRejected)));
    assert!(!auth.is_valid());
    assert!(store.is_empty());
}

#[test]
fn test_clear_settings_at_every_stage() {
    // Delivering n controller frames stops the handshake in a different
    // awaiting state each time; n = 5 completes it.
    let mut seen = HashSet::new();
    for max_frames in 0..=5 {
        let config = AuthConfig::default();
        let store = MemoryCredentialStore::new();
        let mut lock = SimulatedLock::new(&config, LockBehaviour::default());
        let mut auth = PairingAuthenticator::new(config, peer(), store.clone()).unwrap();
        let now = Instant::now();
        auth.start_authentication_process(now).unwrap();
        pump(&mut auth, &mut lock, now, max_frames);
        seen.insert(auth.state());

        auth.clear_settings(now).unwrap();
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(!auth.is_valid());
        assert_eq!(auth.authorization_id(), None);
        assert_eq!(auth.poll_timeout(), None);
        assert!(store.is_empty());
    }
    assert_eq!(seen.len(), 6);
    assert!(seen.contains(&AuthState::AwaitStatus));
    assert!(seen.contains(&AuthState::Authenticated));
}

#[test]
fn test_session_encryption_roundtrip() {
    let (mut auth, _, _) = pair(AuthConfig::default(), LockBehaviour::default());

    for len in [0usize, 1, 16, 255, 1024] {
        let nonce = auth.generate_nonce(SESSION_NONCE_LEN).unwrap();
        let plaintext: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
        let ciphertext = auth.encrypt_data(&plaintext, &nonce).unwrap();
        assert_eq!(&auth.decrypt_data(&ciphertext, &nonce).unwrap()[..], &plaintext[..]);
    }

    let nonce = auth.generate_nonce(SESSION_NONCE_LEN).unwrap();
    let mut ciphertext = auth.encrypt_data(b"unlock", &nonce).unwrap();
    ciphertext[0] ^= 0x80;
    assert!(auth.decrypt_data(&ciphertext, &nonce).is_err());
}

#[test]
fn test_generate_nonce_never_repeats() {
    let mut auth =
        PairingAuthenticator::new(AuthConfig::default(), peer(), MemoryCredentialStore::new())
            .unwrap();
    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        assert!(seen.insert(auth.generate_nonce(32).unwrap()));
    }
}

#[test]
fn test_restored_session_shares_keys() {
    let (original, _, store) = pair(AuthConfig::default(), LockBehaviour::default());

    let restored =
        PairingAuthenticator::new(AuthConfig::default(), peer(), store.clone()).unwrap();
    assert_eq!(restored.state(), AuthState::Authenticated);
    assert!(restored.is_valid());
    assert_eq!(restored.authorization_id(), original.authorization_id());

    let nonce = [0x24; SESSION_NONCE_LEN];
    let ciphertext = restored.encrypt_data(b"lock", &nonce).unwrap();
    assert_eq!(&original.decrypt_data(&ciphertext, &nonce).unwrap()[..], b"lock");
}

#[test]
fn test_repairing_requires_clear_settings() {
    let (mut auth, _, store) = pair(AuthConfig::default(), LockBehaviour::default());
    let first_id = auth.authorization_id();
    events(&mut auth);

    // A paired session refuses to start over on its own.
    let now = Instant::now();
    assert!(matches!(
        auth.start_authentication_process(now),
        Err(Error::ResetRequired)
    ));
    assert!(auth.is_valid());
    assert!(events(&mut auth).is_empty());
    assert_eq!(
        store.load(&peer()).unwrap().map(|c| c.authorization.id),
        first_id
    );

    auth.clear_settings(now).unwrap();
    assert!(store.is_empty());

    let behaviour = LockBehaviour {
        authorization_id: 9,
        ..Default::default()
    };
    let mut lock = SimulatedLock::new(auth.config(), behaviour);
    auth.start_authentication_process(now).unwrap();
    pump(&mut auth, &mut lock, now, usize::MAX);
    assert!(auth.is_valid());
    assert_eq!(auth.authorization_id(), Some(9));
}

#[test]
fn test_retry_after_failure_uses_fresh_keys() {
    let behaviour = LockBehaviour {
        tamper_authenticator: true,
        ..Default::default()
    };
    let (mut auth, _, store) = pair(AuthConfig::default(), behaviour);
    assert_eq!(auth.error(), Some(ErrorCode::AuthenticatorMismatch));

    let now = Instant::now();
    assert!(matches!(
        auth.start_authentication_process(now),
        Err(Error::ResetRequired)
    ));
    auth.clear_settings(now).unwrap();

    let mut lock = SimulatedLock::new(auth.config(), LockBehaviour::default());
    auth.start_authentication_process(now).unwrap();
    pump(&mut auth, &mut lock, now, usize::MAX);
    assert!(auth.is_valid());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_pairing_persists_to_file_store() {
    let dir = TempDir::new().unwrap();

    let config = AuthConfig::default();
    let behaviour = LockBehaviour {
        authorization_id: 42,
        ..Default::default()
    };
    {
        let store = FileCredentialStore::open_sealed(dir.path(), [0x77; 32]).unwrap();
        let mut lock = SimulatedLock::new(&config, behaviour);
        let mut auth = PairingAuthenticator::new(config.clone(), peer(), store).unwrap();
        let now = Instant::now();
        auth.start_authentication_process(now).unwrap();
        pump(&mut auth, &mut lock, now, usize::MAX);
        assert!(auth.is_valid());
    }

    let reopened = FileCredentialStore::open_sealed(dir.path(), [0x77; 32]).unwrap();
    let restored = PairingAuthenticator::new(config, peer(), reopened).unwrap();
    assert!(restored.is_valid());
    assert_eq!(restored.authorization_id(), Some(42));
}

#[test]
fn test_corrupt_record_can_be_cleared_and_repaired() {
    let dir = TempDir::new().unwrap();
    let store = FileCredentialStore::open(dir.path()).unwrap();
    let record = store.record_path(&peer());
    std::fs::write(&record, b"{not json").unwrap();
    assert!(store.load(&peer()).is_err());

    let config = AuthConfig::default();
    let mut auth = PairingAuthenticator::new(config.clone(), peer(), store).unwrap();
    assert_eq!(auth.state(), AuthState::Unauthenticated);
    assert!(!auth.is_valid());

    let now = Instant::now();
    auth.clear_settings(now).unwrap();
    assert!(!record.exists());

    let mut lock = SimulatedLock::new(&config, LockBehaviour::default());
    auth.start_authentication_process(now).unwrap();
    pump(&mut auth, &mut lock, now, usize::MAX);
    assert!(auth.is_valid());

    let reopened = FileCredentialStore::open(dir.path()).unwrap();
    assert!(reopened.load(&peer()).unwrap().is_some());
}

struct ReadOnlyStore;

impl CredentialStore for ReadOnlyStore {
    fn load(&self, _peer: &PeerIdentity) -> keyturn_store::Result<Option<StoredCredentials>> {
        Ok(None)
    }

    fn save(&self, _peer: &PeerIdentity, _credentials: &StoredCredentials) -> keyturn_store::Result<()> {
        Err(keyturn_store::Error::Unavailable("read-only".into()))
    }

    fn clear(&self, _peer: &PeerIdentity) -> keyturn_store::Result<()> {
        Ok(())
    }
}

#[test]
fn test_storage_failure_fails_pairing() {
    let config = AuthConfig::default();
    let mut lock = SimulatedLock::new(&config, LockBehaviour::default());
    let mut auth = PairingAuthenticator::new(config, peer(), ReadOnlyStore).unwrap();
    let now = Instant::now();
    auth.start_authentication_process(now).unwrap();
    pump(&mut auth, &mut lock, now, usize::MAX);

    // The lock completed its side; the controller could not persist.
    assert_eq!(lock.paired_authorization_id(), Some(1));
    assert_eq!(auth.state(), AuthState::Error);
    assert_eq!(auth.error(), Some(ErrorCode::Storage));
    assert!(!auth.is_valid());
}

#[test]
fn test_accepted_status_keeps_waiting() {
    let behaviour = LockBehaviour {
        final_status: keyturn_core::command::STATUS_ACCEPTED,
        ..Default::default()
    };
    let (mut auth, _, store) = pair(AuthConfig::default(), behaviour);
    assert_eq!(auth.state(), AuthState::AwaitStatus);
    assert!(store.is_empty());

    let now = Instant::now();
    let complete = keyturn_core::frame::encode_frame(Command::Status, &[STATUS_COMPLETE], true);
    auth.handle_notification(&complete, now);
    assert!(auth.is_valid());
    assert_eq!(store.len(), 1);
}
