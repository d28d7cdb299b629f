//! X25519 key agreement (RFC 7748).
//!
//! The default curve for lock pairing. Private scalars are held in
//! `Zeroizing<StaticSecret>` so they are cleared when the key pair is dropped
//! or replaced on a handshake retry.

use crate::random::{random_array, SecureRng};
use crate::{Error, Result};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// X25519 key pair.
pub struct X25519KeyPair {
    private_key: Zeroizing<StaticSecret>,
    public_key: PublicKey,
}

impl X25519KeyPair {
    /// Generate a key pair from the operating system RNG.
    pub fn generate() -> Result<Self> {
        Self::generate_with(&mut rand::rngs::OsRng)
    }

    /// Generate a key pair from `rng`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RandomSourceUnavailable` if `rng` cannot produce the
    /// 32 scalar bytes.
    pub fn generate_with(rng: &mut dyn SecureRng) -> Result<Self> {
        let scalar = Zeroizing::new(random_array::<32>(rng)?);
        Self::from_private(*scalar)
    }

    /// Restore a key pair from a raw 32-byte private scalar.
    pub fn from_private(private: [u8; 32]) -> Result<Self> {
        let private_key = StaticSecret::from(private);
        let public_key = PublicKey::from(&private_key);

        Ok(Self {
            private_key: Zeroizing::new(private_key),
            public_key,
        })
    }

    /// Public key bytes.
    pub fn public_key(&self) -> &[u8; 32] {
        self.public_key.as_bytes()
    }

    /// Private scalar bytes, for persistence.
    pub fn private_key(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.private_key.to_bytes())
    }

    /// Raw X25519 output with `peer_public`.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyExchange` for low-order peer points (all-zero output).
    pub fn exchange(&self, peer_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
        let peer_key = PublicKey::from(*peer_public);
        let shared = self.private_key.diffie_hellman(&peer_key);

        if !shared.was_contributory() {
            return Err(Error::KeyExchange(
                "Invalid peer public key (low-order point)".into(),
            ));
        }

        Ok(Zeroizing::new(*shared.as_bytes()))
    }
}
