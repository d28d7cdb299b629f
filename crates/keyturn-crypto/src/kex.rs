//! Key agreement.
//!
//! Implements:
//! - X25519 (RFC 7748), the default pairing curve
//! - ECDH-P256 (NIST SP 800-56A), for peripherals that require it
//!
//! The curve is a parameter of the session, not of the handshake ordering:
//! both curves produce a 32-byte raw secret that is fed through
//! [`crate::kdf::derive_shared_secret`].

pub mod ecdh_p256;
pub mod x25519;

pub use self::ecdh_p256::EcdhP256KeyPair;
pub use self::x25519::X25519KeyPair;

use crate::kdf::{derive_shared_secret, SharedSecret};
use crate::random::SecureRng;
use crate::Result;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Elliptic curve used for the pairing key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    /// Curve25519, 32-byte public keys.
    #[default]
    X25519,
    /// NIST P-256, 65-byte uncompressed SEC1 public keys.
    P256,
}

impl Curve {
    /// Length of an encoded public key on this curve.
    pub fn public_key_len(self) -> usize {
        match self {
            Curve::X25519 => 32,
            Curve::P256 => 65,
        }
    }
}

/// Ephemeral key pair on one of the supported curves.
///
/// Private key bytes are zeroed on drop by the wrapped key types.
pub enum EphemeralKeyPair {
    /// X25519 key pair.
    X25519(X25519KeyPair),
    /// ECDH-P256 key pair.
    P256(EcdhP256KeyPair),
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair on `curve`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RandomSourceUnavailable` if `rng` fails.
    pub fn generate(curve: Curve, rng: &mut dyn SecureRng) -> Result<Self> {
        Ok(match curve {
            Curve::X25519 => Self::X25519(X25519KeyPair::generate_with(rng)?),
            Curve::P256 => Self::P256(EcdhP256KeyPair::generate_with(rng)?),
        })
    }

    /// Restore a key pair from stored private key bytes.
    pub fn from_private(curve: Curve, private_key: &[u8]) -> Result<Self> {
        Ok(match curve {
            Curve::X25519 => {
                let bytes: [u8; 32] = private_key.try_into().map_err(|_| {
                    crate::Error::InvalidKeyLength(format!(
                        "X25519 private key must be 32 bytes, got {}",
                        private_key.len()
                    ))
                })?;
                Self::X25519(X25519KeyPair::from_private(bytes)?)
            }
            Curve::P256 => Self::P256(EcdhP256KeyPair::from_private(private_key)?),
        })
    }

    /// Curve of this key pair.
    pub fn curve(&self) -> Curve {
        match self {
            Self::X25519(_) => Curve::X25519,
            Self::P256(_) => Curve::P256,
        }
    }

    /// Encoded public key.
    pub fn public_key(&self) -> &[u8] {
        match self {
            Self::X25519(kp) => kp.public_key(),
            Self::P256(kp) => kp.public_key(),
        }
    }

    /// Private key bytes, for persistence.
    pub fn private_key(&self) -> Zeroizing<Vec<u8>> {
        match self {
            Self::X25519(kp) => Zeroizing::new(kp.private_key().to_vec()),
            Self::P256(kp) => Zeroizing::new(kp.private_key().to_vec()),
        }
    }

    /// Raw ECDH output with the peer's public key.
    pub fn diffie_hellman(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        match self {
            Self::X25519(kp) => {
                let peer: [u8; 32] = peer_public.try_into().map_err(|_| {
                    crate::Error::InvalidKeyLength(format!(
                        "X25519 public key must be 32 bytes, got {}",
                        peer_public.len()
                    ))
                })?;
                kp.exchange(&peer)
            }
            Self::P256(kp) => kp.exchange(peer_public),
        }
    }

    /// Derive the pairing [`SharedSecret`] with the peer's public key.
    ///
    /// # Example
    ///
    /// ```
    /// use keyturn_crypto::kex::{Curve, EphemeralKeyPair};
    /// use keyturn_crypto::random::os_rng;
    ///
    /// let mut rng = os_rng();
    /// let controller = EphemeralKeyPair::generate(Curve::X25519, rng.as_mut()).unwrap();
    /// let lock = EphemeralKeyPair::generate(Curve::X25519, rng.as_mut()).unwrap();
    ///
    /// let a = controller.derive_shared_secret(lock.public_key()).unwrap();
    /// let b = lock.derive_shared_secret(controller.public_key()).unwrap();
    /// assert_eq!(a.as_bytes(), b.as_bytes());
    /// ```
    pub fn derive_shared_secret(&self, peer_public: &[u8]) -> Result<SharedSecret> {
        let raw = self.diffie_hellman(peer_public)?;
        derive_shared_secret(&*raw)
    }
}

impl core::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("curve", &self.curve())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
