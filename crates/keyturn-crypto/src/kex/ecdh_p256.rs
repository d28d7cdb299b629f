//! ECDH over NIST P-256.
//!
//! Public keys travel in uncompressed SEC1 form (`0x04 || x || y`, 65 bytes).
//! The shared secret is the 32-byte x-coordinate of the agreed point.

use crate::random::{random_array, SecureRng};
use crate::{Error, Result};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, PublicKey, SecretKey};
use zeroize::Zeroizing;

/// Attempts at drawing a valid scalar before giving up.
const SCALAR_ATTEMPTS: usize = 4;

/// ECDH-P256 key pair.
pub struct EcdhP256KeyPair {
    secret_key: SecretKey,
    public_key_bytes: Vec<u8>,
}

impl EcdhP256KeyPair {
    /// Generate a key pair from the operating system RNG.
    pub fn generate() -> Result<Self> {
        Self::generate_with(&mut rand::rngs::OsRng)
    }

    /// Generate a key pair from `rng`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RandomSourceUnavailable` if `rng` fails, or
    /// `Error::KeyExchange` if no valid scalar was drawn.
    pub fn generate_with(rng: &mut dyn SecureRng) -> Result<Self> {
        for _ in 0..SCALAR_ATTEMPTS {
            let candidate = Zeroizing::new(random_array::<32>(rng)?);
            if let Ok(keypair) = Self::from_private(&*candidate) {
                return Ok(keypair);
            }
        }
        Err(Error::KeyExchange(
            "Could not draw a valid P-256 scalar".into(),
        ))
    }

    /// Restore a key pair from a 32-byte big-endian private scalar.
    pub fn from_private(private_key: &[u8]) -> Result<Self> {
        if private_key.len() != 32 {
            return Err(Error::InvalidKeyLength(format!(
                "P-256 private key must be 32 bytes, got {}",
                private_key.len()
            )));
        }

        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey("Invalid P-256 private key".into()))?;
        let public_key_bytes = secret_key
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();

        Ok(Self {
            secret_key,
            public_key_bytes,
        })
    }

    /// Uncompressed public key (65 bytes).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Private scalar bytes, for persistence.
    pub fn private_key(&self) -> Zeroizing<[u8; 32]> {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(self.secret_key.to_bytes().as_slice());
        Zeroizing::new(bytes)
    }

    /// Raw ECDH output with an uncompressed peer public key.
    ///
    /// # Errors
    ///
    /// Rejects keys of the wrong length, compressed encodings and points not
    /// on the curve.
    pub fn exchange(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        if peer_public.len() != 65 {
            return Err(Error::InvalidKeyLength(format!(
                "P-256 public key must be 65 bytes (uncompressed), got {}",
                peer_public.len()
            )));
        }
        if peer_public[0] != 0x04 {
            return Err(Error::InvalidPublicKey(
                "P-256 public key must use uncompressed format (0x04 prefix)".into(),
            ));
        }

        let encoded = EncodedPoint::from_bytes(peer_public)
            .map_err(|_| Error::InvalidPublicKey("Failed to parse P-256 public key".into()))?;
        let peer_key = Option::<PublicKey>::from(PublicKey::from_encoded_point(&encoded))
            .ok_or_else(|| Error::InvalidPublicKey("Invalid P-256 public key point".into()))?;

        let shared = diffie_hellman(self.secret_key.to_nonzero_scalar(), peer_key.as_affine());

        let mut result = [0u8; 32];
        result.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(Zeroizing::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_commutes() {
        let alice = EcdhP256KeyPair::generate().unwrap();
        let bob = EcdhP256KeyPair::generate().unwrap();
        assert_eq!(
            *alice.exchange(bob.public_key()).unwrap(),
            *bob.exchange(alice.public_key()).unwrap()
        );
    }

    #[test]
    fn test_uncompressed_encoding() {
        let kp = EcdhP256KeyPair::generate().unwrap();
        assert_eq!(kp.public_key().len(), 65);
        assert_eq!(kp.public_key()[0], 0x04);
    }

    #[test]
    fn test_from_private_is_deterministic() {
        let a = EcdhP256KeyPair::from_private(&[0x42; 32]).unwrap();
        let b = EcdhP256KeyPair::from_private(&[0x42; 32]).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(*a.private_key(), [0x42; 32]);
    }

    #[test]
    fn test_rejects_bad_peer_keys() {
        let kp = EcdhP256KeyPair::generate().unwrap();
        assert!(kp.exchange(&[0x04; 64]).is_err());

        let mut compressed = vec![0x02; 65];
        compressed[1] = 0x01;
        assert!(kp.exchange(&compressed).is_err());

        // On-curve check: x = y = 1 is not a P-256 point.
        let mut off_curve = vec![0u8; 65];
        off_curve[0] = 0x04;
        off_curve[32] = 1;
        off_curve[64] = 1;
        assert!(kp.exchange(&off_curve).is_err());
    }

    #[test]
    fn test_rejects_zero_scalar() {
        assert!(EcdhP256KeyPair::from_private(&[0u8; 32]).is_err());
        assert!(EcdhP256KeyPair::from_private(&[1u8; 31]).is_err());
    }
}
