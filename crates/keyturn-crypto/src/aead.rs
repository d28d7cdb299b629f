//! Session encryption (XChaCha20-Poly1305).
//!
//! Once the shared secret is established, handshake payloads and host
//! commands are encrypted with XChaCha20-Poly1305. Its 24-byte nonce is large
//! enough to be drawn at random per message without a counter.
//!
//! A nonce must never be reused for two plaintexts under the same secret;
//! callers draw a fresh one per message.

use crate::kdf::SharedSecret;
use crate::random::{random_array, SecureRng};
use crate::{Error, Result};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use zeroize::Zeroizing;

/// Session nonce length in bytes.
pub const SESSION_NONCE_LEN: usize = 24;

/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Bytes a sealed payload adds on top of its plaintext.
pub const SEAL_OVERHEAD: usize = SESSION_NONCE_LEN + TAG_LEN;

fn session_nonce(nonce: &[u8]) -> Result<&XNonce> {
    if nonce.len() != SESSION_NONCE_LEN {
        return Err(Error::InvalidLength {
            expected: SESSION_NONCE_LEN,
            actual: nonce.len(),
        });
    }
    Ok(XNonce::from_slice(nonce))
}

fn cipher(secret: &SharedSecret) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(secret.as_bytes()))
}

/// Encrypt `plaintext` under `secret` with additional authenticated data.
///
/// Returns `ciphertext || tag`.
pub fn encrypt_with_aad(
    secret: &SharedSecret,
    nonce: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let nonce = session_nonce(nonce)?;
    cipher(secret)
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::Encryption("XChaCha20-Poly1305 encryption failed".into()))
}

/// Decrypt `ciphertext || tag` under `secret` with additional authenticated data.
///
/// # Errors
///
/// Returns `Error::AuthTagMismatch` if the tag does not verify.
pub fn decrypt_with_aad(
    secret: &SharedSecret,
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let nonce = session_nonce(nonce)?;
    cipher(secret)
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| Error::AuthTagMismatch)
}

/// Encrypt `plaintext` under `secret` and a 24-byte `nonce`.
///
/// # Example
///
/// ```
/// use keyturn_crypto::aead::{decrypt, encrypt};
/// use keyturn_crypto::kdf::SharedSecret;
///
/// let secret = SharedSecret::from_bytes([0x42; 32]);
/// let nonce = [0x01; 24];
///
/// let ciphertext = encrypt(&secret, &nonce, b"unlock").unwrap();
/// let plaintext = decrypt(&secret, &nonce, &ciphertext).unwrap();
/// assert_eq!(&plaintext[..], b"unlock");
/// ```
pub fn encrypt(secret: &SharedSecret, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    encrypt_with_aad(secret, nonce, plaintext, &[])
}

/// Decrypt a payload produced by [`encrypt`].
///
/// # Errors
///
/// Returns `Error::AuthTagMismatch` for a wrong secret, wrong nonce or
/// tampered ciphertext, and `Error::InvalidLength` for a malformed nonce.
pub fn decrypt(secret: &SharedSecret, nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    decrypt_with_aad(secret, nonce, ciphertext, &[])
}

/// Encrypt under a freshly drawn nonce and prepend it: `nonce || ciphertext || tag`.
pub fn seal(
    secret: &SharedSecret,
    rng: &mut dyn SecureRng,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let nonce = random_array::<SESSION_NONCE_LEN>(rng)?;
    let ciphertext = encrypt_with_aad(secret, &nonce, plaintext, aad)?;

    let mut sealed = Vec::with_capacity(SESSION_NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a payload produced by [`seal`].
pub fn open(secret: &SharedSecret, sealed: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(Error::InvalidLength {
            expected: SEAL_OVERHEAD,
            actual: sealed.len(),
        });
    }
    let (nonce, ciphertext) = sealed.split_at(SESSION_NONCE_LEN);
    decrypt_with_aad(secret, nonce, ciphertext, aad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{os_rng, UnavailableRng};
    use proptest::prelude::*;

    fn secret() -> SharedSecret {
        SharedSecret::from_bytes([0x42; 32])
    }

    proptest! {
        #[test]
        fn test_roundtrip_any_input(
            key in any::<[u8; 32]>(),
            nonce in any::<[u8; SESSION_NONCE_LEN]>(),
            plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        ) {
            let s = SharedSecret::from_bytes(key);
            let ciphertext = encrypt(&s, &nonce, &plaintext).unwrap();
            prop_assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);
            prop_assert_eq!(&*decrypt(&s, &nonce, &ciphertext).unwrap(), &plaintext);
        }

        #[test]
        fn test_any_bit_flip_is_rejected(
            plaintext in prop::collection::vec(any::<u8>(), 0..256),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let nonce = [0x07; SESSION_NONCE_LEN];
            let mut ciphertext = encrypt(&secret(), &nonce, &plaintext).unwrap();
            let at = position.index(ciphertext.len());
            ciphertext[at] ^= 1 << bit;
            prop_assert!(decrypt(&secret(), &nonce, &ciphertext).is_err());
        }

        #[test]
        fn test_seal_open_any_input(
            plaintext in prop::collection::vec(any::<u8>(), 0..512),
            aad in prop::collection::vec(any::<u8>(), 0..16),
        ) {
            let sealed = seal(&secret(), os_rng().as_mut(), &plaintext, &aad).unwrap();
            prop_assert_eq!(&*open(&secret(), &sealed, &aad).unwrap(), &plaintext);
        }
    }

    #[test]
    fn test_wrong_secret() {
        let nonce = [3u8; 24];
        let ciphertext = encrypt(&secret(), &nonce, b"data").unwrap();
        let other = SharedSecret::from_bytes([0x43; 32]);
        assert!(matches!(
            decrypt(&other, &nonce, &ciphertext),
            Err(Error::AuthTagMismatch)
        ));
    }

    #[test]
    fn test_wrong_nonce() {
        let ciphertext = encrypt(&secret(), &[3u8; 24], b"data").unwrap();
        assert!(matches!(
            decrypt(&secret(), &[4u8; 24], &ciphertext),
            Err(Error::AuthTagMismatch)
        ));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let nonce = [3u8; 24];
        let mut ciphertext = encrypt(&secret(), &nonce, b"open the door").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(matches!(
            decrypt(&secret(), &nonce, &ciphertext),
            Err(Error::AuthTagMismatch)
        ));
    }

    #[test]
    fn test_nonce_length_enforced() {
        let result = encrypt(&secret(), &[0u8; 12], b"data");
        assert!(matches!(
            result,
            Err(Error::InvalidLength {
                expected: 24,
                actual: 12
            })
        ));
    }

    #[test]
    fn test_seal_open_binds_aad() {
        let s = secret();
        let mut rng = os_rng();
        let sealed = seal(&s, rng.as_mut(), b"payload", &[0x06, 0x00]).unwrap();
        assert_eq!(sealed.len(), 7 + SEAL_OVERHEAD);
        assert_eq!(&*open(&s, &sealed, &[0x06, 0x00]).unwrap(), b"payload");
        assert!(open(&s, &sealed, &[0x07, 0x00]).is_err());
    }

    #[test]
    fn test_seal_twice_uses_fresh_nonce() {
        let s = secret();
        let mut rng = os_rng();
        let a = seal(&s, rng.as_mut(), b"same", &[]).unwrap();
        let b = seal(&s, rng.as_mut(), b"same", &[]).unwrap();
        assert_ne!(a[..SESSION_NONCE_LEN], b[..SESSION_NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_seal_without_random_source() {
        let result = seal(&secret(), &mut UnavailableRng, b"x", &[]);
        assert!(matches!(result, Err(Error::RandomSourceUnavailable(_))));
    }

    #[test]
    fn test_open_short_input() {
        assert!(open(&secret(), &[0u8; 10], &[]).is_err());
    }
}
