//! Handshake authenticators (HMAC-SHA256).
//!
//! An authenticator is a tag over the ordered concatenation of its parts,
//! keyed with the [`SharedSecret`]. Part boundaries are not encoded: every
//! part in the pairing protocol has a fixed length.

use crate::kdf::SharedSecret;
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Authenticator length in bytes.
pub const AUTHENTICATOR_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &SharedSecret, parts: &[&[u8]]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::KeyDerivation("HMAC key rejected".into()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

/// Compute the authenticator over `parts` in order.
///
/// # Example
///
/// ```
/// use keyturn_crypto::kdf::SharedSecret;
/// use keyturn_crypto::mac::{compute_authenticator, verify_authenticator};
///
/// let secret = SharedSecret::from_bytes([0x11; 32]);
/// let tag = compute_authenticator(&secret, &[b"controller", b"lock"]).unwrap();
/// assert!(verify_authenticator(&secret, &[b"controller", b"lock"], &tag));
/// ```
pub fn compute_authenticator(
    secret: &SharedSecret,
    parts: &[&[u8]],
) -> Result<[u8; AUTHENTICATOR_LEN]> {
    Ok(keyed(secret, parts)?.finalize().into_bytes().into())
}

/// Verify `tag` against the authenticator over `parts`, in constant time.
pub fn verify_authenticator(secret: &SharedSecret, parts: &[&[u8]], tag: &[u8]) -> bool {
    match keyed(secret, parts) {
        Ok(mac) => mac.verify_slice(tag).is_ok(),
        Err(_) => false,
    }
}
