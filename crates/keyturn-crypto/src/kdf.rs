//! Shared secret derivation (HKDF-SHA256).
//!
//! The raw ECDH output is never used directly as a key. It is expanded with
//! HKDF-SHA256 under a fixed pairing label into the 32-byte [`SharedSecret`]
//! that keys both the authenticators and session encryption.

use crate::{Error, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// HKDF info label for the pairing shared secret.
pub const SHARED_SECRET_INFO: &[u8] = b"keyturn-pairing-shared-secret";

/// Length of the derived shared secret.
pub const SHARED_SECRET_LEN: usize = 32;

/// The 32-byte secret shared by controller and lock after key agreement.
///
/// Zeroed on drop. `Debug` never prints the key.
#[derive(Clone)]
pub struct SharedSecret(Zeroizing<[u8; SHARED_SECRET_LEN]>);

impl SharedSecret {
    /// Wrap previously derived bytes (e.g. loaded from a credential store).
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Wrap previously derived bytes from a slice.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLength` unless `bytes` is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SHARED_SECRET_LEN] =
            bytes.try_into().map_err(|_| Error::InvalidLength {
                expected: SHARED_SECRET_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self::from_bytes(array))
    }

    /// Key bytes.
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl core::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Generic HKDF-SHA256 per RFC 5869.
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);

    let mut okm = Zeroizing::new(vec![0u8; output_len]);
    hk.expand(info, &mut okm)
        .map_err(|_| Error::KeyDerivation("HKDF expansion failed".into()))?;

    Ok(okm)
}

/// Derive the pairing [`SharedSecret`] from a raw ECDH output.
///
/// - IKM: raw ECDH output
/// - Salt: empty
/// - Info: [`SHARED_SECRET_INFO`]
pub fn derive_shared_secret(raw_secret: &[u8]) -> Result<SharedSecret> {
    if raw_secret.iter().all(|b| *b == 0) {
        return Err(Error::KeyDerivation("All-zero key agreement output".into()));
    }

    let okm = hkdf_sha256(raw_secret, &[], SHARED_SECRET_INFO, SHARED_SECRET_LEN)?;
    SharedSecret::from_slice(&okm)
}
