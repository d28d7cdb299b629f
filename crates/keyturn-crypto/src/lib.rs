//! Cryptographic primitives for keyturn lock pairing.
//!
//! This crate implements the building blocks of the pairing handshake:
//! - Key agreement (X25519, ECDH-P256) with restorable key pairs
//! - Shared secret derivation (HKDF-SHA256 over the raw ECDH output)
//! - Authenticators (HMAC-SHA256, constant-time verification)
//! - Session encryption (XChaCha20-Poly1305, 24-byte nonces)
//! - Nonce generation from a fallible secure random source
//!
//! Security requirements:
//! - All secrets use Zeroizing wrappers
//! - Constant-time comparisons via subtle / hmac
//! - No logging of key material
//! - Random source failures are reported, never downgraded

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod kex;
pub mod mac;
pub mod random;

pub use error::{Error, Result};
pub use kdf::SharedSecret;
pub use kex::{Curve, EphemeralKeyPair};
pub use random::SecureRng;
