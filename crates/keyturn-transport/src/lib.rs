//! Async transport layer for keyturn lock pairing.
//!
//! The pairing state machine in `keyturn-core` is sans-IO. This crate
//! supplies the seam a BLE stack implements ([`PairingTransport`]), an
//! in-memory implementation for tests and emulators, and a tokio driver
//! that runs a handshake to completion.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod driver;
pub mod error;
pub mod transport;

pub use channel::{channel_pair, ChannelTransport, LockEndpoint};
pub use driver::PairingDriver;
pub use error::{Error, Result};
pub use transport::PairingTransport;
