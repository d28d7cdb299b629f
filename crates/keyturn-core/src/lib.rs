//! Pairing and mutual authentication for keyturn BLE locks.
//!
//! This crate implements the controller side of the lock pairing protocol:
//! - Frame codec with optional CRC-16 trailer ([`frame`])
//! - Fragment reassembly of lock notifications ([`reassembly`])
//! - An explicit transition table ([`state`])
//! - The sans-IO [`PairingAuthenticator`] that runs the handshake, persists
//!   credentials on success and exposes the session primitives
//! - A [`SimulatedLock`](peer::SimulatedLock) for offline testing
//!
//! Transport I/O and clocks live in `keyturn-transport`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authenticator;
pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod peer;
pub mod reassembly;
pub mod state;

pub use authenticator::{AuthEvent, PairingAuthenticator};
pub use command::Command;
pub use config::{AuthConfig, ClientIdentity, FramingConfig, IdType};
pub use error::{Error, ErrorCode, Result};
pub use reassembly::{CompleteMessage, Reassembler};
pub use state::AuthState;
