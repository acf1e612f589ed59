//! Outbound Pairing Client
//!
//! Builds and sends the handshake and channel messages to a peer's
//! embedded server. Every call runs a cheap TCP-connect pre-check first
//! and fails fast with `Unreachable` instead of burning the full HTTP
//! timeout budget on a dead peer. Response envelopes are validated
//! against the message type each call expects; a mismatch is a protocol
//! error, distinct from a transport failure.

mod client;

pub use client::{ClientConfig, PairingClient, PairingOutcome};
