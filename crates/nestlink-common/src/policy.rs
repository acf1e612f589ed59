//! Pairing acceptance policy.
//!
//! Whether an incoming pairing request is accepted is a deployment
//! decision, not something this crate hard-codes. The server consults a
//! [`PairingPolicy`] for every `/pair` request; rejection is a normal
//! `REJECTED` response, never an error. `AcceptAll` reproduces the open
//! pairing behavior; `RequireCode` gates on the 6-digit code shown on this
//! device. Neither is an authentication mechanism.

use crate::protocol::DeviceIdentity;

pub trait PairingPolicy: Send + Sync {
    fn allow(&self, requester: &DeviceIdentity) -> bool;
}

/// Accepts every pairing request (the default).
pub struct AcceptAll;

impl PairingPolicy for AcceptAll {
    fn allow(&self, _requester: &DeviceIdentity) -> bool {
        true
    }
}

/// Accepts only requesters that present this device's pairing code.
pub struct RequireCode {
    code: String,
}

impl RequireCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl PairingPolicy for RequireCode {
    fn allow(&self, requester: &DeviceIdentity) -> bool {
        requester.pairing_code == self.code
    }
}
