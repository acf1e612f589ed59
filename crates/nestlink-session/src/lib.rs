//! Connection Health for a Paired Link
//!
//! Once two devices are paired, this crate keeps the relationship honest
//! over an unreliable Wi-Fi link:
//!
//! - a periodic heartbeat task exercises the channel (strictly
//!   sequentially — never two heartbeats in flight)
//! - a circuit breaker stops hammering a peer that has gone dark
//! - a reconnection manager takes over on sustained failure, with its own
//!   fixed-delay attempt budget distinct from per-call backoff
//!
//! The host application never catches transport errors from any of this;
//! it observes `PairingStatus.connection_status` transitions, which are
//! persisted on every change.

mod circuit;
mod manager;
mod reconnect;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitState};
pub use manager::{SessionConfig, SessionManager};
