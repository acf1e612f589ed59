//! Embedded Pairing Server
//!
//! Every nestlink device runs one of these: a single persistent HTTP
//! listener on a fixed port (default 8080) that answers the pairing
//! handshake, the message channel and a liveness check. hyper handles the
//! HTTP/1.1 line protocol; one connection serves one request and closes.
//!
//! # Routes
//!
//! - `POST /pair` — pairing handshake; acceptance is delegated to a
//!   pluggable [`PairingPolicy`]
//! - `POST /message` — heartbeats, log batches and incident alerts
//! - `GET /health` — fixed liveness body, used by scanners and diagnostics
//! - anything else — 404 naming the path and method
//!
//! # Failure semantics
//!
//! A read error, malformed body or oversized body aborts that single
//! connection; the listener only stops on explicit shutdown. A bind
//! failure (port already in use) is a fatal startup error surfaced from
//! [`PairingServer::bind`], never silently retried.
//!
//! [`PairingPolicy`]: nestlink_common::policy::PairingPolicy

mod events;
mod router;
mod server;

pub use events::{LinkEvents, LoggingEvents};
pub use router::{Router, RouterState};
pub use server::PairingServer;
