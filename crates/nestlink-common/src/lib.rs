//! Nestlink Common Types, Codec and Stores
//!
//! This crate provides the core protocol definitions, the JSON envelope
//! codec, the generic retry executor and the persisted identity/status
//! stores shared by every nestlink component.
//!
//! # Overview
//!
//! Nestlink pairs two previously-unassociated devices (a parent and a child
//! role) on a local subnet and keeps a best-effort messaging channel alive
//! between them. This crate contains everything both sides of that channel
//! agree on:
//!
//! - **Protocol Layer**: message envelope, device identity, pairing status,
//!   payload schemas and the error taxonomy
//! - **Codec**: JSON encoding/decoding of envelopes
//! - **Retry Executor**: generic "try N times with exponential delay"
//! - **Stores**: JSON-file-backed identity and pairing-status persistence
//!
//! # Wire Format
//!
//! Envelopes travel as flat JSON objects over plain HTTP/1.1. The `payload`
//! field is itself a JSON string (double-encoded) so payload schemas can
//! evolve independently of the envelope schema.
//!
//! # Example
//!
//! ```
//! use nestlink_common::{MessageEnvelope, MessageType, codec};
//! use uuid::Uuid;
//!
//! let envelope = MessageEnvelope::heartbeat(Uuid::new_v4(), Uuid::new_v4());
//! let bytes = codec::encode_envelope(&envelope).unwrap();
//! let decoded = codec::decode_envelope(&bytes).unwrap();
//! assert_eq!(decoded.message_type, MessageType::Heartbeat);
//! ```

pub mod codec;
pub mod policy;
pub mod protocol;
pub mod retry;
pub mod store;

pub use protocol::*;
