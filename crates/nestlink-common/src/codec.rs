//! JSON codec for message envelopes.
//!
//! Encoding is plain serde_json; decoding maps serde failures (missing
//! required fields, wrong shapes) to [`NestlinkError::MalformedEnvelope`]
//! so transport code can distinguish a protocol error from a network error.
//! Unknown message type tags are NOT a decode failure — they come back as
//! [`MessageType::Unknown`] and the router decides what to do with them.
//!
//! [`MessageType::Unknown`]: crate::protocol::MessageType::Unknown

use crate::protocol::error::{NestlinkError, Result};
use crate::protocol::MessageEnvelope;

pub fn encode_envelope(envelope: &MessageEnvelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

pub fn decode_envelope(data: &[u8]) -> Result<MessageEnvelope> {
    serde_json::from_slice(data).map_err(|e| NestlinkError::MalformedEnvelope(e.to_string()))
}
