//! Nestlink Message Envelope
//!
//! Every exchange between a paired parent and child travels inside a
//! [`MessageEnvelope`]: a flat JSON object carrying sender, recipient, a
//! message type tag and an opaque JSON-string payload. The payload is
//! double-encoded so that payload schemas can evolve independently of the
//! envelope schema.
//!
//! Unknown message type tags are preserved as [`MessageType::Unknown`]
//! rather than failing to decode, so routers can log-and-ignore messages
//! from newer peers.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::SystemTime;
use uuid::Uuid;

use super::error::Result;
use super::identity::DeviceIdentity;

/// Milliseconds since the Unix epoch, used for all wire timestamps.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The kind of message an envelope carries.
///
/// Known variants map to their SCREAMING_SNAKE wire tags; anything else
/// round-trips through `Unknown(raw)` so the raw tag survives re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    PairingRequest,
    PairingResponse,
    Heartbeat,
    Acknowledgment,
    LogData,
    IncidentAlert,
    Unknown(String),
}

impl MessageType {
    pub fn as_wire(&self) -> &str {
        match self {
            MessageType::PairingRequest => "PAIRING_REQUEST",
            MessageType::PairingResponse => "PAIRING_RESPONSE",
            MessageType::Heartbeat => "HEARTBEAT",
            MessageType::Acknowledgment => "ACKNOWLEDGMENT",
            MessageType::LogData => "LOG_DATA",
            MessageType::IncidentAlert => "INCIDENT_ALERT",
            MessageType::Unknown(raw) => raw,
        }
    }

    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "PAIRING_REQUEST" => MessageType::PairingRequest,
            "PAIRING_RESPONSE" => MessageType::PairingResponse,
            "HEARTBEAT" => MessageType::Heartbeat,
            "ACKNOWLEDGMENT" => MessageType::Acknowledgment,
            "LOG_DATA" => MessageType::LogData,
            "INCIDENT_ALERT" => MessageType::IncidentAlert,
            other => MessageType::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        if tag.is_empty() {
            return Err(D::Error::custom("empty message type"));
        }
        Ok(MessageType::from_wire(&tag))
    }
}

/// The outer wrapper for every exchange between paired devices.
///
/// Immutable once constructed. `payload` is an opaque JSON string
/// interpreted according to `message_type`; use
/// [`payload_as`](Self::payload_as) to decode it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub message_type: MessageType,
    pub payload: String,
    pub requires_ack: bool,
    pub timestamp: u64,
}

impl MessageEnvelope {
    pub fn new(
        sender_id: Uuid,
        recipient_id: Uuid,
        message_type: MessageType,
        payload: String,
        requires_ack: bool,
    ) -> Self {
        Self {
            sender_id,
            recipient_id,
            message_type,
            payload,
            requires_ack,
            timestamp: epoch_millis(),
        }
    }

    /// Builds an envelope whose payload is the JSON encoding of `payload`.
    pub fn with_payload<T: Serialize>(
        sender_id: Uuid,
        recipient_id: Uuid,
        message_type: MessageType,
        payload: &T,
        requires_ack: bool,
    ) -> Result<Self> {
        let encoded = serde_json::to_string(payload)?;
        Ok(Self::new(
            sender_id,
            recipient_id,
            message_type,
            encoded,
            requires_ack,
        ))
    }

    /// Decodes the opaque payload as `T`.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// A pairing request carrying the requester's full identity.
    ///
    /// The recipient's device id is not known before pairing completes, so
    /// the nil UUID stands in for it.
    pub fn pairing_request(own: &DeviceIdentity) -> Result<Self> {
        Self::with_payload(
            own.device_id,
            Uuid::nil(),
            MessageType::PairingRequest,
            own,
            true,
        )
    }

    /// A pairing response whose payload is the decision string
    /// (`"ACCEPTED"` or `"REJECTED"`).
    pub fn pairing_response(sender_id: Uuid, recipient_id: Uuid, decision: &str) -> Result<Self> {
        Self::with_payload(
            sender_id,
            recipient_id,
            MessageType::PairingResponse,
            &decision,
            false,
        )
    }

    pub fn heartbeat(sender_id: Uuid, recipient_id: Uuid) -> Self {
        Self::new(
            sender_id,
            recipient_id,
            MessageType::Heartbeat,
            "{}".to_string(),
            true,
        )
    }

    pub fn acknowledgment(sender_id: Uuid, recipient_id: Uuid) -> Self {
        Self::new(
            sender_id,
            recipient_id,
            MessageType::Acknowledgment,
            "{}".to_string(),
            false,
        )
    }

    pub fn log_data<T: Serialize>(sender_id: Uuid, recipient_id: Uuid, batch: &T) -> Result<Self> {
        Self::with_payload(sender_id, recipient_id, MessageType::LogData, batch, true)
    }

    pub fn incident_alert<T: Serialize>(
        sender_id: Uuid,
        recipient_id: Uuid,
        report: &T,
    ) -> Result<Self> {
        Self::with_payload(
            sender_id,
            recipient_id,
            MessageType::IncidentAlert,
            report,
            true,
        )
    }
}
