//! Payload schemas carried inside envelopes.
//!
//! Payloads are double-encoded (a JSON string inside the envelope's JSON),
//! so these types evolve independently of [`MessageEnvelope`]. Only the
//! schemas the core subsystem itself routes are defined here; anything else
//! stays opaque to the caller.
//!
//! [`MessageEnvelope`]: super::envelope::MessageEnvelope

use serde::{Deserialize, Serialize};

/// Decision string carried by a `PAIRING_RESPONSE` payload.
pub const PAIRING_ACCEPTED: &str = "ACCEPTED";
pub const PAIRING_REJECTED: &str = "REJECTED";

/// An incident detected by the content analyzer on the child device,
/// forwarded to the parent as an `INCIDENT_ALERT`.
///
/// Mirrors the analyzer's verdict: what kind of detection fired, a human
/// readable description and the analyzer's confidence in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IncidentReport {
    pub detection_type: String,
    pub description: String,
    pub confidence: f32,
    pub timestamp: u64,
}

/// A single activity log line shipped as part of a `LOG_DATA` batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: u64,
    pub level: String,
    pub message: String,
}

/// A batch of log entries forwarded from child to parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    pub entries: Vec<LogEntry>,
}
