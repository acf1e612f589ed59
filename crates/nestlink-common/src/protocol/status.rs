use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::envelope::epoch_millis;
use super::identity::DeviceType;

/// Health of the link to the paired peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Connecting,
    Error,
}

/// The persisted pairing relationship and its current connection health.
///
/// Mutated by the handshake, by heartbeat results and by the reconnection
/// manager; persisted after every mutation so it survives process restarts.
///
/// Invariant: `is_paired == false` implies `connection_status ==
/// Disconnected` and every `paired_*` field is `None`. [`clear`](Self::clear)
/// is the only way to leave the paired state and enforces this.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PairingStatus {
    pub is_paired: bool,
    pub paired_device_id: Option<Uuid>,
    pub paired_device_name: Option<String>,
    pub paired_device_type: Option<DeviceType>,
    /// The peer's `ip:port`, used to address heartbeats and reconnects.
    pub paired_address: Option<String>,
    pub connection_status: ConnectionStatus,
    pub last_heartbeat: Option<u64>,
}

impl PairingStatus {
    pub fn set_paired(
        &mut self,
        device_id: Uuid,
        device_name: Option<String>,
        device_type: Option<DeviceType>,
        address: String,
    ) {
        self.is_paired = true;
        self.paired_device_id = Some(device_id);
        self.paired_device_name = device_name;
        self.paired_device_type = device_type;
        self.paired_address = Some(address);
        self.connection_status = ConnectionStatus::Connected;
        self.last_heartbeat = Some(epoch_millis());
    }

    /// Returns the status to the unpaired invariant. Idempotent.
    pub fn clear(&mut self) {
        *self = PairingStatus::default();
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_heartbeat = Some(epoch_millis());
    }
}
