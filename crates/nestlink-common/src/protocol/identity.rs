use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the pairing relationship a device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    Parent,
    Child,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Parent => f.write_str("PARENT"),
            DeviceType::Child => f.write_str("CHILD"),
        }
    }
}

/// A device's stable identity, created once per install and persisted.
///
/// `pairing_code` and `security_key` are regenerated only when absent from
/// the stored file. The security key is an opaque shared string exchanged
/// during pairing; it is a policy hook, not an authentication mechanism.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: Uuid,
    pub device_name: String,
    pub device_type: DeviceType,
    pub ip_address: String,
    pub port: u16,
    #[serde(default)]
    pub security_key: String,
    #[serde(default)]
    pub pairing_code: String,
}

impl DeviceIdentity {
    pub fn generate(
        device_name: impl Into<String>,
        device_type: DeviceType,
        ip_address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            device_id: Uuid::new_v4(),
            device_name: device_name.into(),
            device_type,
            ip_address: ip_address.into(),
            port,
            security_key: generate_security_key(),
            pairing_code: generate_pairing_code(),
        }
    }

    /// The `ip:port` address the device's pairing server answers on.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }
}

/// A 6-digit code shown to the user during pairing.
pub fn generate_pairing_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:06}")
}

/// An opaque 128-bit hex key.
pub fn generate_security_key() -> String {
    let key: u128 = rand::rng().random();
    format!("{key:032x}")
}
