//! JSON-file-backed persistence for device identity and pairing status.
//!
//! Both stores write the full document on every mutation. The on-disk copy
//! is the source of truth for crash recovery — a restarted process reads
//! the file before trusting anything in memory.

use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::protocol::error::{NestlinkError, Result};
use crate::protocol::identity::{generate_pairing_code, generate_security_key};
use crate::protocol::{DeviceIdentity, DeviceType, PairingStatus};

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| NestlinkError::Persistence(format!("creating {parent:?}: {e}")))?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, data)
        .await
        .map_err(|e| NestlinkError::Persistence(format!("writing {path:?}: {e}")))
}

/// Persists the device's own [`DeviceIdentity`].
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the stored identity, creating one on first run.
    ///
    /// An existing identity is kept verbatim except that an absent
    /// `pairing_code` or `security_key` is regenerated (and the file
    /// rewritten); the address fields are refreshed to the current ones.
    pub async fn load_or_create(
        &self,
        device_name: &str,
        device_type: DeviceType,
        ip_address: &str,
        port: u16,
    ) -> Result<DeviceIdentity> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => {
                let mut identity: DeviceIdentity = serde_json::from_slice(&data)
                    .map_err(|e| NestlinkError::Persistence(format!("parsing identity: {e}")))?;
                let mut dirty = false;
                if identity.pairing_code.is_empty() {
                    identity.pairing_code = generate_pairing_code();
                    dirty = true;
                }
                if identity.security_key.is_empty() {
                    identity.security_key = generate_security_key();
                    dirty = true;
                }
                if identity.ip_address != ip_address || identity.port != port {
                    identity.ip_address = ip_address.to_string();
                    identity.port = port;
                    dirty = true;
                }
                if dirty {
                    write_json(&self.path, &identity).await?;
                }
                Ok(identity)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let identity =
                    DeviceIdentity::generate(device_name, device_type, ip_address, port);
                write_json(&self.path, &identity).await?;
                tracing::info!(
                    "created device identity {} ({})",
                    identity.device_id,
                    identity.device_type
                );
                Ok(identity)
            }
            Err(e) => Err(NestlinkError::Persistence(format!(
                "reading {:?}: {e}",
                self.path
            ))),
        }
    }
}

/// Owns the mutable [`PairingStatus`] and persists it after every mutation.
///
/// All mutation goes through [`update`](Self::update), which holds the
/// write lock across both the in-memory change and the file write so
/// concurrent tasks (server handler, heartbeat task, reconnection task)
/// never interleave a stale persist.
pub struct StatusStore {
    path: PathBuf,
    inner: RwLock<PairingStatus>,
}

impl StatusStore {
    /// Loads the persisted status, or starts unpaired if none exists.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let status = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| NestlinkError::Persistence(format!("parsing status: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PairingStatus::default(),
            Err(e) => {
                return Err(NestlinkError::Persistence(format!("reading {path:?}: {e}")));
            }
        };
        Ok(Self {
            path,
            inner: RwLock::new(status),
        })
    }

    pub async fn snapshot(&self) -> PairingStatus {
        self.inner.read().await.clone()
    }

    /// Applies `mutate` and persists the result, returning the new value.
    pub async fn update<F>(&self, mutate: F) -> Result<PairingStatus>
    where
        F: FnOnce(&mut PairingStatus),
    {
        let mut guard = self.inner.write().await;
        mutate(&mut guard);
        let snapshot = guard.clone();
        write_json(&self.path, &snapshot).await?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_identity_created_once_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("identity.json"));

        let first = store
            .load_or_create("parent-phone", DeviceType::Parent, "10.0.0.4", 8080)
            .await
            .unwrap();
        let second = store
            .load_or_create("parent-phone", DeviceType::Parent, "10.0.0.4", 8080)
            .await
            .unwrap();

        assert_eq!(first.device_id, second.device_id);
        assert_eq!(first.pairing_code, second.pairing_code);
        assert_eq!(first.security_key, second.security_key);
    }

    #[tokio::test]
    async fn test_identity_regenerates_only_absent_material() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        // Stored file predating the pairing-code field.
        let stored = serde_json::json!({
            "deviceId": Uuid::new_v4(),
            "deviceName": "old-install",
            "deviceType": "CHILD",
            "ipAddress": "10.0.0.5",
            "port": 8080,
        });
        tokio::fs::write(&path, stored.to_string()).await.unwrap();

        let store = IdentityStore::new(&path);
        let identity = store
            .load_or_create("old-install", DeviceType::Child, "10.0.0.5", 8080)
            .await
            .unwrap();
        assert_eq!(identity.pairing_code.len(), 6);
        assert_eq!(identity.security_key.len(), 32);

        // And the regenerated material sticks.
        let again = store
            .load_or_create("old-install", DeviceType::Child, "10.0.0.5", 8080)
            .await
            .unwrap();
        assert_eq!(identity.pairing_code, again.pairing_code);
        assert_eq!(identity.security_key, again.security_key);
    }

    #[tokio::test]
    async fn test_status_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let peer_id = Uuid::new_v4();

        {
            let store = StatusStore::load(&path).await.unwrap();
            store
                .update(|s| {
                    s.set_paired(peer_id, None, None, "10.0.0.5:8080".to_string());
                })
                .await
                .unwrap();
        }

        let store = StatusStore::load(&path).await.unwrap();
        let status = store.snapshot().await;
        assert!(status.is_paired);
        assert_eq!(status.paired_device_id, Some(peer_id));
        assert_eq!(status.connection_status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_unpaired_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatusStore::load(dir.path().join("status.json"))
            .await
            .unwrap();
        let status = store.snapshot().await;
        assert!(!status.is_paired);
        assert_eq!(status.connection_status, ConnectionStatus::Disconnected);
    }
}
