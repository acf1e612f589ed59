use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use nestlink_client::{PairingClient, PairingOutcome};
use nestlink_common::retry::{execute_with_retry, RetryConfig};
use nestlink_common::store::StatusStore;
use nestlink_common::{ConnectionStatus, DeviceIdentity, DeviceType, PairingStatus, Result};

use crate::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState};
use crate::reconnect::ReconnectContext;

/// Session tuning. These are deployment defaults, not constants — every
/// one of them is overridable at construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often a heartbeat is sent while paired.
    pub heartbeat_interval: Duration,
    /// Reconnection attempt budget after a lost link.
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts; deliberately distinct
    /// from the exponential backoff used inside a single heartbeat.
    pub reconnect_delay: Duration,
    /// Per-heartbeat retry/backoff.
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(5),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Owns the heartbeat loop and the reconnection machinery for the paired
/// link.
///
/// Status transitions are its only outward signal: transient transport
/// errors never escape as `Err`, they become persisted `PairingStatus`
/// changes the host application observes.
pub struct SessionManager {
    identity: DeviceIdentity,
    status: Arc<StatusStore>,
    client: Arc<PairingClient>,
    breaker: Arc<Mutex<CircuitBreaker>>,
    reconnecting: Arc<AtomicBool>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        identity: DeviceIdentity,
        status: Arc<StatusStore>,
        client: Arc<PairingClient>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let breaker = Arc::new(Mutex::new(CircuitBreaker::new(config.breaker.clone())));
        Arc::new(Self {
            identity,
            status,
            client,
            breaker,
            reconnecting: Arc::new(AtomicBool::new(false)),
            reconnect_task: Mutex::new(None),
            config,
        })
    }

    /// Initiates pairing with a peer and persists the relationship on
    /// acceptance. The heartbeat loop picks the new peer up on its next
    /// tick — there is nothing to start or restart.
    pub async fn pair_with(
        &self,
        peer_addr: &str,
        peer_name: Option<String>,
        peer_type: Option<DeviceType>,
    ) -> Result<PairingOutcome> {
        let outcome = self.client.pair(&self.identity, peer_addr).await?;

        if let PairingOutcome::Accepted { peer_id } = outcome {
            self.status
                .update(|s| {
                    s.set_paired(peer_id, peer_name.clone(), peer_type, peer_addr.to_string());
                })
                .await?;
            self.breaker.lock().await.reset();
        }
        Ok(outcome)
    }

    /// Clears the pairing. Idempotent: a second call is a no-op that
    /// leaves the same unpaired state behind.
    pub async fn unpair(&self) -> Result<PairingStatus> {
        let status = self.status.update(|s| s.clear()).await?;
        self.breaker.lock().await.reset();
        Ok(status)
    }

    /// Spawns the periodic heartbeat task. The caller owns the handle and
    /// aborts it during teardown (after the server's accept loop, before
    /// the reconnection task).
    pub fn spawn_heartbeat(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.heartbeat_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh pairing
            // isn't heartbeated twice in the same instant.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.beat().await;
            }
        })
    }

    /// Aborts any in-flight reconnection loop.
    pub async fn stop(&self) {
        if let Some(handle) = self.reconnect_task.lock().await.take() {
            handle.abort();
        }
        self.reconnecting.store(false, Ordering::SeqCst);
    }

    pub async fn breaker_state(&self) -> CircuitBreakerState {
        self.breaker.lock().await.snapshot()
    }

    /// One heartbeat cycle. Strictly sequential: the loop only calls this
    /// between ticks, so there is never an overlapping heartbeat in
    /// flight for the peer.
    async fn beat(&self) {
        if self.reconnecting.load(Ordering::SeqCst) {
            return;
        }
        let status = self.status.snapshot().await;
        if !status.is_paired {
            return;
        }
        let (Some(peer_id), Some(addr)) = (status.paired_device_id, status.paired_address) else {
            return;
        };

        if !self.breaker.lock().await.can_execute() {
            tracing::debug!("heartbeat short-circuited: circuit open");
            self.mark_down(ConnectionStatus::Error).await;
            self.trigger_reconnect().await;
            return;
        }

        let client = self.client.clone();
        let own_id = self.identity.device_id;
        let target = addr.clone();
        let result = execute_with_retry("heartbeat", &self.config.retry, move || {
            let client = client.clone();
            let target = target.clone();
            async move {
                client
                    .send_heartbeat(own_id, peer_id, &target)
                    .await
                    .map(|_| ())
            }
        })
        .await;

        match result {
            Ok(()) => {
                self.breaker.lock().await.record_success();
                let update = self
                    .status
                    .update(|s| {
                        s.connection_status = ConnectionStatus::Connected;
                        s.touch_heartbeat();
                    })
                    .await;
                if let Err(e) = update {
                    tracing::error!("failed to persist heartbeat status: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("heartbeat to {} lost: {}", addr, e);
                self.breaker.lock().await.record_failure();
                self.mark_down(ConnectionStatus::Disconnected).await;
                self.trigger_reconnect().await;
            }
        }
    }

    async fn mark_down(&self, status: ConnectionStatus) {
        let update = self
            .status
            .update(|s| {
                if s.is_paired {
                    s.connection_status = status;
                }
            })
            .await;
        if let Err(e) = update {
            tracing::error!("failed to persist connection status: {}", e);
        }
    }

    /// Starts the reconnection loop unless one is already running.
    /// Re-entrant calls while reconnecting are no-ops.
    async fn trigger_reconnect(&self) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let context = ReconnectContext {
            identity: self.identity.clone(),
            status: self.status.clone(),
            client: self.client.clone(),
            breaker: self.breaker.clone(),
            reconnecting: self.reconnecting.clone(),
            attempts: self.config.reconnect_attempts,
            delay: self.config.reconnect_delay,
        };
        let handle = tokio::spawn(context.run());
        *self.reconnect_task.lock().await = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[tokio::test]
    async fn test_unpair_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(
            StatusStore::load(dir.path().join("status.json"))
                .await
                .unwrap(),
        );
        status
            .update(|s| {
                s.set_paired(
                    uuid::Uuid::new_v4(),
                    Some("peer".to_string()),
                    Some(DeviceType::Child),
                    "10.0.0.5:8080".to_string(),
                );
            })
            .await
            .unwrap();

        let manager = SessionManager::new(
            DeviceIdentity::generate("parent", DeviceType::Parent, "10.0.0.4", 8080),
            status,
            Arc::new(PairingClient::default()),
            SessionConfig::default(),
        );

        let once = manager.unpair().await.unwrap();
        assert!(!once.is_paired);
        assert_eq!(once.connection_status, ConnectionStatus::Disconnected);
        assert!(once.paired_device_id.is_none());

        let twice = manager.unpair().await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_beat_is_a_noop_while_unpaired() {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(
            StatusStore::load(dir.path().join("status.json"))
                .await
                .unwrap(),
        );
        let manager = SessionManager::new(
            DeviceIdentity::generate("parent", DeviceType::Parent, "10.0.0.4", 8080),
            status.clone(),
            Arc::new(PairingClient::default()),
            SessionConfig::default(),
        );

        manager.beat().await;
        let snapshot = status.snapshot().await;
        assert!(!snapshot.is_paired);
        assert_eq!(manager.breaker_state().await.consecutive_failures, 0);
    }
}
