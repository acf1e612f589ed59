use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use nestlink_client::PairingClient;
use nestlink_common::store::StatusStore;
use nestlink_common::{ConnectionStatus, DeviceIdentity, NestlinkError};

use crate::circuit::CircuitBreaker;

/// Everything the reconnection loop needs, cloned out of the manager so
/// the spawned task owns its state outright.
pub(crate) struct ReconnectContext {
    pub identity: DeviceIdentity,
    pub status: Arc<StatusStore>,
    pub client: Arc<PairingClient>,
    pub breaker: Arc<Mutex<CircuitBreaker>>,
    /// In-flight guard owned by the manager; cleared on exit so the next
    /// failure can trigger a fresh loop.
    pub reconnecting: Arc<AtomicBool>,
    pub attempts: u32,
    pub delay: Duration,
}

impl ReconnectContext {
    /// Tries to win the link back: up to `attempts` single heartbeats with
    /// a fixed `delay` between them. Success returns the status to
    /// Connected and stops early; exhausting the budget leaves the peer
    /// Disconnected but still paired.
    pub(crate) async fn run(self) {
        tracing::info!("reconnection started (budget {} attempts)", self.attempts);
        let update = self
            .status
            .update(|s| {
                if s.is_paired {
                    s.connection_status = ConnectionStatus::Connecting;
                }
            })
            .await;
        if let Err(e) = update {
            tracing::error!("failed to persist reconnecting status: {}", e);
        }

        for attempt in 1..=self.attempts {
            let status = self.status.snapshot().await;
            // Unpaired underneath us; nothing left to reconnect.
            if !status.is_paired {
                break;
            }
            let (Some(peer_id), Some(addr)) = (status.paired_device_id, status.paired_address)
            else {
                break;
            };

            let allowed = self.breaker.lock().await.can_execute();
            let result = if allowed {
                self.client
                    .send_heartbeat(self.identity.device_id, peer_id, &addr)
                    .await
                    .map(|_| ())
            } else {
                Err(NestlinkError::CircuitOpen)
            };

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
                        tracing::error!("failed to persist reconnect success: {}", e);
                    }
                    tracing::info!("reconnected on attempt {}/{}", attempt, self.attempts);
                    self.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        "reconnect attempt {}/{} failed: {}",
                        attempt,
                        self.attempts,
                        e
                    );
                    // A short-circuited attempt made no network call and
                    // must not count against the breaker.
                    if !matches!(e, NestlinkError::CircuitOpen) {
                        self.breaker.lock().await.record_failure();
                    }
                    if attempt < self.attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        tracing::warn!("reconnection budget exhausted; peer stays paired but disconnected");
        let update = self
            .status
            .update(|s| {
                if s.is_paired {
                    s.connection_status = ConnectionStatus::Disconnected;
                }
            })
            .await;
        if let Err(e) = update {
            tracing::error!("failed to persist disconnected status: {}", e);
        }
        self.reconnecting.store(false, Ordering::SeqCst);
    }
}
