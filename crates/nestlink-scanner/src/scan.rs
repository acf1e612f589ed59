use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};

use crate::probe::{HostProber, ProbeOutcome, TcpProber};

/// Scanner configuration. Defaults match the pairing server's defaults.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Port the pairing server listens on.
    pub pairing_port: u16,
    /// Per-host probe timeout.
    pub probe_timeout: Duration,
    /// Concurrent probe cap. 254 unbounded sockets is a resource-exhaustion
    /// risk on a phone-class device.
    pub max_concurrent_probes: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pairing_port: 8080,
            probe_timeout: Duration::from_millis(500),
            max_concurrent_probes: 64,
        }
    }
}

/// One discovered host. Ephemeral, produced per scan, never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDevice {
    pub ip: Ipv4Addr,
    /// Reverse lookup is not attempted during a scan; callers that want a
    /// display name fill this in afterwards.
    pub hostname: Option<String>,
    pub is_reachable: bool,
    pub has_pairing_port: bool,
    pub response_time_ms: u64,
}

/// The 254 host addresses of `own_ip`'s `/24`, excluding `own_ip` itself.
pub fn subnet_hosts(own_ip: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, own_d] = own_ip.octets();
    (1..=254u8)
        .filter(|d| *d != own_d)
        .map(|d| Ipv4Addr::new(a, b, c, d))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    /// Every live host, whether or not it listens for pairing.
    Quick,
    /// Only hosts with the pairing port open.
    PairingOnly,
}

/// Concurrent subnet scanner.
pub struct Scanner {
    config: ScanConfig,
    prober: Arc<dyn HostProber>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_prober(config, Arc::new(TcpProber))
    }

    /// Scanner over an injected prober; used by tests to fake a subnet.
    pub fn with_prober(config: ScanConfig, prober: Arc<dyn HostProber>) -> Self {
        Self { config, prober }
    }

    /// Scans the `/24` for any live host.
    ///
    /// A single connect to the pairing port classifies each host: an open
    /// or refused connection both prove the host is up, and an open one
    /// additionally marks the pairing port. Results are sorted ascending
    /// by response time.
    pub async fn quick_scan(&self, own_ip: Ipv4Addr) -> Vec<NetworkDevice> {
        self.run(own_ip, ScanMode::Quick, None).await
    }

    /// Like [`quick_scan`](Self::quick_scan), but emits each device on
    /// `updates` the moment it is discovered.
    pub async fn quick_scan_streaming(
        &self,
        own_ip: Ipv4Addr,
        updates: mpsc::Sender<NetworkDevice>,
    ) -> Vec<NetworkDevice> {
        self.run(own_ip, ScanMode::Quick, Some(updates)).await
    }

    /// Scans only for hosts actively listening on the pairing port.
    pub async fn scan_for_pairing_devices(&self, own_ip: Ipv4Addr) -> Vec<NetworkDevice> {
        self.run(own_ip, ScanMode::PairingOnly, None).await
    }

    /// Streaming variant of
    /// [`scan_for_pairing_devices`](Self::scan_for_pairing_devices).
    pub async fn scan_for_pairing_devices_streaming(
        &self,
        own_ip: Ipv4Addr,
        updates: mpsc::Sender<NetworkDevice>,
    ) -> Vec<NetworkDevice> {
        self.run(own_ip, ScanMode::PairingOnly, Some(updates)).await
    }

    async fn run(
        &self,
        own_ip: Ipv4Addr,
        mode: ScanMode,
        updates: Option<mpsc::Sender<NetworkDevice>>,
    ) -> Vec<NetworkDevice> {
        let hosts = subnet_hosts(own_ip);
        tracing::debug!(
            "scanning {} hosts around {} (mode {:?})",
            hosts.len(),
            own_ip,
            mode
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes));
        let port = self.config.pairing_port;
        let timeout = self.config.probe_timeout;

        let tasks: Vec<_> = hosts
            .into_iter()
            .map(|ip| {
                let semaphore = semaphore.clone();
                let prober = self.prober.clone();
                let updates = updates.clone();
                tokio::spawn(async move {
                    // Closed semaphores don't happen here; a failed acquire
                    // just skips the host.
                    let _permit = semaphore.acquire().await.ok()?;
                    let outcome = prober.probe(ip, port, timeout).await;
                    let device = classify(ip, outcome, mode)?;
                    if let Some(tx) = updates {
                        let _ = tx.send(device.clone()).await;
                    }
                    Some(device)
                })
            })
            .collect();

        let mut devices: Vec<NetworkDevice> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok().flatten())
            .collect();

        // Fastest peer first; the caller will suggest that one.
        devices.sort_by_key(|d| d.response_time_ms);
        tracing::debug!("scan found {} devices", devices.len());
        devices
    }
}

fn classify(ip: Ipv4Addr, outcome: ProbeOutcome, mode: ScanMode) -> Option<NetworkDevice> {
    let has_pairing_port = matches!(outcome, ProbeOutcome::Open { .. });
    if !outcome.is_reachable() || (mode == ScanMode::PairingOnly && !has_pairing_port) {
        return None;
    }
    Some(NetworkDevice {
        ip,
        hostname: None,
        is_reachable: true,
        has_pairing_port,
        response_time_ms: outcome.rtt_ms().unwrap_or(0),
    })
}
