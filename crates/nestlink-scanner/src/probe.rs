use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// What a single TCP connect attempt learned about a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Connect succeeded: host is up and the port is listening.
    Open { rtt_ms: u64 },
    /// Connection refused: nothing listens on the port, but something
    /// answered, so the host is up.
    Refused { rtt_ms: u64 },
    /// Timeout or route failure: the host did not answer at all.
    Down,
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ProbeOutcome::Down)
    }

    pub fn rtt_ms(&self) -> Option<u64> {
        match self {
            ProbeOutcome::Open { rtt_ms } | ProbeOutcome::Refused { rtt_ms } => Some(*rtt_ms),
            ProbeOutcome::Down => None,
        }
    }
}

/// A single-host probe, abstracted so scans can be tested against a fake
/// subnet.
#[async_trait]
pub trait HostProber: Send + Sync {
    async fn probe(&self, ip: Ipv4Addr, port: u16, timeout: Duration) -> ProbeOutcome;
}

/// The real prober: one TCP connect per probe.
pub struct TcpProber;

#[async_trait]
impl HostProber for TcpProber {
    async fn probe(&self, ip: Ipv4Addr, port: u16, timeout: Duration) -> ProbeOutcome {
        let addr = SocketAddr::new(IpAddr::V4(ip), port);
        let start = Instant::now();
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => ProbeOutcome::Open {
                rtt_ms: start.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                ProbeOutcome::Refused {
                    rtt_ms: start.elapsed().as_millis() as u64,
                }
            }
            _ => ProbeOutcome::Down,
        }
    }
}
