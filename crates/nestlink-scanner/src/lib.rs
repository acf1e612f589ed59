//! Local Subnet Scanner
//!
//! Enumerates the `/24` around the device's own address and probes each
//! host concurrently for reachability and for an open pairing port,
//! emitting every discovery as it happens.
//!
//! # Probing without raw sockets
//!
//! ICMP needs privileges a mobile-class process does not have, so the
//! reachability probe is a TCP connect with a short timeout where a
//! refused connection still proves the host is up — only a timeout or a
//! route failure counts as "down".
//!
//! # Two scan modes
//!
//! - [`Scanner::quick_scan`] reports every live host, noting which of them
//!   also listen on the pairing port.
//! - [`Scanner::scan_for_pairing_devices`] goes straight to the pairing
//!   port (cheaper, more selective) and reports only hosts with it open.
//!
//! Both cap their concurrency with a semaphore and return results sorted
//! fastest-first, since the caller will typically suggest the most
//! reachable candidate. Per-host failures are swallowed; a scan never
//! fails, it only returns fewer results.

mod probe;
mod scan;

pub use probe::{HostProber, ProbeOutcome, TcpProber};
pub use scan::{subnet_hosts, NetworkDevice, ScanConfig, Scanner};
