//! # Nestlink CLI Entry Point
//!
//! Main binary for the nestlink pairing subsystem. Runs the embedded
//! pairing server with the heartbeat/reconnection machinery, scans the
//! local subnet for candidate peers, and drives the pairing handshake and
//! message channel from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Run the device service (server + heartbeats)
//! nestlink serve -b 0.0.0.0:8080 --device-type child --name kids-tablet
//!
//! # Discover live hosts / pairing peers on the subnet
//! nestlink scan
//! nestlink scan --pairing-only
//!
//! # Pair with a discovered peer
//! nestlink pair 192.168.1.23:8080
//!
//! # Send through the channel, inspect and clear the pairing
//! nestlink send --incident '{"detectionType":"KEYWORD_MATCH","description":"...","confidence":0.9,"timestamp":0}'
//! nestlink status
//! nestlink unpair
//! ```

mod service;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use argh::FromArgs;

use nestlink_client::{PairingClient, PairingOutcome};
use nestlink_common::store::{IdentityStore, StatusStore};
use nestlink_common::{DeviceType, IncidentReport, LogBatch};
use nestlink_scanner::{ScanConfig, Scanner};
use nestlink_session::{SessionConfig, SessionManager};

/// Nestlink - resilient parent/child device pairing over the local network
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Scan(ScanArgs),
    Pair(PairArgs),
    Send(SendArgs),
    Status(StatusArgs),
    Unpair(UnpairArgs),
}

/// Run the pairing server and keep the paired link alive.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
struct ServeArgs {
    /// address to bind the pairing server to
    #[argh(option, short = 'b', default = "String::from(\"0.0.0.0:8080\")")]
    bind: String,

    /// directory holding identity and pairing state
    #[argh(option, short = 'd', default = "PathBuf::from(\".nestlink\")")]
    data_dir: PathBuf,

    /// role of this device: parent or child
    #[argh(option, short = 't', default = "String::from(\"child\")")]
    device_type: String,

    /// human-readable device name
    #[argh(option, short = 'n', default = "String::from(\"nestlink-device\")")]
    name: String,

    /// only accept pairing requests presenting this device's pairing code
    #[argh(switch)]
    require_code: bool,

    /// heartbeat interval in seconds
    #[argh(option, default = "5")]
    heartbeat_secs: u64,
}

/// Scan the local /24 for live hosts or pairing peers.
#[derive(FromArgs)]
#[argh(subcommand, name = "scan")]
struct ScanArgs {
    /// only report hosts listening on the pairing port
    #[argh(switch)]
    pairing_only: bool,

    /// pairing port to probe
    #[argh(option, short = 'p', default = "8080")]
    port: u16,

    /// per-host probe timeout in milliseconds
    #[argh(option, default = "500")]
    timeout_ms: u64,
}

/// Pair with a peer's pairing server.
#[derive(FromArgs)]
#[argh(subcommand, name = "pair")]
struct PairArgs {
    /// peer address, e.g. 192.168.1.23:8080
    #[argh(positional)]
    peer: String,

    /// directory holding identity and pairing state
    #[argh(option, short = 'd', default = "PathBuf::from(\".nestlink\")")]
    data_dir: PathBuf,

    /// role of this device: parent or child
    #[argh(option, short = 't', default = "String::from(\"parent\")")]
    device_type: String,

    /// human-readable device name
    #[argh(option, short = 'n', default = "String::from(\"nestlink-device\")")]
    name: String,
}

/// Send an incident alert or a log batch to the paired peer.
#[derive(FromArgs)]
#[argh(subcommand, name = "send")]
struct SendArgs {
    /// incident report JSON to send as an INCIDENT_ALERT
    #[argh(option)]
    incident: Option<String>,

    /// log batch JSON to send as LOG_DATA
    #[argh(option)]
    log: Option<String>,

    /// directory holding identity and pairing state
    #[argh(option, short = 'd', default = "PathBuf::from(\".nestlink\")")]
    data_dir: PathBuf,
}

/// Print the persisted pairing status.
#[derive(FromArgs)]
#[argh(subcommand, name = "status")]
struct StatusArgs {
    /// directory holding identity and pairing state
    #[argh(option, short = 'd', default = "PathBuf::from(\".nestlink\")")]
    data_dir: PathBuf,
}

/// Clear the pairing.
#[derive(FromArgs)]
#[argh(subcommand, name = "unpair")]
struct UnpairArgs {
    /// directory holding identity and pairing state
    #[argh(option, short = 'd', default = "PathBuf::from(\".nestlink\")")]
    data_dir: PathBuf,
}

fn parse_device_type(raw: &str) -> Result<DeviceType> {
    match raw.to_ascii_lowercase().as_str() {
        "parent" => Ok(DeviceType::Parent),
        "child" => Ok(DeviceType::Child),
        other => bail!("invalid device type '{other}': expected parent or child"),
    }
}

/// This device's LAN address, falling back to loopback when there is none.
fn own_ip() -> IpAddr {
    local_ip_address::local_ip().unwrap_or_else(|e| {
        tracing::warn!("could not determine local IP ({e}), using 127.0.0.1");
        IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Serve(args) => {
            let device_type = parse_device_type(&args.device_type)?;
            service::serve(args, device_type).await
        }
        Commands::Scan(args) => run_scan(args).await,
        Commands::Pair(args) => run_pair(args).await,
        Commands::Send(args) => run_send(args).await,
        Commands::Status(args) => run_status(args).await,
        Commands::Unpair(args) => run_unpair(args).await,
    }
}

async fn run_scan(args: ScanArgs) -> Result<()> {
    let IpAddr::V4(own) = own_ip() else {
        bail!("subnet scanning needs an IPv4 address");
    };
    let scanner = Scanner::new(ScanConfig {
        pairing_port: args.port,
        probe_timeout: std::time::Duration::from_millis(args.timeout_ms),
        ..Default::default()
    });

    // Stream discoveries as they land, then print the sorted summary.
    let (tx, mut rx) = tokio::sync::mpsc::channel::<nestlink_scanner::NetworkDevice>(64);
    let printer = tokio::spawn(async move {
        while let Some(device) = rx.recv().await {
            let marker = if device.has_pairing_port { "pairing" } else { "up" };
            println!("found {:<15} {:>5}ms  [{marker}]", device.ip.to_string(), device.response_time_ms);
        }
    });

    let devices = if args.pairing_only {
        scanner.scan_for_pairing_devices_streaming(own, tx).await
    } else {
        scanner.quick_scan_streaming(own, tx).await
    };
    let _ = printer.await;

    println!(
        "{} device(s) found, fastest first:",
        devices.len()
    );
    for device in devices {
        println!("{}", serde_json::to_string(&device)?);
    }
    Ok(())
}

async fn run_pair(args: PairArgs) -> Result<()> {
    let device_type = parse_device_type(&args.device_type)?;
    let identity = IdentityStore::new(args.data_dir.join("identity.json"))
        .load_or_create(&args.name, device_type, &own_ip().to_string(), 8080)
        .await?;
    let status = Arc::new(StatusStore::load(args.data_dir.join("status.json")).await?);

    let manager = SessionManager::new(
        identity,
        status,
        Arc::new(PairingClient::default()),
        SessionConfig::default(),
    );

    match manager.pair_with(&args.peer, None, None).await? {
        PairingOutcome::Accepted { peer_id } => {
            println!("paired with {} ({})", args.peer, peer_id);
        }
        PairingOutcome::Rejected => {
            println!("pairing rejected by {}", args.peer);
        }
    }
    Ok(())
}

async fn run_send(args: SendArgs) -> Result<()> {
    let status = StatusStore::load(args.data_dir.join("status.json")).await?;
    let snapshot = status.snapshot().await;
    if !snapshot.is_paired {
        bail!("not paired; run `nestlink pair <addr>` first");
    }
    let peer_id = snapshot
        .paired_device_id
        .context("paired status has no peer id")?;
    let peer_addr = snapshot
        .paired_address
        .context("paired status has no peer address")?;

    let identity_raw = tokio::fs::read(args.data_dir.join("identity.json"))
        .await
        .context("no identity; run `nestlink serve` or `nestlink pair` first")?;
    let identity: nestlink_common::DeviceIdentity = serde_json::from_slice(&identity_raw)?;

    let client = PairingClient::default();
    match (args.incident, args.log) {
        (Some(raw), None) => {
            let report: IncidentReport =
                serde_json::from_str(&raw).context("invalid incident report JSON")?;
            client
                .send_incident_alert(identity.device_id, peer_id, &report, &peer_addr)
                .await?;
            println!("incident alert acknowledged by {peer_addr}");
        }
        (None, Some(raw)) => {
            let batch: LogBatch = serde_json::from_str(&raw).context("invalid log batch JSON")?;
            client
                .send_log_data(identity.device_id, peer_id, &batch, &peer_addr)
                .await?;
            println!("log batch acknowledged by {peer_addr}");
        }
        _ => bail!("pass exactly one of --incident or --log"),
    }
    Ok(())
}

async fn run_status(args: StatusArgs) -> Result<()> {
    let status = StatusStore::load(args.data_dir.join("status.json")).await?;
    println!("{}", serde_json::to_string_pretty(&status.snapshot().await)?);
    Ok(())
}

async fn run_unpair(args: UnpairArgs) -> Result<()> {
    let status = StatusStore::load(args.data_dir.join("status.json")).await?;
    let cleared = status.update(|s| s.clear()).await?;
    println!("{}", serde_json::to_string_pretty(&cleared)?);
    Ok(())
}
