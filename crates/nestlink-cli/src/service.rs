//! The `serve` subcommand: runs the full device service — embedded
//! pairing server plus the heartbeat/reconnection session — and tears it
//! down in order on Ctrl-C: accept loop first (no new work), then the
//! heartbeat task, then any in-flight reconnection, then the sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use nestlink_client::PairingClient;
use nestlink_common::policy::{AcceptAll, PairingPolicy, RequireCode};
use nestlink_common::store::{IdentityStore, StatusStore};
use nestlink_common::DeviceType;
use nestlink_server::{LoggingEvents, PairingServer, Router, RouterState};
use nestlink_session::{SessionConfig, SessionManager};

use crate::{own_ip, ServeArgs};

pub async fn serve(args: ServeArgs, device_type: DeviceType) -> Result<()> {
    let bind: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", args.bind))?;

    let identity = IdentityStore::new(args.data_dir.join("identity.json"))
        .load_or_create(&args.name, device_type, &own_ip().to_string(), bind.port())
        .await?;
    tracing::info!(
        "device {} ({}) pairing code {}",
        identity.device_name,
        identity.device_type,
        identity.pairing_code
    );

    let status = Arc::new(StatusStore::load(args.data_dir.join("status.json")).await?);

    let policy: Arc<dyn PairingPolicy> = if args.require_code {
        Arc::new(RequireCode::new(identity.pairing_code.clone()))
    } else {
        Arc::new(AcceptAll)
    };

    let router = Router::new(RouterState {
        identity: identity.clone(),
        status: status.clone(),
        policy,
        events: Arc::new(LoggingEvents),
    });

    // Bind failure (port already in use) aborts startup here.
    let server = PairingServer::bind(bind, router).await?;

    let session_config = SessionConfig {
        heartbeat_interval: Duration::from_secs(args.heartbeat_secs),
        ..Default::default()
    };
    let manager = SessionManager::new(
        identity,
        status,
        Arc::new(PairingClient::default()),
        session_config,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(shutdown_rx));
    let heartbeat_task = manager.clone().spawn_heartbeat();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    // Accept loop first so no new work starts during teardown.
    let _ = shutdown_tx.send(true);
    match server_task.await {
        Ok(result) => result?,
        Err(e) => tracing::warn!("server task ended abnormally: {}", e),
    }
    heartbeat_task.abort();
    manager.stop().await;

    Ok(())
}
