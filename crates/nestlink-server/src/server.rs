use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use nestlink_common::{NestlinkError, Result};

use crate::router::Router;

/// The embedded pairing/message server.
///
/// One long-lived accept loop, one short-lived task per accepted
/// connection. Binding and running are split so callers (and tests) can
/// learn the bound address before the loop starts.
pub struct PairingServer {
    router: Arc<Router>,
    listener: TcpListener,
}

impl PairingServer {
    /// Binds the listener. A port already in use is a fatal startup error
    /// surfaced here, not retried.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NestlinkError::Bind(format!("{addr}: {e}")))?;
        Ok(Self {
            router: Arc::new(router),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| NestlinkError::Bind(format!("no local addr: {e}")))
    }

    /// Runs the accept loop until `shutdown` fires.
    ///
    /// Accept errors affect only the failed accept; connection errors
    /// affect only their connection. Teardown cancels this loop first so
    /// no new work starts while the rest of the subsystem stops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("pairing server listening on {}", addr);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("pairing server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!("failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    tracing::debug!("connection from {}", peer_addr);

                    let io = TokioIo::new(stream);
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let router = router.clone();
                            async move { Ok::<_, Infallible>(router.handle(req).await) }
                        });
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            tracing::debug!("connection from {} ended: {}", peer_addr, e);
                        }
                    });
                }
            }
        }
    }
}
