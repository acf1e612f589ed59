use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use uuid::Uuid;

use nestlink_common::{
    codec, DeviceIdentity, IncidentReport, LogBatch, MessageEnvelope, MessageType, NestlinkError,
    Result, PAIRING_ACCEPTED,
};

/// Client timeouts. The pre-check is deliberately much shorter than the
/// request timeout: its whole point is failing fast on a dead peer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub precheck_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            precheck_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// What the peer decided about our pairing request.
///
/// `Rejected` is a normal outcome, not an error; `peer_id` is the
/// responder's device id, read from the response envelope's sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    Accepted { peer_id: Uuid },
    Rejected,
}

/// Outbound client. One fresh connection per request; the protocol has no
/// keep-alive.
pub struct PairingClient {
    config: ClientConfig,
}

impl PairingClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Sends our identity to the peer's `/pair` endpoint.
    pub async fn pair(&self, own: &DeviceIdentity, peer_addr: &str) -> Result<PairingOutcome> {
        self.precheck(peer_addr).await?;

        let request = MessageEnvelope::pairing_request(own)?;
        let reply = self.post_envelope(peer_addr, "/pair", &request).await?;
        expect_type(&reply, &MessageType::PairingResponse)?;

        let decision: String = reply.payload_as()?;
        if decision == PAIRING_ACCEPTED {
            Ok(PairingOutcome::Accepted {
                peer_id: reply.sender_id,
            })
        } else {
            Ok(PairingOutcome::Rejected)
        }
    }

    /// Sends any channel envelope to the peer's `/message` endpoint and
    /// returns the acknowledgment envelope.
    pub async fn send(&self, envelope: &MessageEnvelope, peer_addr: &str) -> Result<MessageEnvelope> {
        self.precheck(peer_addr).await?;

        let reply = self.post_envelope(peer_addr, "/message", envelope).await?;
        expect_type(&reply, &MessageType::Acknowledgment)?;
        Ok(reply)
    }

    pub async fn send_heartbeat(
        &self,
        own_id: Uuid,
        peer_id: Uuid,
        peer_addr: &str,
    ) -> Result<MessageEnvelope> {
        self.send(&MessageEnvelope::heartbeat(own_id, peer_id), peer_addr)
            .await
    }

    pub async fn send_log_data(
        &self,
        own_id: Uuid,
        peer_id: Uuid,
        batch: &LogBatch,
        peer_addr: &str,
    ) -> Result<MessageEnvelope> {
        self.send(
            &MessageEnvelope::log_data(own_id, peer_id, batch)?,
            peer_addr,
        )
        .await
    }

    pub async fn send_incident_alert(
        &self,
        own_id: Uuid,
        peer_id: Uuid,
        report: &IncidentReport,
        peer_addr: &str,
    ) -> Result<MessageEnvelope> {
        self.send(
            &MessageEnvelope::incident_alert(own_id, peer_id, report)?,
            peer_addr,
        )
        .await
    }

    /// `GET /health` against a candidate peer; used for diagnostics and to
    /// confirm a scan hit really is a pairing server.
    pub async fn check_health(&self, peer_addr: &str) -> Result<()> {
        self.precheck(peer_addr).await?;

        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("http://{peer_addr}/health"))
            .body(Full::new(Bytes::new()))
            .map_err(|e| NestlinkError::Transport(format!("failed to build request: {e}")))?;

        let (status, _body) = self.dispatch(request).await?;
        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(NestlinkError::Transport(format!(
                "health check returned HTTP {status}"
            )))
        }
    }

    /// Cheap TCP connect test. A peer that does not pass this gets a
    /// descriptive `Unreachable` without spending the HTTP timeout.
    async fn precheck(&self, peer_addr: &str) -> Result<()> {
        match tokio::time::timeout(
            self.config.precheck_timeout,
            tokio::net::TcpStream::connect(peer_addr),
        )
        .await
        {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(NestlinkError::Unreachable(format!("{peer_addr}: {e}"))),
            Err(_) => Err(NestlinkError::Unreachable(format!(
                "{peer_addr}: no answer within {}ms",
                self.config.precheck_timeout.as_millis()
            ))),
        }
    }

    async fn post_envelope(
        &self,
        peer_addr: &str,
        path: &str,
        envelope: &MessageEnvelope,
    ) -> Result<MessageEnvelope> {
        let body = codec::encode_envelope(envelope)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("http://{peer_addr}{path}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| NestlinkError::Transport(format!("failed to build request: {e}")))?;

        let (status, body) = self.dispatch(request).await?;
        if status != StatusCode::OK {
            return Err(NestlinkError::Transport(format!(
                "{path} returned HTTP {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }
        codec::decode_envelope(&body)
    }

    /// Sends one request on a fresh connection, bounded by the request
    /// timeout, and returns status plus collected body.
    async fn dispatch(&self, request: Request<Full<Bytes>>) -> Result<(StatusCode, Bytes)> {
        let client = Client::builder(TokioExecutor::new()).build_http();

        let response = tokio::time::timeout(self.config.request_timeout, client.request(request))
            .await
            .map_err(|_| NestlinkError::Timeout(self.config.request_timeout.as_millis() as u64))?
            .map_err(|e| NestlinkError::ConnectionFailed(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| NestlinkError::ConnectionFailed(format!("failed to read response: {e}")))?
            .to_bytes();
        Ok((status, body))
    }
}

impl Default for PairingClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

fn expect_type(envelope: &MessageEnvelope, expected: &MessageType) -> Result<()> {
    if &envelope.message_type == expected {
        Ok(())
    } else {
        Err(NestlinkError::UnexpectedMessageType {
            expected: expected.to_string(),
            actual: envelope.message_type.to_string(),
        })
    }
}
