use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;

use nestlink_common::codec;
use nestlink_common::policy::PairingPolicy;
use nestlink_common::store::StatusStore;
use nestlink_common::{
    DeviceIdentity, IncidentReport, LogBatch, MessageEnvelope, MessageType, NestlinkError,
    PAIRING_ACCEPTED, PAIRING_REJECTED,
};

use crate::events::LinkEvents;

/// Responses always carry a full body.
pub type HyperResponse = Response<http_body_util::Full<Bytes>>;

/// Request bodies above this are rejected before decoding.
const MAX_BODY_BYTES: usize = 10 * 1024;

/// Everything a request handler needs, injected at construction.
pub struct RouterState {
    /// This device's own identity (the envelope sender for replies).
    pub identity: DeviceIdentity,
    pub status: Arc<StatusStore>,
    pub policy: Arc<dyn PairingPolicy>,
    pub events: Arc<dyn LinkEvents>,
}

/// Routes `(method, path)` to the pairing, message and health handlers.
pub struct Router {
    state: Arc<RouterState>,
}

impl Router {
    pub fn new(state: RouterState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Handles one request. Never fails; every outcome is an HTTP response.
    pub async fn handle<B>(&self, req: Request<B>) -> HyperResponse
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if method == Method::POST && path == "/pair" {
            match read_envelope(req).await {
                Ok(envelope) => self.handle_pair(envelope).await,
                Err(e) => error_response(&e),
            }
        } else if method == Method::POST && path == "/message" {
            match read_envelope(req).await {
                Ok(envelope) => self.handle_message(envelope).await,
                Err(e) => error_response(&e),
            }
        } else if method == Method::GET && path == "/health" {
            json_response(StatusCode::OK, json!({"status": "healthy"}))
        } else {
            tracing::debug!("no route for {} {}", method, path);
            json_response(
                StatusCode::NOT_FOUND,
                json!({"error": "no such route", "path": path, "method": method.as_str()}),
            )
        }
    }

    async fn handle_pair(&self, envelope: MessageEnvelope) -> HyperResponse {
        if envelope.message_type != MessageType::PairingRequest {
            return error_response(&NestlinkError::UnexpectedMessageType {
                expected: MessageType::PairingRequest.to_string(),
                actual: envelope.message_type.to_string(),
            });
        }

        let peer: DeviceIdentity = match envelope.payload_as() {
            Ok(peer) => peer,
            Err(_) => {
                return error_response(&NestlinkError::MalformedEnvelope(
                    "pairing request payload is not a device identity".to_string(),
                ));
            }
        };

        let accepted = self.state.policy.allow(&peer);
        if accepted {
            let update = self
                .state
                .status
                .update(|s| {
                    s.set_paired(
                        peer.device_id,
                        Some(peer.device_name.clone()),
                        Some(peer.device_type),
                        peer.address(),
                    );
                })
                .await;
            if let Err(e) = update {
                tracing::error!("failed to persist pairing: {}", e);
                return error_response(&e);
            }
            self.state.events.peer_paired(&peer);
        } else {
            tracing::info!(
                "rejected pairing request from {} ({})",
                peer.device_name,
                peer.device_id
            );
        }

        let decision = if accepted {
            PAIRING_ACCEPTED
        } else {
            PAIRING_REJECTED
        };
        match MessageEnvelope::pairing_response(
            self.state.identity.device_id,
            peer.device_id,
            decision,
        ) {
            Ok(reply) => envelope_response(&reply),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_message(&self, envelope: MessageEnvelope) -> HyperResponse {
        match &envelope.message_type {
            MessageType::Heartbeat => {
                let update = self
                    .state
                    .status
                    .update(|s| {
                        if s.is_paired {
                            s.touch_heartbeat();
                            s.connection_status = nestlink_common::ConnectionStatus::Connected;
                        }
                    })
                    .await;
                if let Err(e) = update {
                    tracing::error!("failed to persist heartbeat: {}", e);
                    return error_response(&e);
                }
                self.acknowledge(&envelope)
            }
            MessageType::LogData => match envelope.payload_as::<LogBatch>() {
                Ok(batch) => {
                    self.state.events.log_data(batch);
                    self.acknowledge(&envelope)
                }
                Err(_) => error_response(&NestlinkError::MalformedEnvelope(
                    "log data payload is not a log batch".to_string(),
                )),
            },
            MessageType::IncidentAlert => match envelope.payload_as::<IncidentReport>() {
                Ok(report) => {
                    self.state.events.incident_alert(report);
                    self.acknowledge(&envelope)
                }
                Err(_) => error_response(&NestlinkError::MalformedEnvelope(
                    "incident alert payload is not an incident report".to_string(),
                )),
            },
            other => {
                // Log-and-ignore for unknown tags, but tell the sender.
                tracing::warn!("unroutable message type on /message: {}", other);
                json_response(
                    StatusCode::BAD_REQUEST,
                    json!({"error": "unsupported message type", "messageType": other.as_wire()}),
                )
            }
        }
    }

    fn acknowledge(&self, incoming: &MessageEnvelope) -> HyperResponse {
        let ack =
            MessageEnvelope::acknowledgment(self.state.identity.device_id, incoming.sender_id);
        envelope_response(&ack)
    }
}

/// Reads and decodes the body, enforcing the size cap both from the
/// declared Content-Length and from the bytes actually read.
async fn read_envelope<B>(req: Request<B>) -> Result<MessageEnvelope, NestlinkError>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    if let Some(declared) = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if declared > MAX_BODY_BYTES {
            return Err(NestlinkError::PayloadTooLarge(declared));
        }
    }

    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| NestlinkError::Transport(format!("failed to read request body: {e}")))?
        .to_bytes();

    if body.len() > MAX_BODY_BYTES {
        return Err(NestlinkError::PayloadTooLarge(body.len()));
    }

    codec::decode_envelope(&body)
}

fn envelope_response(envelope: &MessageEnvelope) -> HyperResponse {
    match serde_json::to_value(envelope) {
        Ok(value) => json_response(StatusCode::OK, value),
        Err(e) => error_response(&NestlinkError::Serialization(e)),
    }
}

fn error_response(error: &NestlinkError) -> HyperResponse {
    let status = match error {
        NestlinkError::MalformedEnvelope(_)
        | NestlinkError::UnexpectedMessageType { .. }
        | NestlinkError::Serialization(_) => StatusCode::BAD_REQUEST,
        NestlinkError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_response(status, json!({"error": error.to_string()}))
}

fn json_response(status: StatusCode, body: serde_json::Value) -> HyperResponse {
    let bytes = Bytes::from(body.to_string());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .header(CONNECTION, "close")
        .body(http_body_util::Full::new(bytes.clone()))
        .unwrap_or_else(|_| Response::new(http_body_util::Full::new(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use nestlink_common::policy::{AcceptAll, RequireCode};
    use nestlink_common::{ConnectionStatus, DeviceType};
    use std::sync::Mutex;

    struct RecordingEvents {
        paired: Mutex<Vec<DeviceIdentity>>,
        incidents: Mutex<Vec<IncidentReport>>,
        logs: Mutex<Vec<LogBatch>>,
    }

    impl RecordingEvents {
        fn new() -> Self {
            Self {
                paired: Mutex::new(Vec::new()),
                incidents: Mutex::new(Vec::new()),
                logs: Mutex::new(Vec::new()),
            }
        }
    }

    impl LinkEvents for RecordingEvents {
        fn peer_paired(&self, peer: &DeviceIdentity) {
            self.paired.lock().unwrap().push(peer.clone());
        }
        fn incident_alert(&self, report: IncidentReport) {
            self.incidents.lock().unwrap().push(report);
        }
        fn log_data(&self, batch: LogBatch) {
            self.logs.lock().unwrap().push(batch);
        }
    }

    async fn test_router(
        policy: Arc<dyn PairingPolicy>,
    ) -> (Router, Arc<StatusStore>, Arc<RecordingEvents>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusStore::load(dir.path().join("status.json")).await.unwrap());
        let events = Arc::new(RecordingEvents::new());
        let identity = DeviceIdentity::generate("child-tablet", DeviceType::Child, "10.0.0.5", 8080);
        let router = Router::new(RouterState {
            identity,
            status: status.clone(),
            policy,
            events: events.clone(),
        });
        (router, status, events, dir)
    }

    fn post(path: &str, body: &MessageEnvelope) -> Request<Full<Bytes>> {
        let bytes = codec::encode_envelope(body).unwrap();
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_LENGTH, bytes.len())
            .body(Full::new(Bytes::from(bytes)))
            .unwrap()
    }

    async fn body_json(response: HyperResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn parent() -> DeviceIdentity {
        DeviceIdentity::generate("parent-phone", DeviceType::Parent, "10.0.0.4", 8080)
    }

    #[tokio::test]
    async fn test_health_route() {
        let (router, _, _, _dir) = test_router(Arc::new(AcceptAll)).await;
        let req = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = router.handle(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_unmatched_route_names_path_and_method() {
        let (router, _, _, _dir) = test_router(Arc::new(AcceptAll)).await;
        let req = Request::builder()
            .method(Method::DELETE)
            .uri("/nothing")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = router.handle(req).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["path"], "/nothing");
        assert_eq!(body["method"], "DELETE");
    }

    #[tokio::test]
    async fn test_pair_accepted_persists_and_notifies() {
        let (router, status, events, _dir) = test_router(Arc::new(AcceptAll)).await;
        let requester = parent();
        let envelope = MessageEnvelope::pairing_request(&requester).unwrap();

        let response = router.handle(post("/pair", &envelope)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let reply = codec::decode_envelope(
            &serde_json::to_vec(&body_json(response).await).unwrap(),
        )
        .unwrap();
        assert_eq!(reply.message_type, MessageType::PairingResponse);
        let decision: String = reply.payload_as().unwrap();
        assert_eq!(decision, PAIRING_ACCEPTED);

        let snapshot = status.snapshot().await;
        assert!(snapshot.is_paired);
        assert_eq!(snapshot.paired_device_id, Some(requester.device_id));
        assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
        assert_eq!(events.paired.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pair_rejected_by_policy() {
        let (router, status, events, _dir) = test_router(Arc::new(RequireCode::new("000001"))).await;
        let envelope = MessageEnvelope::pairing_request(&parent()).unwrap();

        let response = router.handle(post("/pair", &envelope)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let reply = codec::decode_envelope(
            &serde_json::to_vec(&body_json(response).await).unwrap(),
        )
        .unwrap();
        let decision: String = reply.payload_as().unwrap();
        assert_eq!(decision, PAIRING_REJECTED);

        assert!(!status.snapshot().await.is_paired);
        assert!(events.paired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pair_with_wrong_message_type_is_400() {
        let (router, _, _, _dir) = test_router(Arc::new(AcceptAll)).await;
        let envelope =
            MessageEnvelope::heartbeat(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());

        let response = router.handle(post("/pair", &envelope)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_heartbeat_updates_status_and_acks() {
        let (router, status, _, _dir) = test_router(Arc::new(AcceptAll)).await;
        let requester = parent();
        router
            .handle(post(
                "/pair",
                &MessageEnvelope::pairing_request(&requester).unwrap(),
            ))
            .await;
        let before = status.snapshot().await.last_heartbeat;

        let heartbeat =
            MessageEnvelope::heartbeat(requester.device_id, uuid::Uuid::new_v4());
        let response = router.handle(post("/message", &heartbeat)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let reply = codec::decode_envelope(
            &serde_json::to_vec(&body_json(response).await).unwrap(),
        )
        .unwrap();
        assert_eq!(reply.message_type, MessageType::Acknowledgment);
        assert_eq!(reply.recipient_id, requester.device_id);

        let after = status.snapshot().await.last_heartbeat;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_incident_alert_reaches_collaborator() {
        let (router, _, events, _dir) = test_router(Arc::new(AcceptAll)).await;
        let report = IncidentReport {
            detection_type: "KEYWORD_MATCH".to_string(),
            description: "matched term".to_string(),
            confidence: 0.8,
            timestamp: 1,
        };
        let envelope = MessageEnvelope::incident_alert(
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4(),
            &report,
        )
        .unwrap();

        let response = router.handle(post("/message", &envelope)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(events.incidents.lock().unwrap().len(), 1);
        assert_eq!(events.incidents.lock().unwrap()[0], report);
    }

    #[tokio::test]
    async fn test_unknown_type_on_message_is_400() {
        let (router, _, _, _dir) = test_router(Arc::new(AcceptAll)).await;
        let envelope = MessageEnvelope::new(
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4(),
            MessageType::Unknown("SCREEN_MIRROR".to_string()),
            "{}".to_string(),
            false,
        );

        let response = router.handle(post("/message", &envelope)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["messageType"], "SCREEN_MIRROR");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (router, _, _, _dir) = test_router(Arc::new(AcceptAll)).await;
        let huge = vec![b'x'; MAX_BODY_BYTES + 1];
        let req = Request::builder()
            .method(Method::POST)
            .uri("/message")
            .header(CONTENT_LENGTH, huge.len())
            .body(Full::new(Bytes::from(huge)))
            .unwrap();

        let response = router.handle(req).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_garbage_body_is_400() {
        let (router, _, _, _dir) = test_router(Arc::new(AcceptAll)).await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/message")
            .body(Full::new(Bytes::from_static(b"not an envelope")))
            .unwrap();

        let response = router.handle(req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
