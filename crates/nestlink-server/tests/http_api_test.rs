//! Wire-level tests against a live server: raw sockets speaking literal
//! HTTP/1.1, the way a minimal mobile peer would.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

use nestlink_common::policy::AcceptAll;
use nestlink_common::store::StatusStore;
use nestlink_common::{codec, DeviceIdentity, DeviceType, MessageEnvelope, MessageType};
use nestlink_server::{LoggingEvents, PairingServer, Router, RouterState};

async fn start_server(dir: &tempfile::TempDir) -> (SocketAddr, Arc<StatusStore>, watch::Sender<bool>) {
    let status = Arc::new(
        StatusStore::load(dir.path().join("status.json"))
            .await
            .unwrap(),
    );
    let router = Router::new(RouterState {
        identity: DeviceIdentity::generate("child-tablet", DeviceType::Child, "127.0.0.1", 0),
        status: status.clone(),
        policy: Arc::new(AcceptAll),
        events: Arc::new(LoggingEvents),
    });

    let server = PairingServer::bind("127.0.0.1:0".parse().unwrap(), router)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.run(shutdown_rx));
    (addr, status, shutdown_tx)
}

async fn raw_request(addr: SocketAddr, request: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

fn post(path: &str, body: &[u8]) -> String {
    format!(
        "POST {path} HTTP/1.1\r\nHost: test\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        String::from_utf8_lossy(body),
    )
}

fn response_body(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

#[tokio::test]
async fn test_health_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _, _shutdown) = start_server(&dir).await;

    let response = raw_request(
        addr,
        "GET /health HTTP/1.1\r\nHost: test\r\n\r\n".to_string(),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response
        .to_lowercase()
        .contains("content-type: application/json"));
    assert!(response_body(&response).contains("healthy"));
}

#[tokio::test]
async fn test_pairing_handshake_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, status, _shutdown) = start_server(&dir).await;

    let parent = DeviceIdentity::generate("parent-phone", DeviceType::Parent, "127.0.0.1", 9090);
    let request = MessageEnvelope::pairing_request(&parent).unwrap();
    let body = codec::encode_envelope(&request).unwrap();

    let response = raw_request(addr, post("/pair", &body)).await;
    assert!(response.starts_with("HTTP/1.1 200"));

    let reply = codec::decode_envelope(response_body(&response).as_bytes()).unwrap();
    assert_eq!(reply.message_type, MessageType::PairingResponse);
    let decision: String = reply.payload_as().unwrap();
    assert_eq!(decision, "ACCEPTED");

    let snapshot = status.snapshot().await;
    assert!(snapshot.is_paired);
    assert_eq!(snapshot.paired_device_id, Some(parent.device_id));
}

#[tokio::test]
async fn test_heartbeat_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _, _shutdown) = start_server(&dir).await;

    let heartbeat = MessageEnvelope::heartbeat(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
    let body = codec::encode_envelope(&heartbeat).unwrap();

    let response = raw_request(addr, post("/message", &body)).await;
    assert!(response.starts_with("HTTP/1.1 200"));

    let reply = codec::decode_envelope(response_body(&response).as_bytes()).unwrap();
    assert_eq!(reply.message_type, MessageType::Acknowledgment);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _, _shutdown) = start_server(&dir).await;

    let response = raw_request(
        addr,
        "GET /metrics HTTP/1.1\r\nHost: test\r\n\r\n".to_string(),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 404"));
    assert!(response_body(&response).contains("/metrics"));
}

#[tokio::test]
async fn test_listener_survives_a_bad_connection() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _, _shutdown) = start_server(&dir).await;

    // Garbage that is not HTTP at all; the connection dies alone.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"\x00\x01\x02 garbage\r\n\r\n").await.unwrap();
    drop(stream);

    // The listener still answers.
    let response = raw_request(
        addr,
        "GET /health HTTP/1.1\r\nHost: test\r\n\r\n".to_string(),
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"));
}
