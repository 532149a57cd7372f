//! Robustness tests for the data server.
//!
//! Misbehaving clients must get an error response (or be dropped) without
//! ending the accept loop. Every test finishes with a well-formed request to
//! prove the server is still serving.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ams_core::{AllData, DataProvider, DeviceMetrics, GatherResult, MetricValue, Metrics};
use ams_protocol::message::BAD_CLIENT_REQUEST;
use ams_protocol::{decode_frame, encode_frame, Command, Request, Response, MAX_FRAME_SIZE};
use amsd::{CommandRegistry, DataServer, ServerConfig, ServerError};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Short enough to keep stalled-client tests quick
const SERVER_TIMEOUT: Duration = Duration::from_millis(300);

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

struct FixedProvider;

impl DataProvider for FixedProvider {
    fn gather_all_data(&self) -> GatherResult<AllData> {
        Ok((self.gather_system_data()?, Metrics::new(), DeviceMetrics::new()))
    }

    fn gather_system_data(&self) -> GatherResult<Metrics> {
        let mut m = Metrics::new();
        m.insert("memtotal".to_string(), MetricValue::Integer(1_000_000));
        Ok(m)
    }
}

struct TestServer {
    addr: SocketAddr,
    cancel_token: CancellationToken,
}

impl TestServer {
    fn spawn() -> Self {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            read_timeout: SERVER_TIMEOUT,
            write_timeout: SERVER_TIMEOUT,
        };
        let cancel_token = CancellationToken::new();
        let registry = CommandRegistry::new(Arc::new(FixedProvider));
        let server = DataServer::bind(config, registry, cancel_token.clone()).expect("bind");
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        Self { addr, cancel_token }
    }

    /// Writes `bytes`, half-closes, and returns everything the server sent.
    async fn send_raw(&self, bytes: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(bytes).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        timeout(REPLY_TIMEOUT, stream.read_to_end(&mut reply))
            .await
            .expect("server reply")
            .unwrap();
        reply
    }

    async fn assert_still_serving(&self) {
        let frame = encode_frame(&Request::new(Command::GetSysData)).unwrap();
        let reply = self.send_raw(&frame).await;
        let response: Response = decode_frame(&reply).unwrap();
        assert!(response.is_success(), "server stopped serving: {response:?}");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

fn frame_of(body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    buf.to_vec()
}

fn bad_request(reply: &[u8]) {
    let response: Response = decode_frame(reply).unwrap();
    assert_eq!(response, Response::error(BAD_CLIENT_REQUEST));
}

// ============================================================================
// Malformed Input
// ============================================================================

#[tokio::test]
async fn test_malformed_json_then_valid_request() {
    let server = TestServer::spawn();

    bad_request(&server.send_raw(&frame_of(b"{\"command\": ")).await);
    server.assert_still_serving().await;
}

#[tokio::test]
async fn test_wrong_field_types() {
    let server = TestServer::spawn();

    let bodies: [&[u8]; 4] = [
        br#"{"command": "0", "version": {"major": 1, "minor": 0}}"#,
        br#"{"command": 0}"#,
        br#"{"version": {"major": 1, "minor": 0}}"#,
        br#""GET_SYS_DATA""#,
    ];
    for body in bodies {
        bad_request(&server.send_raw(&frame_of(body)).await);
    }

    server.assert_still_serving().await;
}

#[tokio::test]
async fn test_truncated_frame() {
    let server = TestServer::spawn();

    let frame = encode_frame(&Request::new(Command::GetAllData)).unwrap();
    bad_request(&server.send_raw(&frame[..frame.len() - 4]).await);

    server.assert_still_serving().await;
}

#[tokio::test]
async fn test_oversized_frame_header() {
    let server = TestServer::spawn();

    let mut header = BytesMut::new();
    header.put_u32(MAX_FRAME_SIZE as u32 + 1);
    bad_request(&server.send_raw(&header).await);

    server.assert_still_serving().await;
}

#[tokio::test]
async fn test_empty_connection() {
    let server = TestServer::spawn();

    bad_request(&server.send_raw(&[]).await);

    server.assert_still_serving().await;
}

#[tokio::test]
async fn test_client_disconnecting_without_reading() {
    let server = TestServer::spawn();

    for _ in 0..5 {
        let stream = TcpStream::connect(server.addr).await.unwrap();
        drop(stream);
    }
    sleep(Duration::from_millis(50)).await;

    server.assert_still_serving().await;
}

// ============================================================================
// Stalled Clients
// ============================================================================

#[tokio::test]
async fn test_stalled_client_does_not_block_forever() {
    let server = TestServer::spawn();

    // Sends half a length prefix and then nothing.
    let mut stalled = TcpStream::connect(server.addr).await.unwrap();
    stalled.write_all(&[0, 0]).await.unwrap();

    // Queued behind the stalled client until its read timeout expires.
    server.assert_still_serving().await;

    let mut reply = Vec::new();
    timeout(REPLY_TIMEOUT, stalled.read_to_end(&mut reply))
        .await
        .expect("stalled client is answered")
        .unwrap();
    bad_request(&reply);
}

// ============================================================================
// Bind Failures
// ============================================================================

#[tokio::test]
async fn test_bind_conflict() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let config = ServerConfig {
        bind_addr: addr,
        ..Default::default()
    };
    let registry = CommandRegistry::new(Arc::new(FixedProvider));
    let result = DataServer::bind(config, registry, CancellationToken::new());

    match result {
        Err(ServerError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
        Err(e) => panic!("expected bind error, got {e}"),
        Ok(_) => panic!("bound an address already in use"),
    }
}
