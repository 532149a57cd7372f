//! Data server client.
//!
//! This module provides the `DataClient`, which performs one
//! request/response exchange per call:
//! - Validates the command locally, before touching the network
//! - Connects over TCP and sends the request at the current protocol version
//! - Reads exactly one reply frame and checks its shape
//!
//! There is no retry and no reconnection. A caller that polls simply calls
//! again.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error};

use ams_protocol::message::{BAD_REQUEST, CONNECT_FAILED, UNKNOWN_SERVER_ERROR};
use ams_protocol::{Command, JsonCodec, ProtocolVersion, Request, Response};

use crate::error::{ClientError, Result};

/// Default server host
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port
pub const DEFAULT_PORT: u16 = 50000;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the data client.
///
/// # Example
///
/// ```rust
/// use ams_client::client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     host: "lpar7.example.com".to_string(),
///     io_timeout: Duration::from_secs(2),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,

    /// Server TCP port.
    pub port: u16,

    /// Maximum time to establish the connection.
    pub connect_timeout: Duration,

    /// Maximum time for sending the request and for receiving the reply.
    pub io_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Progress of a single exchange.
///
/// Every exchange ends in `Closed`, from whichever state it failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Idle,
    Connecting,
    SentRequest,
    AwaitingResponse,
    Closed,
}

fn advance(state: &mut ConnectionState, next: ConnectionState) {
    debug!(from = ?*state, to = ?next, "Client connection state");
    *state = next;
}

// ============================================================================
// Data Client
// ============================================================================

/// Client for requesting metrics from the AMS data server.
#[derive(Debug, Clone)]
pub struct DataClient {
    config: ClientConfig,
}

impl DataClient {
    /// Creates a new client.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Creates a client for the default host and port.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ClientConfig::default())
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Requests the data for a command.
    pub async fn fetch(&self, command: Command) -> Result<Response> {
        self.request(command.code()).await
    }

    /// Requests the data for a raw command code.
    ///
    /// Returns an error response, not an `Err`, when the code is unknown,
    /// the server cannot be reached, or the reply is missing or malformed.
    /// `Err` is returned only when the exchange breaks off: a send failure,
    /// a truncated or undecodable reply frame, or a timeout.
    pub async fn request(&self, command: i64) -> Result<Response> {
        let mut state = ConnectionState::Idle;

        if !Command::is_valid_code(command) {
            error!(command, "BUG: Unknown command request for network client");
            return Ok(Response::error(BAD_REQUEST));
        }

        let result = self.exchange(command, &mut state).await;
        advance(&mut state, ConnectionState::Closed);
        result
    }

    async fn exchange(&self, command: i64, state: &mut ConnectionState) -> Result<Response> {
        advance(state, ConnectionState::Connecting);

        let addr = (self.config.host.as_str(), self.config.port);
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!(
                    host = %self.config.host,
                    port = self.config.port,
                    error = %e,
                    "Network error while connecting"
                );
                return Ok(Response::error(CONNECT_FAILED));
            }
            Err(_) => {
                error!(
                    host = %self.config.host,
                    port = self.config.port,
                    "Timed out connecting to server"
                );
                return Ok(Response::error(CONNECT_FAILED));
            }
        };

        // Decode into a plain value first so that shape problems become an
        // error response rather than a codec failure.
        let mut framed = Framed::new(stream, JsonCodec::<Value>::new());

        let request = Request::with_code(command);
        debug!(
            command = request.command,
            version = %ProtocolVersion::CURRENT,
            "Sending request"
        );
        timeout(self.config.io_timeout, framed.send(request))
            .await
            .map_err(|_| ClientError::Timeout)??;
        advance(state, ConnectionState::SentRequest);

        advance(state, ConnectionState::AwaitingResponse);
        let reply = match timeout(self.config.io_timeout, framed.next()).await {
            Ok(Some(Ok(value))) => Some(value),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => {
                debug!("Server closed the connection without data");
                None
            }
            Err(_) => return Err(ClientError::Timeout),
        };

        let response = interpret_reply(reply);
        debug!(response = ?response, "Data returned to client");
        Ok(response)
    }
}

/// Requests `command` from the server at `host:port` with default timeouts.
pub async fn request(host: &str, port: u16, command: i64) -> Result<Response> {
    let config = ClientConfig {
        host: host.to_string(),
        port,
        ..Default::default()
    };
    DataClient::new(config).request(command).await
}

/// Turns the decoded reply (if any) into a response.
fn interpret_reply(reply: Option<Value>) -> Response {
    match reply {
        Some(value) if value.get("result").is_some() => serde_json::from_value(value)
            .unwrap_or_else(|e| {
                debug!(error = %e, "Reply does not match the response schema");
                Response::error(UNKNOWN_SERVER_ERROR)
            }),
        _ => Response::error(UNKNOWN_SERVER_ERROR),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ams_protocol::{decode_frame, encode_frame};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client_for(port: u16) -> DataClient {
        DataClient::new(ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_millis(500),
        })
    }

    /// Accepts one connection, reads the request frame, then replies with
    /// `reply` verbatim and closes.
    async fn one_shot_server(reply: Vec<u8>) -> (u16, tokio::task::JoinHandle<Request>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut len = [0u8; 4];
            stream.read_exact(&mut len).await.unwrap();
            let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
            stream.read_exact(&mut body).await.unwrap();
            stream.write_all(&reply).await.unwrap();
            stream.shutdown().await.unwrap();

            let mut frame = len.to_vec();
            frame.extend_from_slice(&body);
            decode_frame::<Request>(&frame).unwrap()
        });

        (port, handle)
    }

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 50000);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_interpret_reply() {
        assert_eq!(interpret_reply(None), Response::error(UNKNOWN_SERVER_ERROR));
        assert_eq!(
            interpret_reply(Some(json!([1, 2, 3]))),
            Response::error(UNKNOWN_SERVER_ERROR)
        );
        assert_eq!(
            interpret_reply(Some(json!({"data": {}}))),
            Response::error(UNKNOWN_SERVER_ERROR)
        );
        assert_eq!(
            interpret_reply(Some(json!({"result": "error", "data": "Unsupported request"}))),
            Response::error("Unsupported request")
        );
    }

    #[test]
    fn test_interpret_reply_bad_schema() {
        let reply = json!({"result": "success", "data": 17});
        assert_eq!(interpret_reply(Some(reply)), Response::error(UNKNOWN_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_bad_command_never_connects() {
        // Nothing listens here; a connection attempt would report CONNECT_FAILED.
        let client = client_for(unused_port().await);
        for code in [-1, Command::MAX + 1] {
            assert_eq!(client.request(code).await.unwrap(), Response::error(BAD_REQUEST));
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_a_response() {
        let port = unused_port().await;
        let response = request("127.0.0.1", port, Command::GetSysData.code())
            .await
            .unwrap();
        assert_eq!(response, Response::error(CONNECT_FAILED));
    }

    #[tokio::test]
    async fn test_sends_current_version() {
        let reply = encode_frame(&Response::error("x")).unwrap().to_vec();
        let (port, server) = one_shot_server(reply).await;

        client_for(port).fetch(Command::GetAllData).await.unwrap();
        let request = server.await.unwrap();
        assert_eq!(request, Request::new(Command::GetAllData));
        assert!(request.version.is_current());
    }

    #[tokio::test]
    async fn test_server_closing_without_data() {
        let (port, _server) = one_shot_server(Vec::new()).await;
        let response = client_for(port).fetch(Command::GetSysData).await.unwrap();
        assert_eq!(response, Response::error(UNKNOWN_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_reply_without_result() {
        let reply = encode_frame(&json!({"status": "ok"})).unwrap().to_vec();
        let (port, _server) = one_shot_server(reply).await;
        let response = client_for(port).fetch(Command::GetSysData).await.unwrap();
        assert_eq!(response, Response::error(UNKNOWN_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_truncated_reply_is_an_error() {
        let mut reply = encode_frame(&Response::error("cut short")).unwrap().to_vec();
        reply.truncate(reply.len() - 3);
        let (port, _server) = one_shot_server(reply).await;

        let result = client_for(port).fetch(Command::GetSysData).await;
        assert!(matches!(result, Err(ClientError::Codec(_))));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let result = client_for(port).fetch(Command::GetSysData).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
    }
}
