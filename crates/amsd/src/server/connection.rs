//! Handler for a single client connection.
//!
//! A connection carries exactly one exchange:
//! - Read one request frame (bounded by the read timeout)
//! - Validate and dispatch it through the registry
//! - Write one response frame (bounded by the write timeout)
//!
//! The handler owns the stream, so it is closed whenever `run` returns,
//! whichever path was taken.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use ams_protocol::message::BAD_CLIENT_REQUEST;
use ams_protocol::{CodecError, JsonCodec, Request, Response};

use crate::registry::CommandRegistry;

/// Connection handler for a single client.
pub struct ConnectionHandler<'a, S> {
    /// Framed stream decoding requests and encoding responses
    framed: Framed<S, JsonCodec<Request>>,

    /// Peer address, for logging
    peer: Option<SocketAddr>,

    /// Shared command registry
    registry: &'a CommandRegistry,

    read_timeout: Duration,
    write_timeout: Duration,

    /// Sequence number of this connection
    connection_number: u64,
}

impl<'a, S> ConnectionHandler<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    pub fn new(
        stream: S,
        peer: Option<SocketAddr>,
        registry: &'a CommandRegistry,
        read_timeout: Duration,
        write_timeout: Duration,
        connection_number: u64,
    ) -> Self {
        Self {
            framed: Framed::new(stream, JsonCodec::new()),
            peer,
            registry,
            read_timeout,
            write_timeout,
            connection_number,
        }
    }

    /// Serves the connection and closes it.
    ///
    /// A request that cannot be decoded is answered with a bad-request
    /// error. The only error returned is a failure to deliver the response.
    pub async fn run(mut self) -> Result<Response, ConnectionError> {
        debug!(
            connection = self.connection_number,
            peer = ?self.peer,
            "Client connected"
        );

        let response = match self.read_request().await {
            Ok(request) => self.registry.respond(&request),
            Err(e) => {
                debug!(
                    connection = self.connection_number,
                    error = %e,
                    "Unable to parse client request"
                );
                info!(peer = ?self.peer, "Bad client request, ignoring");
                Response::error(BAD_CLIENT_REQUEST)
            }
        };

        self.send_response(response.clone()).await?;

        debug!(connection = self.connection_number, "Closing client connection");
        Ok(response)
    }

    /// Reads the single request frame.
    async fn read_request(&mut self) -> Result<Request, ConnectionError> {
        match timeout(self.read_timeout, self.framed.next()).await {
            Ok(Some(Ok(request))) => Ok(request),
            Ok(Some(Err(e))) => Err(ConnectionError::Decode(e)),
            Ok(None) => Err(ConnectionError::Eof),
            Err(_) => Err(ConnectionError::ReadTimeout),
        }
    }

    /// Writes the response frame and flushes it.
    async fn send_response(&mut self, response: Response) -> Result<(), ConnectionError> {
        match timeout(self.write_timeout, self.framed.send(response)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Send(e)),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to decode request: {0}")]
    Decode(CodecError),

    #[error("Failed to send response: {0}")]
    Send(CodecError),

    #[error("Connection closed before a request was received")]
    Eof,

    #[error("Read timeout")]
    ReadTimeout,

    #[error("Write timeout")]
    WriteTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ams_core::{AllData, DataProvider, DeviceMetrics, GatherResult, MetricValue, Metrics};
    use ams_protocol::message::UNSUPPORTED_REQUEST;
    use ams_protocol::{decode_frame, encode_frame, Command, ProtocolVersion};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    const TIMEOUT: Duration = Duration::from_millis(200);

    struct FixedProvider;

    impl DataProvider for FixedProvider {
        fn gather_all_data(&self) -> GatherResult<AllData> {
            Ok((system(), Metrics::new(), DeviceMetrics::new()))
        }

        fn gather_system_data(&self) -> GatherResult<Metrics> {
            Ok(system())
        }
    }

    fn system() -> Metrics {
        let mut m = Metrics::new();
        m.insert("memfree".to_string(), MetricValue::Integer(400_000));
        m
    }

    async fn exchange(registry: &CommandRegistry, input: &[u8]) -> (Result<Response, ConnectionError>, Vec<u8>) {
        let (server_side, mut client_side) = duplex(64 * 1024);
        client_side.write_all(input).await.unwrap();
        client_side.shutdown().await.unwrap();

        let handler: ConnectionHandler<'_, DuplexStream> =
            ConnectionHandler::new(server_side, None, registry, TIMEOUT, TIMEOUT, 1);
        let result = handler.run().await;

        let mut output = Vec::new();
        client_side.read_to_end(&mut output).await.unwrap();
        (result, output)
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::new(Arc::new(FixedProvider))
    }

    #[tokio::test]
    async fn test_valid_request_gets_data() {
        let registry = registry();
        let frame = encode_frame(&Request::new(Command::GetSysData)).unwrap();

        let (result, output) = exchange(&registry, &frame).await;
        let response: Response = decode_frame(&output).unwrap();
        assert!(response.is_success());
        assert_eq!(result.unwrap(), response);
    }

    #[tokio::test]
    async fn test_garbage_is_a_bad_request() {
        let registry = registry();
        let (result, output) = exchange(&registry, b"\x00\x00\x00\x03abc").await;

        assert!(result.is_ok());
        let response: Response = decode_frame(&output).unwrap();
        assert_eq!(response, Response::error(BAD_CLIENT_REQUEST));
    }

    #[tokio::test]
    async fn test_empty_connection_is_a_bad_request() {
        let registry = registry();
        let (_, output) = exchange(&registry, b"").await;

        let response: Response = decode_frame(&output).unwrap();
        assert_eq!(response, Response::error(BAD_CLIENT_REQUEST));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let registry = registry();
        let frame = encode_frame(&Request::with_code(5)).unwrap();

        let (_, output) = exchange(&registry, &frame).await;
        let response: Response = decode_frame(&output).unwrap();
        assert_eq!(response, Response::error(UNSUPPORTED_REQUEST));
    }

    #[tokio::test]
    async fn test_incompatible_version() {
        let registry = registry();
        let request = Request::new(Command::GetAllData).at_version(ProtocolVersion::new(3, 0));
        let frame = encode_frame(&request).unwrap();

        let (_, output) = exchange(&registry, &frame).await;
        let response: Response = decode_frame(&output).unwrap();
        assert!(response
            .error_message()
            .is_some_and(|m| m.contains(&ProtocolVersion::CURRENT.to_string())));
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let registry = registry();
        let (server_side, mut client_side) = duplex(1024);

        let handler = ConnectionHandler::new(server_side, None, &registry, TIMEOUT, TIMEOUT, 1);
        let result = handler.run().await;
        assert_eq!(result.unwrap(), Response::error(BAD_CLIENT_REQUEST));

        let mut output = Vec::new();
        client_side.read_to_end(&mut output).await.unwrap();
        let response: Response = decode_frame(&output).unwrap();
        assert_eq!(response, Response::error(BAD_CLIENT_REQUEST));
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::Decode(CodecError::Incomplete);
        assert!(err.to_string().contains("Incomplete"));
    }
}
