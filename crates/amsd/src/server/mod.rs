//! TCP server for the AMS data server.
//!
//! The server:
//! - Binds a TCP listener with address reuse enabled
//! - Accepts one connection at a time and serves it to completion before
//!   accepting the next
//! - Stops on cancellation (operator interrupt) or on a listener failure
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DataServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()  (sequential)
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│ CommandRegistry │────▶│  DataProvider   │
//! │ (one exchange)  │     │   (read-only)   │     │                 │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Per-connection failures are answered with an error response and never
//! end the accept loop. A panic in a provider is not caught: the listener
//! and the open connection are dropped while unwinding.

mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::CommandRegistry;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 50000;

/// Pending connections queued by the kernel while one is being served
const LISTEN_BACKLOG: u32 = 16;

/// Time a client has to deliver its request (5 seconds)
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Time a client has to take the response (5 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the data server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,

    /// Maximum wait for a client's request.
    pub read_timeout: Duration,

    /// Maximum wait while writing the response.
    pub write_timeout: Duration,
}

impl ServerConfig {
    /// Listens on all IPv4 interfaces at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            ..Default::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        }
    }
}

/// TCP server answering metric requests.
pub struct DataServer {
    listener: TcpListener,

    /// Command table shared with every connection
    registry: CommandRegistry,

    config: ServerConfig,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log correlation
    connection_counter: u64,
}

impl DataServer {
    /// Binds the listening socket.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// `ServerError::Bind` if the address cannot be bound; no connection is
    /// accepted in that case.
    pub fn bind(
        config: ServerConfig,
        registry: CommandRegistry,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_addr;
        let bind_error = |e: std::io::Error| {
            error!(addr = %addr, error = %e, "Network error while binding");
            ServerError::Bind {
                addr,
                error: e.to_string(),
            }
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;

        info!(addr = %addr, version = %registry.version(), "Data server listening");

        Ok(Self {
            listener,
            registry,
            config,
            cancel_token,
            connection_counter: 0,
        })
    }

    /// Returns the address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))
    }

    /// Runs the accept loop.
    ///
    /// Returns `Ok(())` once the cancellation token is triggered and
    /// `ServerError::Network` if accepting fails. Both paths drop the
    /// listener and any connection in progress.
    pub async fn run(mut self) -> Result<(), ServerError> {
        loop {
            let accepted = tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Server exiting due to interrupt");
                    break;
                }

                result = self.listener.accept() => result,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Network error while accepting connections");
                    return Err(ServerError::Network(e.to_string()));
                }
            };

            self.connection_counter += 1;
            let handler = ConnectionHandler::new(
                stream,
                Some(peer),
                &self.registry,
                self.config.read_timeout,
                self.config.write_timeout,
                self.connection_counter,
            );

            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!(peer = %peer, "Server exiting due to interrupt, dropping client");
                    break;
                }

                result = handler.run() => match result {
                    Ok(response) => {
                        debug!(peer = %peer, success = response.is_success(), "Request served");
                    }
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "Failed to deliver response");
                    }
                },
            }
        }

        Ok(())
    }
}

/// Errors that end the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.read_timeout, READ_TIMEOUT);
    }

    #[test]
    fn test_with_port() {
        assert_eq!(ServerConfig::with_port(6000).bind_addr.port(), 6000);
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 50000)),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:50000"));
        assert!(err.to_string().contains("address in use"));
    }
}
