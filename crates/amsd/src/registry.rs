//! Command registry: validates requests and dispatches them to the provider.
//!
//! Validation is ordered. The version is checked first, then the command
//! range, and only a request passing both reaches the provider. Each
//! failure becomes an error response; nothing here can stop the server.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use ams_core::{DataProvider, GatherResult, Payload};
use ams_protocol::message::{unsupported_version, GATHER_FAILED, UNSUPPORTED_REQUEST};
use ams_protocol::{Command, ProtocolVersion, Request, Response};

/// Read-only table mapping command codes to provider operations.
///
/// Built once at startup and shared by reference with every connection.
#[derive(Clone)]
pub struct CommandRegistry {
    provider: Arc<dyn DataProvider>,
    version: ProtocolVersion,
}

impl CommandRegistry {
    /// Creates a registry serving the current protocol version.
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self::with_version(provider, ProtocolVersion::CURRENT)
    }

    /// Creates a registry announcing a specific protocol version.
    pub fn with_version(provider: Arc<dyn DataProvider>, version: ProtocolVersion) -> Self {
        Self { provider, version }
    }

    /// Protocol version this registry serves.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Highest valid command code.
    pub fn max_command(&self) -> i64 {
        Command::MAX
    }

    /// Validates a request, returning the command it names.
    pub fn check(&self, request: &Request) -> Result<Command, RequestError> {
        if !self.version.accepts(&request.version) {
            return Err(RequestError::UnsupportedVersion {
                requested: request.version,
                server: self.version,
            });
        }

        Command::try_from(request.command).map_err(|e| RequestError::UnsupportedCommand(e.0))
    }

    /// Runs the provider operation for `command`.
    pub fn dispatch(&self, command: Command) -> GatherResult<Payload> {
        match command {
            Command::GetAllData => self.provider.gather_all_data().map(Payload::from),
            Command::GetSysData => self.provider.gather_system_data().map(Payload::SystemData),
        }
    }

    /// Produces the response for a decoded request.
    pub fn respond(&self, request: &Request) -> Response {
        let command = match self.check(request) {
            Ok(command) => command,
            Err(e) => {
                debug!(
                    command = request.command,
                    version = %request.version,
                    error = %e,
                    "Rejecting client request"
                );
                return e.to_response();
            }
        };

        match self.dispatch(command) {
            Ok(payload) => {
                debug!(
                    command = %command,
                    objects = payload.object_count(),
                    "Sending data objects to client"
                );
                Response::Success(payload)
            }
            Err(e) => {
                error!(command = %command, error = %e, "Data gathering failed");
                Response::error(GATHER_FAILED)
            }
        }
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("version", &self.version)
            .field("max_command", &Command::MAX)
            .finish_non_exhaustive()
    }
}

/// Reasons a decoded request is not dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Unsupported version {requested}, server is {server}")]
    UnsupportedVersion {
        requested: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unsupported command code {0}")]
    UnsupportedCommand(i64),
}

impl RequestError {
    /// The error response sent to the client.
    pub fn to_response(&self) -> Response {
        match self {
            RequestError::UnsupportedVersion { server, .. } => {
                Response::error(unsupported_version(server))
            }
            RequestError::UnsupportedCommand(_) => Response::error(UNSUPPORTED_REQUEST),
        }
    }
}
