//! Request and response envelopes.
//!
//! One `Request` travels client → server and one `Response` travels back,
//! per connection. On the wire (JSON inside a length-delimited frame):
//!
//! ```text
//! {"command":1,"version":{"major":1,"minor":0}}
//! {"result":"success","data":{"memtotal":1000000,...}}
//! {"result":"error","data":"Unsupported request"}
//! ```

use ams_core::Payload;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::version::ProtocolVersion;

/// Server: the request could not be decoded.
pub const BAD_CLIENT_REQUEST: &str = "bad client request";

/// Server: the command code is outside the registry.
pub const UNSUPPORTED_REQUEST: &str = "Unsupported request";

/// Server: the provider failed to gather data.
pub const GATHER_FAILED: &str = "Unspecified data gathering error, check server log.";

/// Client: the server could not be reached.
pub const CONNECT_FAILED: &str = "Client: Is the server still running?";

/// Client: the caller asked for a command that does not exist.
pub const BAD_REQUEST: &str = "Client: Bad request.";

/// Client: the server's reply was missing or not a response.
pub const UNKNOWN_SERVER_ERROR: &str = "Unknown server error";

/// Server: the request version cannot be served.
pub fn unsupported_version(server: &ProtocolVersion) -> String {
    format!("Unsupported version, server is {server}")
}

/// A data request.
///
/// The command is kept as a raw code so that a request for a command this
/// build does not know still decodes, and is rejected by the server with
/// a proper response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Command code
    pub command: i64,

    /// Protocol version the sender was built with
    pub version: ProtocolVersion,
}

impl Request {
    /// Creates a request for `command` at the current protocol version.
    pub fn new(command: Command) -> Self {
        Self::with_code(command.code())
    }

    /// Creates a request for a raw command code at the current protocol version.
    pub fn with_code(command: i64) -> Self {
        Self {
            command,
            version: ProtocolVersion::CURRENT,
        }
    }

    /// Overrides the declared protocol version.
    pub fn at_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }
}

/// The server's answer to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "data", rename_all = "snake_case")]
pub enum Response {
    /// The provider's output
    Success(Payload),

    /// Human-readable diagnostic
    Error(String),
}

impl Response {
    /// Creates a success response.
    pub fn success(payload: impl Into<Payload>) -> Self {
        Self::Success(payload.into())
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Returns true for a success response.
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    /// Returns the payload of a success response.
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Response::Success(payload) => Some(payload),
            Response::Error(_) => None,
        }
    }

    /// Returns the diagnostic of an error response.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Response::Success(_) => None,
            Response::Error(message) => Some(message),
        }
    }
}
