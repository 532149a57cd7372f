//! Error types for the AMS client.
//!
//! Most failures of a request are reported as an error-shaped `Response`
//! so that a polling caller can display them and carry on. `ClientError`
//! covers the remaining cases, where the exchange broke off mid-way.

use ams_protocol::CodecError;
use thiserror::Error;

/// Client call failures that are not expressed as a response.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request could not be sent or the reply could not be framed.
    ///
    /// A clean close before any reply is not an error; it yields an
    /// "Unknown server error" response instead.
    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    /// The server accepted the connection but did not answer in time.
    #[error("Timed out waiting for the server")]
    Timeout,
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_codec_error_from_conversion() {
        let codec = CodecError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let error: ClientError = codec.into();
        assert!(matches!(error, ClientError::Codec(_)));
        assert!(error.to_string().contains("reset"));
    }

    #[test]
    fn test_timeout_display() {
        assert!(ClientError::Timeout.to_string().contains("Timed out"));
    }
}
