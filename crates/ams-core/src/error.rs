//! Data gathering errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors a provider reports instead of a payload.
///
/// The server never forwards these to clients; it logs them and answers
/// with a generic gathering error.
#[derive(Error, Debug, Clone)]
pub enum GatherError {
    /// A source file could not be opened or read
    #[error("Failed to read {path}: {error}")]
    Read { path: PathBuf, error: String },

    /// A value was present but not an integer
    #[error("Failed to parse {field} in {path}: {value:?}")]
    Parse {
        path: PathBuf,
        field: String,
        value: String,
    },

    /// A required key never appeared in its source file
    #[error("Missing {field} in {path}")]
    MissingField { path: PathBuf, field: String },

    /// The provider cannot produce data at all
    #[error("Data unavailable: {0}")]
    Unavailable(String),
}

/// Result type for provider operations.
pub type GatherResult<T> = Result<T, GatherError>;
