//! Config Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Layered configuration could not be merged or deserialized.
    #[display("could not load configuration")]
    Load,
    #[display("configuration file not found: {}", _0.display())]
    MissingFile(#[error(not(source))] PathBuf),
    /// A value was well-formed but not acceptable.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// A per-request user configuration could not be decoded.
    #[display("could not decode user configuration")]
    Decode,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
