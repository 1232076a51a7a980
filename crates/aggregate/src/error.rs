//! Aggregate Error Types
//!
//! Only the request-level failures live here. A failing source or provider
//! is logged and contributes nothing, it never fails the whole request.

use derive_more::{Display, Error};

/// An aggregation error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for aggregation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid content id: {_0}")]
    InvalidContentId(#[error(not(source))] String),
    /// The metadata service could not be reached or answered garbage.
    #[display("metadata lookup failed")]
    Metadata,
    /// A scraping source could not be reached or answered garbage.
    #[display("search on {_0} failed")]
    Source(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Metadata | Self::Source(_))
    }
}
