//! Debrid Error Types
//!
//! These never leave the crate through the [`Provider`](crate::Provider)
//! trait: adapters fold them into probe results and resolution outcomes.
//! They do surface when building clients and looking up providers.

use derive_more::{Display, Error};

/// A debrid error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for debrid operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Connection, TLS, timeout or body read failure.
    #[display("HTTP transport error")]
    Transport,
    /// Gave up after repeated 429/5xx responses.
    #[display("gave up after repeated HTTP {_0} responses")]
    RetryExhausted(#[error(not(source))] u16),
    /// The provider answered with something we couldn't make sense of.
    #[display("unexpected provider response")]
    InvalidResponse,
    #[display("could not build HTTP client")]
    Client,
    #[display("unknown provider: {_0}")]
    UnknownProvider(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::RetryExhausted(_))
    }
}
