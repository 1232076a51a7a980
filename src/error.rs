//! Binary Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load settings")]
    Settings,
    #[display("{_0} is not configured")]
    Unconfigured(#[error(not(source))] &'static str),
    #[display("could not open the store")]
    Store,
    #[display("could not set up providers")]
    Providers,
    #[display("could not build the HTTP client")]
    Client,
    #[display("could not listen on {_0}")]
    Bind(#[error(not(source))] String),
    #[display("server stopped unexpectedly")]
    Serve,
}
