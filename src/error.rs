//! Unified error type.

use std::time::Duration;

/// The error type returned by servkit's fallible operations.
///
/// Application-level failures (401, 404, 429, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding a port, accepting a connection, or an
/// outbound call made through [`Client`](crate::Client).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address `{addr}`")]
    InvalidAddr { addr: String },

    #[error("invalid uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("http: {0}")]
    Http(#[from] http::Error),

    #[error("client: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("reading response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Shorthand for results carrying [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
