//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection failed or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// Connecting timed out.
    #[error("connection timed out")]
    Timeout,

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,

    /// The server reported a failed query.
    #[error("{kind}: {message}")]
    Query { kind: &'static str, message: String },

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] feedtap_proto::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
