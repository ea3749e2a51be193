//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The server refused the handshake.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Response carried a type code this crate does not know.
    #[error("unknown response type: {0}")]
    UnknownResponseType(i64),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
