//! Tap error types.

use thiserror::Error;

/// Tap errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Driver error.
    #[error("client error: {0}")]
    Client(#[from] feedtap_client::Error),

    /// Subscription error.
    #[error(transparent)]
    Core(#[from] feedtap_core::Error),

    /// Event encoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Output task failed.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
