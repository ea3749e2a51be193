//! Core error types.

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Closing a feed handle failed.
    #[error("failed to close feed {feed}: {reason}")]
    Close { feed: String, reason: String },

    /// The feed source (driver) failed.
    #[error("source error: {0}")]
    Source(String),

    /// The downstream sink no longer accepts events.
    #[error("event sink closed")]
    SinkClosed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
