//! Error types for isko-core

use thiserror::Error;

/// Result type alias using isko-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in isko-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend API returned an error response
    #[error("Backend API error: {0}")]
    Api(String),

    /// Listing not found or not readable through this access path
    #[error("Listing not found: {0}")]
    NotFound(String),

    /// Listing was returned without its seller join
    #[error("Listing record is incomplete: {0}")]
    IncompleteRecord(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Realtime change feed could not be established
    #[error("Realtime unavailable: {0}")]
    RealtimeUnavailable(String),

    /// Realtime change feed closed by the producer
    #[error("Realtime change feed closed")]
    FeedClosed,
}
