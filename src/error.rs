//! Error types for the PBM exporter.
//!
//! This module defines custom error types using `thiserror` for structured
//! error handling throughout the application.

use thiserror::Error;

/// Main error type for PBM exporter operations.
#[derive(Debug, Error)]
pub enum PbmError {
    /// MongoDB could not be reached, even after the retry
    #[error("Failed to connect to MongoDB: {0}")]
    Connect(#[source] mongodb::error::Error),

    /// A control-plane collection query failed
    #[error("Failed to query {collection}: {source}")]
    Query {
        collection: &'static str,
        #[source]
        source: mongodb::error::Error,
    },

    /// The PBM configuration document is absent
    #[error("no PBM config found in database")]
    MissingConfig,

    /// The pbm status command failed or wrote to stderr
    #[error("pbm command failed: {0}")]
    Command(String),

    /// Error parsing status output
    #[error("Failed to parse PBM status: {0}")]
    ParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Metrics error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<prometheus::Error> for PbmError {
    fn from(e: prometheus::Error) -> Self {
        PbmError::Metrics(e.to_string())
    }
}

/// Result type alias for PBM exporter operations.
pub type Result<T> = std::result::Result<T, PbmError>;
