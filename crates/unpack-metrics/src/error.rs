//! Error types for the metrics subsystem.

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Error returned by a pipeline collaborator when a value cannot be read.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Metrics subsystem error type.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metrics already initialized")]
    AlreadyInitialized,

    #[error("Metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("Failed to read {what}: {source}")]
    Source {
        what: &'static str,
        #[source]
        source: SourceError,
    },

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetricsError {
    pub fn read(what: &'static str, source: SourceError) -> Self {
        Self::Source { what, source }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
