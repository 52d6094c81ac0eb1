//! Error types for the blocklist cache and its persistence path.

use thiserror::Error;

/// Errors that can occur in blocklist operations.
#[derive(Debug, Error)]
pub enum BlocklistError {
    /// Invalid recorder configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The durable sink rejected or failed a batch write.
    #[error("Sink write failed: {0}")]
    Sink(String),

    /// I/O failure while writing to a file-backed sink.
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized for the durable log.
    #[error("Record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for blocklist operations.
pub type BlocklistResult<T> = Result<T, BlocklistError>;
