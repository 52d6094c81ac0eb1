//! Error types for flow control.

use thiserror::Error;

/// Errors that can occur in flow-control operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Invalid flow-control configuration.
    #[error("Flow control configuration error: {0}")]
    Config(String),

    /// The rate engine failed to make a decision.
    ///
    /// The controller treats this as fail-open on the hot path; it is never
    /// turned into a blocking decision.
    #[error("Rate engine error: {0}")]
    Engine(String),
}

/// Result type for flow-control operations.
pub type FlowResult<T> = Result<T, FlowError>;
