//! Error types for the RenderGrid registry.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open registry: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to encode record {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("failed to decode record {key}: {reason}")]
    Decode { key: String, reason: String },
}
