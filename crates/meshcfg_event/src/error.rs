//! Error types for the event model

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ModelError>;

/// Event model error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid resource name: {0:?}")]
    InvalidName(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Duplicate schema: {0}")]
    DuplicateSchema(String),
}
