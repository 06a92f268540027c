//! Error types for docqa.
//!
//! This module defines the workspace-wide error enum. Domain crates keep their
//! own typed errors and convert into `AppError` at the binary boundary.

use thiserror::Error;

/// Unified error type for docqa.
///
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector index, embedding and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// The request itself was rejected (bad input, empty index, width mismatch)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The addressed item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
