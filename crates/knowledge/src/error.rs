//! Error taxonomy for the vector index, embeddings and retrieval.

use docqa_core::AppError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the knowledge crate.
///
/// Deleting an unknown document is not an error; see `DeleteOutcome`.
#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// Vector width disagrees with the width established by the first insert.
    #[error("Embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Search attempted on a store holding no vectors.
    #[error("Index is empty. No documents available for search")]
    EmptyIndex,

    /// Both the primary and the fallback embedding provider failed.
    #[error("Embeddings unavailable (primary: {primary}; fallback: {fallback})")]
    EmbeddingUnavailable { primary: String, fallback: String },

    /// Writing or removing an index artifact failed.
    #[error("Failed to persist {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted artifacts are unreadable or disagree with each other.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Caller violated an operation precondition.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Answer generation failed.
    #[error("Answer generation failed: {0}")]
    Generation(#[source] AppError),
}

impl KnowledgeError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by the request itself rather than the system.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::EmptyIndex | Self::InvalidInput(_)
        )
    }
}

impl From<KnowledgeError> for AppError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::Generation(inner) => inner,
            KnowledgeError::Persistence { path, source } => AppError::Io(std::io::Error::new(
                source.kind(),
                format!("Failed to persist {:?}: {}", path, source),
            )),
            other if other.is_caller_error() => AppError::InvalidRequest(other.to_string()),
            other => AppError::Knowledge(other.to_string()),
        }
    }
}

/// Convenience alias for knowledge results.
pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
