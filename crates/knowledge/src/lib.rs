//! Document question answering over a local vector index.
//!
//! Documents are split into chunks and embedded with a remote primary
//! provider, falling back to a local one. The vectors land in a dense, exact
//! index whose slot numbers are positional and get reassigned whenever a
//! document is deleted. Questions are answered by a chat model grounded on the
//! nearest chunks.

pub mod answer;
pub mod chunker;
pub mod embeddings;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use answer::{AnswerGenerator, LlmAnswerGenerator};
pub use embeddings::{EmbeddingBatch, EmbeddingProvider, FallbackEmbedder, ProviderError};
pub use error::{KnowledgeError, KnowledgeResult};
pub use pipeline::RetrievalPipeline;
pub use store::{SharedStore, VectorIndexStore};
pub use types::{
    ChunkRecord, DeleteOutcome, DocumentSummary, IndexEntry, IndexStatus, IngestReport,
    QueryAnswer, SearchHit,
};
