//! Knowledge system type definitions.

use serde::{Deserialize, Serialize};

/// One unit of retrievable content.
///
/// The record's embedding lives in the store's dense buffer at the record's
/// slot and is kept verbatim so the index can be rebuilt without re-embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Groups the chunks of one source document
    pub doc_id: String,

    /// Original filename or label
    pub source: String,

    /// Position of this chunk within its document (0-based, no gaps)
    pub chunk_index: u32,

    /// Literal chunk content
    pub text: String,
}

impl ChunkRecord {
    pub fn new(
        doc_id: impl Into<String>,
        source: impl Into<String>,
        chunk_index: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            source: source.into(),
            chunk_index,
            text: text.into(),
        }
    }
}

/// A record paired with its current positional slot and retained vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry<'a> {
    /// Offset of the vector in the dense array; reassigned on every rebuild
    pub slot: usize,
    pub record: &'a ChunkRecord,
    pub embedding: &'a [f32],
}

/// A search result, ordered by ascending distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub slot: usize,

    /// Squared Euclidean distance to the query
    pub distance: f32,

    #[serde(flatten)]
    pub record: ChunkRecord,
}

/// Per-document aggregate returned by `list_documents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub source: String,
    pub chunk_count: usize,
}

/// Result of deleting a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The document's chunks were removed and the index rebuilt.
    Deleted { removed: usize, remaining: usize },

    /// No chunk carried the requested `doc_id`; nothing changed.
    NotFound,
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

/// Summary of one ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub source: String,
    pub total_chunks: usize,
    pub embedding_dim: usize,

    /// Slots assigned by the insert, contiguous
    pub slots: Vec<usize>,

    /// Embedding provider that produced the batch
    pub provider: String,

    /// True when the primary provider failed and the fallback was used
    pub degraded: bool,
}

/// Answer to a question together with the evidence it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub query: String,
    pub answer: String,
    pub retrieved_chunks: usize,
    pub results: Vec<SearchHit>,
}

/// Shape of the index, for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub count: usize,
    pub dim: Option<usize>,
    pub documents: usize,
}
