//! Text chunking with configurable size and overlap.
//!
//! Sizes are in characters. Splits prefer paragraph, then line, sentence and
//! word boundaries, falling back to characters only for unbroken runs.

use crate::error::{KnowledgeError, KnowledgeResult};
use text_splitter::{ChunkConfig, TextSplitter};

/// Split `text` into ordered, non-empty chunks of at most `chunk_size`
/// characters, with up to `overlap` characters shared between neighbours.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> KnowledgeResult<Vec<String>> {
    if chunk_size == 0 {
        return Err(KnowledgeError::InvalidInput(
            "chunk_size must be greater than 0".to_string(),
        ));
    }

    let config = ChunkConfig::new(chunk_size)
        .with_overlap(overlap)
        .map_err(|e| KnowledgeError::InvalidInput(format!("Invalid chunk settings: {}", e)))?;
    let splitter = TextSplitter::new(config);

    let chunks: Vec<String> = splitter
        .chunks(text)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(str::to_string)
        .collect();

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}
