//! Dense, exact vector index with positional slot identity.
//!
//! A vector's slot is its offset in the dense array. Slots are never stored as
//! independent keys: deleting a document rebuilds the array from the surviving
//! rows and renumbers them `0..M-1` in their original relative order.
//!
//! Search is brute-force squared Euclidean distance over every row.

mod persistence;

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::types::{ChunkRecord, DeleteOutcome, DocumentSummary, IndexEntry, IndexStatus, SearchHit};
use persistence::IndexFiles;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use persistence::{METADATA_FILE, VECTORS_FILE};

/// Store handle shared between request handlers.
///
/// Every operation, including search, runs under the lock; callers must not
/// await embedding or generation calls while holding it.
pub type SharedStore = Arc<Mutex<VectorIndexStore>>;

/// The vector index and its per-slot metadata.
///
/// Invariant: `records.len() * dim == vectors.len()` and row `i` of `vectors`
/// belongs to `records[i]`. `dim` is `None` exactly when the store is empty.
#[derive(Debug)]
pub struct VectorIndexStore {
    files: IndexFiles,
    dim: Option<usize>,
    records: Vec<ChunkRecord>,
    vectors: Vec<f32>,
    generation: u64,
}

impl VectorIndexStore {
    /// Open the index stored in `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> KnowledgeResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| KnowledgeError::persistence(&dir, e))?;

        let files = IndexFiles::new(dir);
        let store = match files.load()? {
            Some(snapshot) => {
                tracing::info!(
                    "Loaded vector index from {:?}: dim={}, total vectors={}",
                    files.dir(),
                    snapshot.dim,
                    snapshot.records.len()
                );
                Self {
                    files,
                    dim: Some(snapshot.dim),
                    records: snapshot.records,
                    vectors: snapshot.vectors,
                    generation: snapshot.generation,
                }
            }
            None => {
                tracing::info!(
                    "No existing index in {:?}; a new one will be created on first insert",
                    files.dir()
                );
                Self {
                    files,
                    dim: None,
                    records: Vec::new(),
                    vectors: Vec::new(),
                    generation: 0,
                }
            }
        };

        Ok(store)
    }

    /// Wrap the store for shared, serialized access.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Directory holding the persisted artifacts.
    pub fn dir(&self) -> &Path {
        self.files.dir()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Width established by the first insert, `None` while empty.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn status(&self) -> IndexStatus {
        IndexStatus {
            count: self.len(),
            dim: self.dim,
            documents: self.list_documents().len(),
        }
    }

    /// Entry at `slot`, if any.
    pub fn entry(&self, slot: usize) -> Option<IndexEntry<'_>> {
        let dim = self.dim?;
        self.records.get(slot).map(|record| IndexEntry {
            slot,
            record,
            embedding: &self.vectors[slot * dim..(slot + 1) * dim],
        })
    }

    /// Retained embedding of the vector at `slot`.
    pub fn embedding(&self, slot: usize) -> Option<&[f32]> {
        self.entry(slot).map(|entry| entry.embedding)
    }

    /// All entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = IndexEntry<'_>> + '_ {
        (0..self.len()).filter_map(move |slot| self.entry(slot))
    }

    /// Append vectors and their records; returns the assigned slots.
    ///
    /// The first insert into an empty store fixes the index width. Later
    /// batches of a different width fail with `DimensionMismatch` and leave the
    /// store untouched. If persisting fails, the append is rolled back.
    pub fn insert(
        &mut self,
        vectors: &[Vec<f32>],
        records: Vec<ChunkRecord>,
    ) -> KnowledgeResult<Vec<usize>> {
        if vectors.is_empty() {
            return Err(KnowledgeError::InvalidInput(
                "No embeddings to add to the index".to_string(),
            ));
        }
        if vectors.len() != records.len() {
            return Err(KnowledgeError::InvalidInput(format!(
                "Got {} vectors for {} records",
                vectors.len(),
                records.len()
            )));
        }

        let width = vectors[0].len();
        if width == 0 {
            return Err(KnowledgeError::InvalidInput(
                "Vectors must have at least one dimension".to_string(),
            ));
        }
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != width) {
            return Err(KnowledgeError::InvalidInput(format!(
                "Batch mixes widths: vector 0 has {}, vector {} has {}",
                width,
                i,
                v.len()
            )));
        }
        if vectors.iter().flatten().any(|x| !x.is_finite()) {
            return Err(KnowledgeError::InvalidInput(
                "Vectors must not contain NaN or infinite values".to_string(),
            ));
        }

        if let Some(dim) = self.dim {
            if dim != width {
                return Err(KnowledgeError::DimensionMismatch {
                    expected: dim,
                    actual: width,
                });
            }
        }

        let previous_dim = self.dim;
        let start = self.records.len();
        let added = records.len();

        self.vectors.reserve(added * width);
        for v in vectors {
            self.vectors.extend_from_slice(v);
        }
        self.records.extend(records);
        self.dim = Some(width);
        self.generation += 1;

        if let Err(e) = self.files.save(width, self.generation, &self.records, &self.vectors) {
            tracing::error!("Persisting insert failed, rolling back {} vectors: {}", added, e);
            self.records.truncate(start);
            self.vectors.truncate(start * width);
            self.dim = previous_dim;
            self.generation -= 1;
            return Err(e);
        }

        tracing::info!(
            "Added {} vectors to index. Total = {}",
            added,
            self.records.len()
        );
        Ok((start..start + added).collect())
    }

    /// Exact top-k search by squared Euclidean distance.
    ///
    /// Results are in ascending distance order, ties broken by ascending slot.
    pub fn search(&self, query: &[f32], top_k: usize) -> KnowledgeResult<Vec<SearchHit>> {
        let dim = match self.dim {
            Some(dim) if !self.records.is_empty() => dim,
            _ => return Err(KnowledgeError::EmptyIndex),
        };
        if query.len() != dim {
            return Err(KnowledgeError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        if top_k == 0 {
            return Err(KnowledgeError::InvalidInput(
                "top_k must be at least 1".to_string(),
            ));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(dim)
            .map(|row| squared_l2(query, row))
            .enumerate()
            .collect();

        let by_distance_then_slot =
            |a: &(usize, f32), b: &(usize, f32)| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0));

        let k = top_k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance_then_slot);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance_then_slot);

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .map(|(slot, distance)| SearchHit {
                slot,
                distance,
                record: self.records[slot].clone(),
            })
            .collect();

        tracing::debug!("Retrieved {} results (requested top-{})", hits.len(), top_k);
        Ok(hits)
    }

    /// Documents in order of first insertion, with their chunk counts.
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        let mut order: Vec<DocumentSummary> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for record in &self.records {
            match positions.get(record.doc_id.as_str()) {
                Some(&i) => order[i].chunk_count += 1,
                None => {
                    positions.insert(record.doc_id.as_str(), order.len());
                    order.push(DocumentSummary {
                        doc_id: record.doc_id.clone(),
                        source: record.source.clone(),
                        chunk_count: 1,
                    });
                }
            }
        }

        order
    }

    /// Remove every chunk of `doc_id` and rebuild the index from the rest.
    ///
    /// The rebuilt state is persisted before it replaces the current one, so a
    /// failed write leaves both memory and disk at the previous generation.
    pub fn delete_document(&mut self, doc_id: &str) -> KnowledgeResult<DeleteOutcome> {
        let removed = self.records.iter().filter(|r| r.doc_id == doc_id).count();
        if removed == 0 {
            tracing::warn!("No document found with id={}", doc_id);
            return Ok(DeleteOutcome::NotFound);
        }

        let remaining = self.records.len() - removed;
        if remaining == 0 {
            self.files.remove()?;
            self.dim = None;
            self.records = Vec::new();
            self.vectors = Vec::new();
            self.generation = 0;
            tracing::info!("All documents removed. Index reset");
            return Ok(DeleteOutcome::Deleted {
                removed,
                remaining: 0,
            });
        }

        let dim = self.dim.ok_or_else(|| {
            KnowledgeError::CorruptIndex("non-empty index without a dimension".to_string())
        })?;

        let mut records = Vec::with_capacity(remaining);
        let mut vectors = Vec::with_capacity(remaining * dim);
        for (slot, record) in self.records.iter().enumerate() {
            if record.doc_id != doc_id {
                records.push(record.clone());
                vectors.extend_from_slice(&self.vectors[slot * dim..(slot + 1) * dim]);
            }
        }

        let generation = self.generation + 1;
        self.files.save(dim, generation, &records, &vectors)?;

        self.records = records;
        self.vectors = vectors;
        self.generation = generation;

        tracing::info!(
            "Deleted document {}. Rebuilt index with {} vectors remaining",
            doc_id,
            remaining
        );
        Ok(DeleteOutcome::Deleted { removed, remaining })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
