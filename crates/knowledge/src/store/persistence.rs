//! On-disk form of the vector index.
//!
//! Two artifacts live in the index directory:
//! - `vectors.bin`: the dense `[count, dim]` f32 array in slot order
//! - `metadata.json`: slot id -> chunk metadata, plus `_dim` and `_generation`
//!
//! Both artifacts are written and synced to temp files in the same directory
//! before either is renamed into place, vector buffer first. If the metadata
//! rename fails, the previous vector buffer is put back so the directory still
//! loads as the prior generation. Both files carry the same generation number,
//! so a crash between the two renames is detected on load instead of serving
//! text for the wrong vector.

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::types::ChunkRecord;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";

const MAGIC: &[u8; 4] = b"DQVB";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8 + 8;

const DIM_KEY: &str = "_dim";
const GENERATION_KEY: &str = "_generation";

/// Per-slot entry of `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotMetadata {
    doc_id: String,
    source: String,
    chunk_index: u32,
    text: String,
    embedding_dim: usize,
}

/// Index state as read back from disk.
#[derive(Debug)]
pub(crate) struct Snapshot {
    pub dim: usize,
    pub generation: u64,
    pub records: Vec<ChunkRecord>,
    pub vectors: Vec<f32>,
}

/// Paths of the two index artifacts.
#[derive(Debug, Clone)]
pub(crate) struct IndexFiles {
    dir: PathBuf,
}

impl IndexFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Write both artifacts for the given state.
    pub fn save(
        &self,
        dim: usize,
        generation: u64,
        records: &[ChunkRecord],
        vectors: &[f32],
    ) -> KnowledgeResult<()> {
        let metadata = encode_metadata(dim, generation, records)?;
        let buffer = encode_vectors(generation, dim, records.len(), vectors);

        let vectors_path = self.vectors_path();
        let metadata_path = self.metadata_path();

        let vectors_tmp = stage(&self.dir, &vectors_path, &buffer)?;
        let metadata_tmp = stage(&self.dir, &metadata_path, &metadata)?;
        let previous = read_if_exists(&vectors_path)?;

        vectors_tmp
            .persist(&vectors_path)
            .map_err(|e| KnowledgeError::persistence(&vectors_path, e.error))?;

        // Metadata is the source of truth, so it lands last.
        if let Err(e) = metadata_tmp.persist(&metadata_path) {
            self.restore_vectors(previous.as_deref());
            return Err(KnowledgeError::persistence(&metadata_path, e.error));
        }

        tracing::debug!(
            "Persisted index generation {} ({} vectors, dim {})",
            generation,
            records.len(),
            dim
        );
        Ok(())
    }

    /// Read both artifacts. `None` means there is no stored index.
    pub fn load(&self) -> KnowledgeResult<Option<Snapshot>> {
        let metadata_path = self.metadata_path();
        let vectors_path = self.vectors_path();

        if !metadata_path.exists() {
            if vectors_path.exists() {
                tracing::warn!(
                    "Ignoring vector buffer {:?} without metadata; starting empty",
                    vectors_path
                );
            }
            return Ok(None);
        }

        let raw = std::fs::read(&metadata_path)
            .map_err(|e| KnowledgeError::persistence(&metadata_path, e))?;
        let (dim, generation, records) = decode_metadata(&raw)?;

        if records.is_empty() {
            return Ok(None);
        }

        let dim = dim.ok_or_else(|| {
            KnowledgeError::CorruptIndex(format!("{} has slots but no {}", METADATA_FILE, DIM_KEY))
        })?;

        if !vectors_path.exists() {
            return Err(KnowledgeError::CorruptIndex(format!(
                "{} lists {} slots but {} is missing",
                METADATA_FILE,
                records.len(),
                VECTORS_FILE
            )));
        }

        let bytes =
            std::fs::read(&vectors_path).map_err(|e| KnowledgeError::persistence(&vectors_path, e))?;
        let decoded = decode_vectors(&bytes)?;

        if decoded.generation != generation {
            return Err(KnowledgeError::CorruptIndex(format!(
                "{} is generation {} but {} is generation {}",
                VECTORS_FILE, decoded.generation, METADATA_FILE, generation
            )));
        }

        if decoded.rows != records.len() || decoded.dim != dim {
            return Err(KnowledgeError::CorruptIndex(format!(
                "{} holds [{}, {}] but {} describes [{}, {}]",
                VECTORS_FILE,
                decoded.rows,
                decoded.dim,
                METADATA_FILE,
                records.len(),
                dim
            )));
        }

        Ok(Some(Snapshot {
            dim,
            generation,
            records,
            vectors: decoded.values,
        }))
    }

    /// Put back the vector buffer that preceded a failed save.
    fn restore_vectors(&self, previous: Option<&[u8]>) {
        let vectors_path = self.vectors_path();
        let restored = match previous {
            Some(bytes) => stage(&self.dir, &vectors_path, bytes).and_then(|tmp| {
                tmp.persist(&vectors_path)
                    .map(|_| ())
                    .map_err(|e| KnowledgeError::persistence(&vectors_path, e.error))
            }),
            None => remove_if_exists(&vectors_path),
        };
        match restored {
            Ok(()) => tracing::warn!("Metadata write failed; restored previous {:?}", vectors_path),
            Err(e) => tracing::error!("Could not restore {:?} after failed save: {}", vectors_path, e),
        }
    }

    /// Delete both artifacts, metadata first.
    pub fn remove(&self) -> KnowledgeResult<()> {
        let metadata_path = self.metadata_path();
        remove_if_exists(&metadata_path)?;

        // With the metadata gone the store reloads empty, so a stale buffer is harmless.
        let vectors_path = self.vectors_path();
        if let Err(e) = remove_if_exists(&vectors_path) {
            tracing::warn!("Could not remove {:?}: {}", vectors_path, e);
        }
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> KnowledgeResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(KnowledgeError::persistence(path, e)),
    }
}

/// Write and sync `bytes` to a temp file next to `path`, ready to be renamed.
fn stage(dir: &Path, path: &Path, bytes: &[u8]) -> KnowledgeResult<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| KnowledgeError::persistence(path, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| KnowledgeError::persistence(path, e))?;
    Ok(tmp)
}

fn read_if_exists(path: &Path) -> KnowledgeResult<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(KnowledgeError::persistence(path, e)),
    }
}

fn encode_metadata(dim: usize, generation: u64, records: &[ChunkRecord]) -> KnowledgeResult<Vec<u8>> {
    let mut map = serde_json::Map::with_capacity(records.len() + 2);
    for (slot, record) in records.iter().enumerate() {
        let entry = SlotMetadata {
            doc_id: record.doc_id.clone(),
            source: record.source.clone(),
            chunk_index: record.chunk_index,
            text: record.text.clone(),
            embedding_dim: dim,
        };
        let value = serde_json::to_value(entry)
            .map_err(|e| KnowledgeError::CorruptIndex(format!("Failed to encode metadata: {}", e)))?;
        map.insert(slot.to_string(), value);
    }
    map.insert(DIM_KEY.to_string(), dim.into());
    map.insert(GENERATION_KEY.to_string(), generation.into());

    serde_json::to_vec_pretty(&serde_json::Value::Object(map))
        .map_err(|e| KnowledgeError::CorruptIndex(format!("Failed to encode metadata: {}", e)))
}

fn decode_metadata(raw: &[u8]) -> KnowledgeResult<(Option<usize>, u64, Vec<ChunkRecord>)> {
    let corrupt = |msg: String| KnowledgeError::CorruptIndex(msg);

    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(raw)
        .map_err(|e| corrupt(format!("{} is not a JSON object: {}", METADATA_FILE, e)))?;

    let dim = match map.get(DIM_KEY) {
        Some(v) => Some(
            v.as_u64()
                .filter(|d| *d > 0)
                .ok_or_else(|| corrupt(format!("{} must be a positive integer", DIM_KEY)))?
                as usize,
        ),
        None => None,
    };
    let generation = map.get(GENERATION_KEY).and_then(|v| v.as_u64()).unwrap_or(0);

    let slot_count = map.keys().filter(|k| !k.starts_with('_')).count();
    let mut slots: Vec<Option<ChunkRecord>> = vec![None; slot_count];

    for (key, value) in &map {
        if key.starts_with('_') {
            continue;
        }
        let slot: usize = key
            .parse()
            .map_err(|_| corrupt(format!("Invalid slot id {:?}", key)))?;
        if slot >= slot_count {
            return Err(corrupt(format!(
                "Slot {} out of range for {} entries",
                slot, slot_count
            )));
        }
        let meta: SlotMetadata = serde_json::from_value(value.clone())
            .map_err(|e| corrupt(format!("Slot {}: {}", slot, e)))?;
        if let Some(dim) = dim {
            if meta.embedding_dim != dim {
                return Err(corrupt(format!(
                    "Slot {} recorded dim {} but index dim is {}",
                    slot, meta.embedding_dim, dim
                )));
            }
        }
        slots[slot] = Some(ChunkRecord {
            doc_id: meta.doc_id,
            source: meta.source,
            chunk_index: meta.chunk_index,
            text: meta.text,
        });
    }

    let records = slots
        .into_iter()
        .enumerate()
        .map(|(slot, r)| r.ok_or_else(|| corrupt(format!("Missing slot {}", slot))))
        .collect::<KnowledgeResult<Vec<_>>>()?;

    Ok((dim, generation, records))
}

struct DecodedVectors {
    generation: u64,
    rows: usize,
    dim: usize,
    values: Vec<f32>,
}

fn encode_vectors(generation: u64, dim: usize, rows: usize, values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + values.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&generation.to_le_bytes());
    bytes.extend_from_slice(&(rows as u64).to_le_bytes());
    bytes.extend_from_slice(&(dim as u64).to_le_bytes());
    for &value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vectors(bytes: &[u8]) -> KnowledgeResult<DecodedVectors> {
    let corrupt = |msg: &str| KnowledgeError::CorruptIndex(format!("{}: {}", VECTORS_FILE, msg));

    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(corrupt("missing header"));
    }

    let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let u64_at = |at: usize| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[at..at + 8]);
        u64::from_le_bytes(buf)
    };

    let version = u32_at(4);
    if version != FORMAT_VERSION {
        return Err(corrupt(&format!("unsupported format version {}", version)));
    }

    let generation = u64_at(8);
    let rows = u64_at(16) as usize;
    let dim = u64_at(24) as usize;

    let expected = rows
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| corrupt("shape overflows"))?;
    let body = &bytes[HEADER_LEN..];
    if body.len() != expected {
        return Err(corrupt(&format!(
            "expected {} bytes of vectors for [{}, {}], found {}",
            expected,
            rows,
            dim,
            body.len()
        )));
    }

    let values = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(DecodedVectors {
        generation,
        rows,
        dim,
        values,
    })
}
