//! Ingest and query flows over the shared vector index.
//!
//! Embedding and answer generation happen outside the store lock; only the
//! index mutation or search itself runs while it is held.

use crate::answer::{AnswerGenerator, LlmAnswerGenerator};
use crate::chunker::chunk_text;
use crate::embeddings::FallbackEmbedder;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::parser::{parse_file, parse_text};
use crate::store::{SharedStore, VectorIndexStore};
use crate::types::{
    ChunkRecord, DeleteOutcome, DocumentSummary, IndexStatus, IngestReport, QueryAnswer,
};
use docqa_core::config::RetrievalSettings;
use docqa_core::AppConfig;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Retrieval-augmented question answering over ingested documents.
#[derive(Clone)]
pub struct RetrievalPipeline {
    embedder: FallbackEmbedder,
    store: SharedStore,
    generator: Arc<dyn AnswerGenerator>,
    settings: RetrievalSettings,
}

impl RetrievalPipeline {
    pub fn new(
        embedder: FallbackEmbedder,
        store: SharedStore,
        generator: Arc<dyn AnswerGenerator>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            settings,
        }
    }

    /// Open the index and build providers from configuration.
    pub fn from_config(config: &AppConfig) -> KnowledgeResult<Self> {
        let store = VectorIndexStore::open(config.index_dir())?.into_shared();
        let embedder = FallbackEmbedder::from_config(config)?;
        let client =
            docqa_llm::create_client(&config.generation).map_err(KnowledgeError::Generation)?;
        let generator = LlmAnswerGenerator::new(client, &config.generation.model)?
            .with_sampling(config.generation.temperature, config.generation.max_tokens);

        Ok(Self::new(
            embedder,
            store,
            Arc::new(generator),
            config.retrieval,
        ))
    }

    /// Handle to the underlying store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Read, chunk, embed and index one file. `source` is the file name.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn ingest_file(&self, path: &Path) -> KnowledgeResult<IngestReport> {
        let text = parse_file(path)?;
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.ingest_parsed(&source, &text).await
    }

    /// Chunk, embed and index raw text under the label `source`.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn ingest_text(&self, source: &str, text: &str) -> KnowledgeResult<IngestReport> {
        let text = parse_text(text)?;
        self.ingest_parsed(source, &text).await
    }

    async fn ingest_parsed(&self, source: &str, text: &str) -> KnowledgeResult<IngestReport> {
        let chunks = chunk_text(text, self.settings.chunk_size, self.settings.chunk_overlap)?;
        if chunks.is_empty() {
            return Err(KnowledgeError::InvalidInput(format!(
                "{}: no readable text",
                source
            )));
        }

        let batch = self.embedder.embed(&chunks).await?;
        let doc_id = uuid::Uuid::new_v4().to_string();
        let embedding_dim = batch.dim();

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord::new(&doc_id, source, i as u32, text))
            .collect();
        let total_chunks = records.len();

        let slots = {
            let mut store = self.store.lock().await;
            store.insert(&batch.vectors, records)?
        };

        tracing::info!(
            "Ingested {} as {} ({} chunks, dim={}, provider={})",
            source,
            doc_id,
            total_chunks,
            embedding_dim,
            batch.provider
        );

        Ok(IngestReport {
            doc_id,
            source: source.to_string(),
            total_chunks,
            embedding_dim,
            slots,
            provider: batch.provider,
            degraded: batch.degraded,
        })
    }

    /// Answer `question` from the `top_k` nearest chunks.
    ///
    /// `top_k` defaults to the configured value.
    #[instrument(skip(self))]
    pub async fn query(&self, question: &str, top_k: Option<usize>) -> KnowledgeResult<QueryAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(KnowledgeError::InvalidInput(
                "Query must not be empty".to_string(),
            ));
        }
        let top_k = top_k.unwrap_or(self.settings.top_k);
        if top_k == 0 {
            return Err(KnowledgeError::InvalidInput(
                "top_k must be at least 1".to_string(),
            ));
        }

        // Fail fast so an empty index never costs an embedding call.
        if self.store.lock().await.is_empty() {
            return Err(KnowledgeError::EmptyIndex);
        }

        let (vector, _) = self.embedder.embed_one(question).await?;

        let results = {
            let store = self.store.lock().await;
            store.search(&vector, top_k)?
        };

        let texts: Vec<String> = results.iter().map(|hit| hit.record.text.clone()).collect();
        let answer = self.generator.generate(question, &texts).await?;

        Ok(QueryAnswer {
            query: question.to_string(),
            answer,
            retrieved_chunks: results.len(),
            results,
        })
    }

    pub async fn list_documents(&self) -> Vec<DocumentSummary> {
        self.store.lock().await.list_documents()
    }

    pub async fn delete_document(&self, doc_id: &str) -> KnowledgeResult<DeleteOutcome> {
        self.store.lock().await.delete_document(doc_id)
    }

    pub async fn status(&self) -> IndexStatus {
        self.store.lock().await.status()
    }
}
