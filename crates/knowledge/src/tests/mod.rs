//! End-to-end scenarios through the retrieval pipeline.

use crate::answer::testing::EchoGenerator;
use crate::embeddings::providers::TrigramProvider;
use crate::embeddings::testing::{ScriptedProvider, Step};
use crate::embeddings::{EmbeddingProvider, FallbackEmbedder};
use crate::error::KnowledgeError;
use crate::pipeline::RetrievalPipeline;
use crate::store::VectorIndexStore;
use crate::types::DeleteOutcome;
use docqa_core::config::RetrievalSettings;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const DOC_A: &str = "Apples grow on trees in the orchard.\n\n\
Apple cider is pressed every autumn.\n\n\
The orchard keeps forty apple trees.";

const DOC_B: &str = "Submarines dive beneath the ocean.\n\n\
Sonar lets a submarine see underwater.";

fn settings() -> RetrievalSettings {
    RetrievalSettings {
        top_k: 4,
        chunk_size: 50,
        chunk_overlap: 0,
    }
}

fn pipeline_with(
    temp: &TempDir,
    primary: Option<Arc<dyn EmbeddingProvider>>,
    fallback: Arc<dyn EmbeddingProvider>,
) -> (RetrievalPipeline, Arc<EchoGenerator>) {
    let store = VectorIndexStore::open(temp.path()).unwrap().into_shared();
    let generator = Arc::new(EchoGenerator::default());
    let pipeline = RetrievalPipeline::new(
        FallbackEmbedder::new(primary, fallback),
        store,
        generator.clone(),
        settings(),
    );
    (pipeline, generator)
}

fn trigram_pipeline(temp: &TempDir) -> (RetrievalPipeline, Arc<EchoGenerator>) {
    pipeline_with(temp, None, Arc::new(TrigramProvider::new(64)))
}

#[tokio::test]
async fn test_ingest_assigns_contiguous_slots_per_document() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _) = trigram_pipeline(&temp);

    let a = pipeline.ingest_text("a.txt", DOC_A).await.unwrap();
    assert_eq!(a.total_chunks, 3);
    assert_eq!(a.slots, vec![0, 1, 2]);
    assert_eq!(a.embedding_dim, 64);
    assert_eq!(a.provider, "trigram");
    assert!(!a.degraded);

    let b = pipeline.ingest_text("b.txt", DOC_B).await.unwrap();
    assert_eq!(b.total_chunks, 2);
    assert_eq!(b.slots, vec![3, 4]);
    assert_ne!(a.doc_id, b.doc_id);

    let docs = pipeline.list_documents().await;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].doc_id, a.doc_id);
    assert_eq!(docs[0].chunk_count, 3);
    assert_eq!(docs[1].source, "b.txt");
    assert_eq!(docs[1].chunk_count, 2);
}

#[tokio::test]
async fn test_delete_first_document_reassigns_slots() {
    let temp = TempDir::new().unwrap();
    let (pipeline, generator) = trigram_pipeline(&temp);

    let a = pipeline.ingest_text("a.txt", DOC_A).await.unwrap();
    let b = pipeline.ingest_text("b.txt", DOC_B).await.unwrap();

    let outcome = pipeline.delete_document(&a.doc_id).await.unwrap();
    assert_eq!(
        outcome,
        DeleteOutcome::Deleted {
            removed: 3,
            remaining: 2
        }
    );

    {
        let store = pipeline.store().lock().await;
        let entries: Vec<_> = store.entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].slot, 0);
        assert_eq!(entries[0].record.doc_id, b.doc_id);
        assert_eq!(entries[0].record.chunk_index, 0);
        assert_eq!(entries[1].slot, 1);
        assert_eq!(entries[1].record.chunk_index, 1);
    }

    // Even a query about apples can now only be answered from B.
    let answer = pipeline.query("apple orchard trees", Some(4)).await.unwrap();
    assert_eq!(answer.retrieved_chunks, 2);
    assert!(answer.results.iter().all(|hit| hit.record.doc_id == b.doc_id));
    assert!(DOC_B.contains(&answer.answer));

    let seen = generator.seen.lock().unwrap();
    let (question, chunks) = seen.last().unwrap();
    assert_eq!(question, "apple orchard trees");
    assert_eq!(chunks.len(), 2);
}

#[tokio::test]
async fn test_query_returns_matching_chunk_text() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _) = trigram_pipeline(&temp);

    pipeline.ingest_text("a.txt", DOC_A).await.unwrap();
    pipeline.ingest_text("b.txt", DOC_B).await.unwrap();

    // Re-embedding a stored chunk's exact text must find that chunk at distance 0.
    let answer = pipeline
        .query("Sonar lets a submarine see underwater.", Some(1))
        .await
        .unwrap();
    assert_eq!(answer.results.len(), 1);
    assert_eq!(answer.results[0].record.text, "Sonar lets a submarine see underwater.");
    assert_eq!(answer.results[0].slot, 4);
    assert!(answer.results[0].distance.abs() < 1e-6);
}

#[tokio::test]
async fn test_query_uses_default_top_k() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _) = trigram_pipeline(&temp);

    pipeline.ingest_text("a.txt", DOC_A).await.unwrap();
    pipeline.ingest_text("b.txt", DOC_B).await.unwrap();

    let answer = pipeline.query("ocean", None).await.unwrap();
    assert_eq!(answer.retrieved_chunks, 4);
    assert!(answer
        .results
        .windows(2)
        .all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn test_query_empty_index_skips_embedding() {
    let temp = TempDir::new().unwrap();
    let fallback = ScriptedProvider::always("ollama", Step::Width(4));
    let (pipeline, generator) = pipeline_with(&temp, None, fallback.clone());

    assert!(matches!(
        pipeline.query("anything", None).await,
        Err(KnowledgeError::EmptyIndex)
    ));
    assert_eq!(fallback.calls(), 0);
    assert!(generator.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_query_rejects_bad_input() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _) = trigram_pipeline(&temp);
    pipeline.ingest_text("a.txt", DOC_A).await.unwrap();

    assert!(matches!(
        pipeline.query("   ", None).await,
        Err(KnowledgeError::InvalidInput(_))
    ));
    assert!(matches!(
        pipeline.query("apples", Some(0)).await,
        Err(KnowledgeError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_fallback_width_change_is_rejected() {
    let temp = TempDir::new().unwrap();
    let primary = ScriptedProvider::script("openai", vec![Step::Width(8)], Step::RateLimited);
    let fallback = ScriptedProvider::always("ollama", Step::Width(4));
    let (pipeline, _) = pipeline_with(&temp, Some(primary), fallback);

    let first = pipeline.ingest_text("a.txt", DOC_A).await.unwrap();
    assert_eq!(first.embedding_dim, 8);
    assert_eq!(first.provider, "openai");

    // The primary is now rate limited and the fallback has a different width.
    let err = pipeline.ingest_text("b.txt", DOC_B).await.unwrap_err();
    assert!(matches!(
        err,
        KnowledgeError::DimensionMismatch {
            expected: 8,
            actual: 4
        }
    ));

    let status = pipeline.status().await;
    assert_eq!(status.count, 3);
    assert_eq!(status.dim, Some(8));
    assert_eq!(status.documents, 1);
}

#[tokio::test]
async fn test_degraded_ingest_is_reported() {
    let temp = TempDir::new().unwrap();
    let primary = ScriptedProvider::always("openai", Step::Unreachable);
    let fallback = ScriptedProvider::always("ollama", Step::Width(4));
    let (pipeline, _) = pipeline_with(&temp, Some(primary), fallback);

    let report = pipeline.ingest_text("b.txt", DOC_B).await.unwrap();
    assert_eq!(report.provider, "ollama");
    assert!(report.degraded);
    assert_eq!(report.embedding_dim, 4);
}

#[tokio::test]
async fn test_embedding_unavailable_leaves_store_untouched() {
    let temp = TempDir::new().unwrap();
    let primary = ScriptedProvider::always("openai", Step::Unauthorized);
    let fallback = ScriptedProvider::always("ollama", Step::Unreachable);
    let (pipeline, _) = pipeline_with(&temp, Some(primary), fallback);

    let err = pipeline.ingest_text("a.txt", DOC_A).await.unwrap_err();
    assert!(matches!(err, KnowledgeError::EmbeddingUnavailable { .. }));

    let status = pipeline.status().await;
    assert_eq!(status.count, 0);
    assert_eq!(status.dim, None);
}

#[tokio::test]
async fn test_ingest_empty_text_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _) = trigram_pipeline(&temp);
    assert!(matches!(
        pipeline.ingest_text("blank.txt", " \n\n ").await,
        Err(KnowledgeError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_ingest_file_uses_file_name_as_source() {
    let temp = TempDir::new().unwrap();
    let docs = TempDir::new().unwrap();
    let path = docs.path().join("submarines.md");
    std::fs::write(&path, DOC_B).unwrap();

    let (pipeline, _) = trigram_pipeline(&temp);
    let report = pipeline.ingest_file(&path).await.unwrap();
    assert_eq!(report.source, "submarines.md");
    assert_eq!(report.total_chunks, 2);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _) = trigram_pipeline(&temp);
    let a = pipeline.ingest_text("a.txt", DOC_A).await.unwrap();
    pipeline.ingest_text("b.txt", DOC_B).await.unwrap();
    pipeline.delete_document(&a.doc_id).await.unwrap();
    let before = pipeline.query("submarine sonar", Some(2)).await.unwrap();

    let (reopened, _) = trigram_pipeline(&temp);
    let after = reopened.query("submarine sonar", Some(2)).await.unwrap();
    assert_eq!(before.results, after.results);
    assert_eq!(reopened.status().await.count, 2);
}

#[tokio::test]
async fn test_delete_everything_then_query() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _) = trigram_pipeline(&temp);
    let a = pipeline.ingest_text("a.txt", DOC_A).await.unwrap();

    assert!(pipeline.delete_document(&a.doc_id).await.unwrap().is_deleted());
    assert_eq!(
        pipeline.delete_document(&a.doc_id).await.unwrap(),
        DeleteOutcome::NotFound
    );
    assert!(matches!(
        pipeline.query("apples", None).await,
        Err(KnowledgeError::EmptyIndex)
    ));
    assert!(pipeline.list_documents().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingests_keep_slots_unique() {
    let temp = TempDir::new().unwrap();
    let (pipeline, _) = trigram_pipeline(&temp);

    let mut handles = Vec::new();
    for i in 0..8 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let text = if i % 2 == 0 { DOC_A } else { DOC_B };
            pipeline.ingest_text(&format!("doc-{}.txt", i), text).await
        }));
    }

    let mut slots = Vec::new();
    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        // Each insert is one contiguous run.
        assert!(report.slots.windows(2).all(|w| w[1] == w[0] + 1));
        slots.extend(report.slots);
    }

    let unique: HashSet<usize> = slots.iter().copied().collect();
    assert_eq!(unique.len(), slots.len());
    assert_eq!(slots.len(), 4 * 3 + 4 * 2);
    assert_eq!(unique, (0..slots.len()).collect::<HashSet<usize>>());

    let store = pipeline.store().lock().await;
    assert_eq!(store.len(), 20);
    assert_eq!(store.list_documents().len(), 8);
}
