//! End-to-end pipeline tests over the in-memory store
//!
//! Live-backend variants of these scenarios live next to each backend and
//! are `#[ignore]`d.

mod common;

use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};

use common::{harness, uninitialized_harness, BagOfWordsEmbedder, ScriptedLlm, DIMENSIONS};
use ragline::chunking::{ChunkUnit, TextSplitter};
use ragline::config::{LlmConfig, RetrievalConfig};
use ragline::embedding::EmbeddingProvider;
use ragline::llm::{select_available, LanguageModel};
use ragline::query::NO_CONTEXT_ANSWER;
use ragline::vector_store::{chunk_id, ScoredChunk, VectorStore, WRITE_BATCH_SIZE};
use ragline::{RagError, RagService, Result};

const SKY: &str = "The sky is blue. Grass is green.";

#[tokio::test]
async fn test_index_then_search_finds_snippet() {
    let h = harness(16, 4).await;

    let report = h.service.index_document("u1", "doc-1", SKY).await.unwrap();
    assert_eq!(report.chunks, 1);
    assert_eq!(report.document_id, "doc-1");

    let results = h
        .service
        .search_text("u1", "What color is grass?", Some(1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].contains("Grass is green"));
}

#[tokio::test]
async fn test_search_ranks_matching_document_first() {
    let h = harness(4, 0).await;

    h.service
        .index_document("u1", "colors", "Grass is green and bright.")
        .await
        .unwrap();
    h.service
        .index_document("u1", "animals", "Cats chase mice at night.")
        .await
        .unwrap();

    let results = h
        .service
        .search_text("u1", "green grass", Some(1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].contains("Grass"));
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let h = harness(16, 4).await;

    h.service.index_document("u1", "doc-1", SKY).await.unwrap();
    h.service
        .index_document("u2", "doc-2", "Rust ownership prevents data races.")
        .await
        .unwrap();

    let results = h
        .service
        .search_text("u2", "What color is grass?", Some(10))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results.iter().all(|r| !r.contains("Grass")));

    let results = h
        .service
        .search_text("nobody", "grass", Some(10))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_chunk_retrieves_itself_first() {
    let h = harness(3, 1).await;
    let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
    let chunks = h.service.index_document("u1", "greek", text).await.unwrap().chunks;
    assert!(chunks > 1);

    let embedder = BagOfWordsEmbedder::new();
    let stored = h
        .store
        .query_embeddings(&embedder.embed("alpha"), "u1", chunks)
        .await
        .unwrap();

    for chunk in &stored {
        let hits = h
            .store
            .query_embeddings(&embedder.embed(&chunk.content), "u1", 1)
            .await
            .unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-4);
        assert_eq!(hits[0].document_id, "greek");
    }
}

#[tokio::test]
async fn test_index_document_is_idempotent() {
    let h = harness(16, 4).await;

    h.service.index_document("u1", "doc-1", SKY).await.unwrap();
    let before = h.store.len().await;
    h.service.index_document("u1", "doc-1", SKY).await.unwrap();

    assert_eq!(h.store.len().await, before);
    let results = h.service.search_text("u1", "grass", Some(10)).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_reindex_drops_stale_chunks() {
    let h = harness(2, 0).await;

    let long = h
        .service
        .index_document("u1", "doc-1", "one two three four five six")
        .await
        .unwrap();
    assert_eq!(long.chunks, 3);

    let short = h
        .service
        .reindex_document("u1", "doc-1", "seven eight")
        .await
        .unwrap();
    assert_eq!(short.chunks, 1);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn test_delete_document_removes_all_chunks() {
    let h = harness(2, 0).await;

    h.service
        .index_document("u1", "doc-1", "one two three four five six")
        .await
        .unwrap();
    h.service.index_document("u1", "doc-2", SKY).await.unwrap();

    h.service.delete_document("doc-1").await.unwrap();

    let results = h
        .service
        .search_text("u1", "one two three", Some(10))
        .await
        .unwrap();
    assert!(results.iter().all(|r| !r.contains("one") && !r.contains("four")));
    assert!(!results.is_empty());

    // Deleting an unknown document is not an error
    tokio_test::assert_ok!(h.service.delete_document("missing").await);
}

#[tokio::test]
async fn test_delete_single_chunk_by_id() {
    let h = harness(2, 0).await;
    h.service
        .index_document("u1", "doc-1", "one two three four")
        .await
        .unwrap();

    h.store.delete_embedding_by_id(&chunk_id("doc-1", 0)).await.unwrap();

    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn test_empty_document_indexes_nothing() {
    let h = harness(16, 4).await;

    let report = h.service.index_document("u1", "empty", "").await.unwrap();
    assert_eq!(report.chunks, 0);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_answer_without_context_skips_llm() {
    let h = harness(16, 4).await;

    let answer = h.service.answer_query("u1", "anything?").await.unwrap();
    assert_eq!(answer, NO_CONTEXT_ANSWER);
    assert_eq!(h.llm.call_count(), 0);
}

#[tokio::test]
async fn test_answer_with_context_calls_llm() {
    let h = harness(16, 4).await;
    h.service.index_document("u1", "doc-1", SKY).await.unwrap();

    let answer = h
        .service
        .answer_with_sources("u1", "What color is grass?")
        .await
        .unwrap();
    assert_eq!(answer.answer, "Grass is green.");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document_id, "doc-1");
    assert_eq!(h.llm.call_count(), 1);

    let stats = h.service.stats();
    assert_eq!(stats.documents_indexed, 1);
    assert_eq!(stats.queries_answered, 1);
}

#[tokio::test]
async fn test_streamed_answer_concatenates() {
    let h = harness(16, 4).await;
    h.service.index_document("u1", "doc-1", SKY).await.unwrap();

    let mut stream = h
        .service
        .answer_query_stream("u1", "What color is grass?")
        .await
        .unwrap();
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment.unwrap());
    }
    assert_eq!(text, "Grass is green.");
}

#[tokio::test]
async fn test_uninitialized_store_fails_with_store_error() {
    let h = uninitialized_harness();

    let err = h
        .service
        .index_document("u1", "doc-1", SKY)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::VectorStore { .. }));

    let err = h.service.search_text("u1", "grass", None).await.unwrap_err();
    assert!(matches!(err, RagError::VectorStore { .. }));
    assert_eq!(h.service.stats().failures, 2);
}

#[tokio::test]
async fn test_no_healthy_language_model() {
    let candidates: Vec<Arc<dyn LanguageModel>> = vec![
        Arc::new(ScriptedLlm::unhealthy()),
        Arc::new(ScriptedLlm::unhealthy()),
    ];

    match select_available(candidates).await {
        Err(RagError::NoProviderAvailable { providers }) => assert_eq!(providers.len(), 2),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("unhealthy models must not be selected"),
    }
}

#[tokio::test]
async fn test_first_healthy_language_model_wins() {
    let healthy = Arc::new(ScriptedLlm::new("hi"));
    let candidates: Vec<Arc<dyn LanguageModel>> =
        vec![Arc::new(ScriptedLlm::unhealthy()), healthy.clone()];

    let selected = select_available(candidates).await.unwrap();
    assert!(selected.is_available().await);
}

#[tokio::test]
async fn test_embedding_lengths_match_dimensions() {
    let embedder = BagOfWordsEmbedder::new();

    let query = embedder.embed_query("What color is grass?").await.unwrap();
    assert_eq!(query.len(), DIMENSIONS);

    let docs = embedder
        .embed_documents(&["a".to_string(), SKY.to_string()])
        .await
        .unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.len() == embedder.dimensions()));
}

#[tokio::test]
async fn test_second_tenant_cannot_overwrite_document() {
    let h = harness(4, 0).await;
    h.service
        .index_document("a", "d1", "alpha secret one. alpha secret two.")
        .await
        .unwrap();

    let err = h
        .service
        .index_document("b", "d1", "bravo text")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RagError::VectorStore { operation: "create_embeddings", .. }
    ));

    let a = h.service.search_text("a", "alpha secret", Some(10)).await.unwrap();
    assert_eq!(a.len(), 2);
    assert!(a.iter().all(|text| !text.contains("bravo")));
    assert!(h
        .service
        .search_text("b", "bravo text", Some(10))
        .await
        .unwrap()
        .is_empty());
}

/// Commits batches like a real backend but rejects the second one
struct SecondBatchFails {
    committed: Mutex<Vec<String>>,
}

#[async_trait]
impl VectorStore for SecondBatchFails {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn create_embeddings(
        &self,
        _tenant_id: &str,
        document_id: &str,
        embeddings: &[Vec<f32>],
        _contents: &[String],
    ) -> Result<usize> {
        for (batch, vectors) in embeddings.chunks(WRITE_BATCH_SIZE).enumerate() {
            if batch == 1 {
                return Err(RagError::vector_store(
                    "flaky",
                    "create_embeddings",
                    "batch rejected",
                ));
            }
            let start = batch * WRITE_BATCH_SIZE;
            let mut committed = self.committed.lock().unwrap();
            committed.extend((start..start + vectors.len()).map(|i| chunk_id(document_id, i)));
        }
        Ok(embeddings.len())
    }

    async fn query_embeddings(
        &self,
        _query: &[f32],
        _tenant_id: &str,
        _n_results: usize,
    ) -> Result<Vec<ScoredChunk>> {
        Ok(Vec::new())
    }

    async fn delete_embeddings_by_document_id(&self, _document_id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_embedding_by_id(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn test_failed_batch_aborts_and_keeps_earlier_batches() {
    let store = Arc::new(SecondBatchFails {
        committed: Mutex::new(Vec::new()),
    });
    let service = RagService::from_parts(
        TextSplitter::new(1, 0, ChunkUnit::Words).unwrap(),
        Arc::new(BagOfWordsEmbedder::new()),
        store.clone(),
        Arc::new(ScriptedLlm::new("unused")),
        &RetrievalConfig::default(),
        &LlmConfig::default(),
    );

    let text: String = (0..WRITE_BATCH_SIZE + 100).map(|i| format!("w{} ", i)).collect();
    let err = service.index_document("u1", "big", &text).await.unwrap_err();
    assert!(matches!(err, RagError::VectorStore { ref provider, .. } if provider == "flaky"));

    let committed = store.committed.lock().unwrap();
    assert_eq!(committed.len(), WRITE_BATCH_SIZE);
    assert_eq!(committed[0], "big-0");
    assert_eq!(committed[WRITE_BATCH_SIZE - 1], chunk_id("big", WRITE_BATCH_SIZE - 1));
    assert_eq!(service.stats().failures, 1);
    assert_eq!(service.stats().documents_indexed, 0);
}
