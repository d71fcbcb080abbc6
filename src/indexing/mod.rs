//! Indexing pipeline
//!
//! chunk → embed (one batch call) → store (one write call). Any failing step
//! aborts the whole call; batches the store already committed stay
//! committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::chunking::TextSplitter;
use crate::embedding::EmbeddingProvider;
use crate::errors::Result;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::vector_store::{VectorStore, WRITE_BATCH_SIZE};

/// Outcome of indexing one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub tenant_id: String,
    pub document_id: String,
    pub chunks: usize,
    pub duration_ms: u64,
    pub indexed_at: DateTime<Utc>,
}

pub struct IndexingPipeline {
    splitter: TextSplitter,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    telemetry: TelemetryCollector,
}

impl IndexingPipeline {
    pub fn new(
        splitter: TextSplitter,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            splitter,
            embedder,
            store,
            telemetry,
        }
    }

    /// Chunk, embed and store one document for a tenant.
    ///
    /// Re-indexing the same document overwrites chunks by id. Trailing chunks
    /// left over from a longer previous version are not removed; use
    /// [`reindex_document`](Self::reindex_document) for full replacement.
    pub async fn index_document(
        &self,
        tenant_id: &str,
        document_id: &str,
        text: &str,
    ) -> Result<IndexReport> {
        let started = Instant::now();
        let chunks = self.splitter.split(text);

        if !chunks.is_empty() {
            let embeddings = self
                .embedder
                .embed_documents(&chunks)
                .await
                .inspect_err(|e| self.telemetry.record_failure("embed", e))?;

            self.store
                .create_embeddings(tenant_id, document_id, &embeddings, &chunks)
                .await
                .inspect_err(|e| self.telemetry.record_failure("store", e))?;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.telemetry.record(TelemetryEvent::DocumentIndexed {
            tenant_id: tenant_id.to_string(),
            document_id: document_id.to_string(),
            chunks: chunks.len(),
            batches: chunks.len().div_ceil(WRITE_BATCH_SIZE),
            duration_ms,
            timestamp: Instant::now(),
        });
        tracing::info!(
            tenant_id,
            document_id,
            chunks = chunks.len(),
            duration_ms,
            "indexed document"
        );

        Ok(IndexReport {
            tenant_id: tenant_id.to_string(),
            document_id: document_id.to_string(),
            chunks: chunks.len(),
            duration_ms,
            indexed_at: Utc::now(),
        })
    }

    /// Delete every chunk of the document, then index the new text
    pub async fn reindex_document(
        &self,
        tenant_id: &str,
        document_id: &str,
        text: &str,
    ) -> Result<IndexReport> {
        self.delete_document(document_id).await?;
        self.index_document(tenant_id, document_id, text).await
    }

    /// Remove every chunk of a document
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.store
            .delete_embeddings_by_document_id(document_id)
            .await
            .inspect_err(|e| self.telemetry.record_failure("delete", e))?;

        self.telemetry.record(TelemetryEvent::DocumentDeleted {
            document_id: document_id.to_string(),
            timestamp: Instant::now(),
        });
        tracing::info!(document_id, "deleted document");
        Ok(())
    }

    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkUnit;
    use crate::errors::RagError;
    use crate::vector_store::MemoryVectorStore;
    use async_trait::async_trait;

    /// Two-dimensional embedding: (length, vowel count)
    struct ShapeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShapeEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| shape(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(shape(text))
        }

        fn model_name(&self) -> &str {
            "shape"
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "shape"
        }
    }

    fn shape(text: &str) -> Vec<f32> {
        let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
        vec![text.len() as f32, vowels as f32 + 1.0]
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::embedding("failing", "backend down"))
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::embedding("failing", "backend down"))
        }

        fn model_name(&self) -> &str {
            "failing"
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    async fn pipeline(embedder: Arc<dyn EmbeddingProvider>) -> (IndexingPipeline, Arc<MemoryVectorStore>) {
        let store = Arc::new(MemoryVectorStore::new(2));
        store.initialize().await.unwrap();
        let splitter = TextSplitter::new(4, 1, ChunkUnit::Words).unwrap();
        let pipeline = IndexingPipeline::new(splitter, embedder, store.clone(), TelemetryCollector::new());
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_index_document_writes_every_chunk() {
        let (pipeline, store) = pipeline(Arc::new(ShapeEmbedder)).await;
        let report = pipeline
            .index_document("u1", "doc", "one two three four five six seven")
            .await
            .unwrap();
        assert_eq!(report.chunks, 2);
        assert_eq!(store.len().await, 2);
        assert_eq!(pipeline.telemetry.get_stats().documents_indexed, 1);
    }

    #[tokio::test]
    async fn test_empty_text_indexes_nothing() {
        let (pipeline, store) = pipeline(Arc::new(ShapeEmbedder)).await;
        let report = pipeline.index_document("u1", "doc", "").await.unwrap();
        assert_eq!(report.chunks, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reindex_removes_stale_chunks() {
        let (pipeline, store) = pipeline(Arc::new(ShapeEmbedder)).await;
        pipeline
            .index_document("u1", "doc", "one two three four five six seven")
            .await
            .unwrap();
        pipeline
            .index_document("u1", "doc", "short text")
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        pipeline
            .reindex_document("u1", "doc", "short text")
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_and_is_recorded() {
        let (pipeline, store) = pipeline(Arc::new(FailingEmbedder)).await;
        let err = pipeline
            .index_document("u1", "doc", "some text")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding { .. }));
        assert!(store.is_empty().await);

        let stats = pipeline.telemetry.get_stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.documents_indexed, 0);
    }

    #[tokio::test]
    async fn test_uninitialized_store_fails() {
        let store = Arc::new(MemoryVectorStore::new(2));
        let pipeline = IndexingPipeline::new(
            TextSplitter::new(4, 1, ChunkUnit::Words).unwrap(),
            Arc::new(ShapeEmbedder),
            store,
            TelemetryCollector::new(),
        );
        let err = pipeline.index_document("u1", "doc", "text").await.unwrap_err();
        assert!(matches!(err, RagError::VectorStore { .. }));
    }
}
