//! In-process vector store
//!
//! Brute-force cosine search over a `BTreeMap`; the same contract as the
//! networked backends, for local runs and tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::{OnceCell, RwLock};

use super::{
    build_records, check_dimensions, not_initialized, rank, tenant_conflict, ScoredChunk,
    VectorRecord, VectorStore,
};
use crate::errors::Result;

const PROVIDER: &str = "memory";

pub struct MemoryVectorStore {
    dimensions: usize,
    initialized: OnceCell<()>,
    records: RwLock<BTreeMap<String, VectorRecord>>,
}

impl MemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            initialized: OnceCell::new(),
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn ensure_initialized(&self, operation: &'static str) -> Result<()> {
        if self.initialized.initialized() {
            Ok(())
        } else {
            Err(not_initialized(PROVIDER, operation))
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn initialize(&self) -> Result<()> {
        self.initialized.get_or_init(|| async {}).await;
        Ok(())
    }

    async fn create_embeddings(
        &self,
        tenant_id: &str,
        document_id: &str,
        embeddings: &[Vec<f32>],
        contents: &[String],
    ) -> Result<usize> {
        self.ensure_initialized("create_embeddings")?;
        let records = build_records(
            PROVIDER,
            self.dimensions,
            tenant_id,
            document_id,
            embeddings,
            contents,
        )?;

        let mut store = self.records.write().await;
        let foreign: Vec<String> = records
            .iter()
            .filter(|r| store.get(&r.id).is_some_and(|old| old.tenant_id != tenant_id))
            .map(|r| r.id.clone())
            .collect();
        if !foreign.is_empty() {
            return Err(tenant_conflict(PROVIDER, tenant_id, &foreign));
        }

        // One lock for the whole write, so it lands all-or-nothing
        let written = records.len();
        for record in records {
            store.insert(record.id.clone(), record);
        }

        tracing::debug!(document_id, written, "stored embeddings in memory");
        Ok(written)
    }

    async fn query_embeddings(
        &self,
        query: &[f32],
        tenant_id: &str,
        n_results: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.ensure_initialized("query_embeddings")?;
        check_dimensions(PROVIDER, "query_embeddings", self.dimensions, query)?;
        if n_results == 0 {
            return Ok(Vec::new());
        }

        let store = self.records.read().await;
        let mut results: Vec<ScoredChunk> = store
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .map(|r| ScoredChunk {
                id: r.id.clone(),
                tenant_id: r.tenant_id.clone(),
                document_id: r.document_id.clone(),
                content: r.content.clone(),
                score: cosine_similarity(query, &r.embedding),
            })
            .collect();

        rank(&mut results);
        results.truncate(n_results);
        Ok(results)
    }

    async fn delete_embeddings_by_document_id(&self, document_id: &str) -> Result<()> {
        self.ensure_initialized("delete_embeddings_by_document_id")?;
        self.records
            .write()
            .await
            .retain(|_, r| r.document_id != document_id);
        Ok(())
    }

    async fn delete_embedding_by_id(&self, id: &str) -> Result<()> {
        self.ensure_initialized("delete_embedding_by_id")?;
        self.records.write().await.remove(id);
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// Cosine similarity; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
