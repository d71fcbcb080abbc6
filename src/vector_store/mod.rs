//! Vector stores
//!
//! Tenant-scoped persistence and similarity search over chunk embeddings.
//! Every backend must be initialized once before use; operations on an
//! uninitialized store fail with a `VectorStore` error.

pub mod memory;
pub mod pgvector;
pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::VectorStoreConfig;
use crate::errors::{RagError, Result};

pub use memory::MemoryVectorStore;
pub use pgvector::PgVectorStore;
pub use qdrant::QdrantStore;

/// Records written per round trip; batches commit sequentially
pub const WRITE_BATCH_SIZE: usize = 500;

/// Results returned when the caller does not ask for a count
pub const DEFAULT_N_RESULTS: usize = 5;

/// One stored chunk and its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub tenant_id: String,
    pub document_id: String,
    pub embedding: Vec<f32>,
    pub content: String,
}

/// One search hit; higher score is more similar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub tenant_id: String,
    pub document_id: String,
    pub content: String,
    pub score: f32,
}

/// Deterministic chunk identity
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}-{}", document_id, chunk_index)
}

/// Capability set shared by every vector store backend
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Connect and create schema/collection if absent. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Store one vector per chunk of a document; returns records written
    async fn create_embeddings(
        &self,
        tenant_id: &str,
        document_id: &str,
        embeddings: &[Vec<f32>],
        contents: &[String],
    ) -> Result<usize>;

    /// Nearest chunks for the tenant, best first
    async fn query_embeddings(
        &self,
        query: &[f32],
        tenant_id: &str,
        n_results: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Remove every chunk of a document
    async fn delete_embeddings_by_document_id(&self, document_id: &str) -> Result<()>;

    /// Remove one chunk
    async fn delete_embedding_by_id(&self, id: &str) -> Result<()>;

    /// Vector length this store accepts
    fn dimensions(&self) -> usize;

    /// Provider name used in errors and logs
    fn name(&self) -> &str;
}

/// Closed set of vector store backends
pub enum VectorStoreBackend {
    Qdrant(QdrantStore),
    Pgvector(PgVectorStore),
    Memory(MemoryVectorStore),
}

impl VectorStoreBackend {
    /// Build the configured backend without connecting
    pub fn from_config(config: &VectorStoreConfig) -> Result<Self> {
        match config {
            VectorStoreConfig::Qdrant {
                url,
                project_id,
                dimensions,
            } => Ok(VectorStoreBackend::Qdrant(QdrantStore::new(
                url,
                project_id,
                *dimensions,
            )?)),
            VectorStoreConfig::Pgvector {
                database_url,
                schema,
                table,
                dimensions,
            } => Ok(VectorStoreBackend::Pgvector(PgVectorStore::new(
                database_url,
                schema,
                table,
                *dimensions,
            )?)),
            VectorStoreConfig::Memory { dimensions } => {
                Ok(VectorStoreBackend::Memory(MemoryVectorStore::new(*dimensions)))
            }
        }
    }

    fn inner(&self) -> &dyn VectorStore {
        match self {
            VectorStoreBackend::Qdrant(s) => s,
            VectorStoreBackend::Pgvector(s) => s,
            VectorStoreBackend::Memory(s) => s,
        }
    }
}

#[async_trait]
impl VectorStore for VectorStoreBackend {
    async fn initialize(&self) -> Result<()> {
        self.inner().initialize().await
    }

    async fn create_embeddings(
        &self,
        tenant_id: &str,
        document_id: &str,
        embeddings: &[Vec<f32>],
        contents: &[String],
    ) -> Result<usize> {
        self.inner()
            .create_embeddings(tenant_id, document_id, embeddings, contents)
            .await
    }

    async fn query_embeddings(
        &self,
        query: &[f32],
        tenant_id: &str,
        n_results: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.inner().query_embeddings(query, tenant_id, n_results).await
    }

    async fn delete_embeddings_by_document_id(&self, document_id: &str) -> Result<()> {
        self.inner().delete_embeddings_by_document_id(document_id).await
    }

    async fn delete_embedding_by_id(&self, id: &str) -> Result<()> {
        self.inner().delete_embedding_by_id(id).await
    }

    fn dimensions(&self) -> usize {
        self.inner().dimensions()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

/// Validate a write and pair vectors with contents under their chunk ids
pub(crate) fn build_records(
    provider: &str,
    dimensions: usize,
    tenant_id: &str,
    document_id: &str,
    embeddings: &[Vec<f32>],
    contents: &[String],
) -> Result<Vec<VectorRecord>> {
    if embeddings.len() != contents.len() {
        return Err(RagError::vector_store(
            provider,
            "create_embeddings",
            format!(
                "{} embeddings for {} contents",
                embeddings.len(),
                contents.len()
            ),
        ));
    }

    for embedding in embeddings {
        check_dimensions(provider, "create_embeddings", dimensions, embedding)?;
    }

    Ok(embeddings
        .iter()
        .zip(contents)
        .enumerate()
        .map(|(index, (embedding, content))| VectorRecord {
            id: chunk_id(document_id, index),
            tenant_id: tenant_id.to_string(),
            document_id: document_id.to_string(),
            embedding: embedding.clone(),
            content: content.clone(),
        })
        .collect())
}

pub(crate) fn check_dimensions(
    provider: &str,
    operation: &'static str,
    expected: usize,
    vector: &[f32],
) -> Result<()> {
    if vector.len() != expected {
        return Err(RagError::vector_store(
            provider,
            operation,
            format!("vector has {} dimensions, store expects {}", vector.len(), expected),
        ));
    }
    Ok(())
}

pub(crate) fn not_initialized(provider: &str, operation: &'static str) -> RagError {
    RagError::vector_store(provider, operation, "store not initialized")
}

/// A write touched chunk ids already stored for another tenant.
///
/// Chunk ids carry no tenant, so every backend rejects the whole write
/// instead of moving or overwriting another tenant's records.
pub(crate) fn tenant_conflict(provider: &str, tenant_id: &str, foreign_ids: &[String]) -> RagError {
    RagError::vector_store(
        provider,
        "create_embeddings",
        format!(
            "{} chunk id(s) belong to another tenant, refusing write for tenant {} (first: {})",
            foreign_ids.len(),
            tenant_id,
            foreign_ids.first().map(String::as_str).unwrap_or_default()
        ),
    )
}

/// Best first; equal scores by id ascending
pub(crate) fn rank(results: &mut [ScoredChunk]) {
    results.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
}
