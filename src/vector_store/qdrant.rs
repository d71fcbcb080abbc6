//! Qdrant vector store
//!
//! One collection per project (`{project_id}_chunks`), cosine distance,
//! keyword payload indexes on `tenant_id` and `document_id`. Qdrant only
//! accepts UUID or integer point ids, so each chunk id is mapped to a
//! UUIDv5 and the original id is kept in the payload.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, vectors_config::Config as VectorsConfigKind, Condition,
    CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance,
    FieldType, Filter, GetPointsBuilder, PointId, PointStruct, PointsIdsList, ScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{
    build_records, check_dimensions, not_initialized, rank, tenant_conflict, ScoredChunk,
    VectorRecord, VectorStore, WRITE_BATCH_SIZE,
};
use crate::errors::{RagError, Result};

const PROVIDER: &str = "qdrant";

/// Payload keys
const CHUNK_ID: &str = "chunk_id";
const TENANT_ID: &str = "tenant_id";
const DOCUMENT_ID: &str = "document_id";
const CONTENT: &str = "content";

pub struct QdrantStore {
    client: Qdrant,
    url: String,
    collection: String,
    dimensions: usize,
    initialized: OnceCell<()>,
}

impl QdrantStore {
    /// Build a client for `url`; no request is made until `initialize`
    pub fn new(url: &str, project_id: &str, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| RagError::vector_store(PROVIDER, "connect", e))?;

        Ok(Self {
            client,
            url: url.to_string(),
            collection: collection_name(project_id),
            dimensions,
            initialized: OnceCell::new(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn ensure_initialized(&self, operation: &'static str) -> Result<()> {
        if self.initialized.initialized() {
            Ok(())
        } else {
            Err(not_initialized(PROVIDER, operation))
        }
    }

    async fn create_or_verify_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| RagError::vector_store(PROVIDER, "initialize", e))?;

        if exists {
            let info = self
                .client
                .collection_info(&self.collection)
                .await
                .map_err(|e| RagError::vector_store(PROVIDER, "initialize", e))?;

            let size = info
                .result
                .and_then(|r| r.config)
                .and_then(|c| c.params)
                .and_then(|p| p.vectors_config)
                .and_then(|v| v.config)
                .and_then(|c| match c {
                    VectorsConfigKind::Params(params) => Some(params.size),
                    _ => None,
                });

            if size != Some(self.dimensions as u64) {
                return Err(RagError::vector_store(
                    PROVIDER,
                    "initialize",
                    format!(
                        "collection {} has vector size {:?}, expected {}",
                        self.collection, size, self.dimensions
                    ),
                ));
            }
            tracing::debug!(collection = %self.collection, "using existing collection");
        } else {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::vector_store(PROVIDER, "initialize", e))?;
            tracing::info!(collection = %self.collection, dimensions = self.dimensions, "created collection");
        }

        for field in [TENANT_ID, DOCUMENT_ID] {
            self.client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(
                        &self.collection,
                        field,
                        FieldType::Keyword,
                    )
                    .wait(true),
                )
                .await
                .map_err(|e| RagError::vector_store(PROVIDER, "initialize", e))?;
        }

        Ok(())
    }

    /// Chunk ids among `records` already stored under a different tenant
    async fn foreign_ids(&self, tenant_id: &str, records: &[VectorRecord]) -> Result<Vec<String>> {
        let mut foreign = Vec::new();
        for batch in records.chunks(WRITE_BATCH_SIZE) {
            let ids: Vec<PointId> = batch
                .iter()
                .map(|r| PointId::from(point_uuid(&r.id)))
                .collect();

            let existing = self
                .client
                .get_points(
                    GetPointsBuilder::new(&self.collection, ids)
                        .with_payload(true)
                        .with_vectors(false),
                )
                .await
                .map_err(|e| RagError::vector_store(PROVIDER, "create_embeddings", e))?;

            foreign.extend(
                existing
                    .result
                    .into_iter()
                    .filter(|point| payload_string(&point.payload, TENANT_ID) != tenant_id)
                    .map(|point| payload_string(&point.payload, CHUNK_ID)),
            );
        }
        Ok(foreign)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| self.create_or_verify_collection())
            .await?;
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

        let foreign = self.foreign_ids(tenant_id, &records).await?;
        if !foreign.is_empty() {
            return Err(tenant_conflict(PROVIDER, tenant_id, &foreign));
        }

        for (batch_index, batch) in records.chunks(WRITE_BATCH_SIZE).enumerate() {
            let points = batch
                .iter()
                .map(to_point)
                .collect::<Result<Vec<_>>>()?;

            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                .await
                .map_err(|e| RagError::vector_store(PROVIDER, "create_embeddings", e))?;

            tracing::debug!(document_id, batch = batch_index, size = batch.len(), "upserted batch");
        }

        Ok(records.len())
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

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query.to_vec(), n_results as u64)
                    .filter(Filter::must([Condition::matches(
                        TENANT_ID,
                        tenant_id.to_string(),
                    )]))
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::vector_store(PROVIDER, "query_embeddings", e))?;

        let mut results: Vec<ScoredChunk> = response.result.into_iter().map(from_point).collect();
        rank(&mut results);
        Ok(results)
    }

    async fn delete_embeddings_by_document_id(&self, document_id: &str) -> Result<()> {
        self.ensure_initialized("delete_embeddings_by_document_id")?;
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Filter::must([Condition::matches(
                        DOCUMENT_ID,
                        document_id.to_string(),
                    )]))
                    .wait(true),
            )
            .await
            .map_err(|e| {
                RagError::vector_store(PROVIDER, "delete_embeddings_by_document_id", e)
            })?;
        Ok(())
    }

    async fn delete_embedding_by_id(&self, id: &str) -> Result<()> {
        self.ensure_initialized("delete_embedding_by_id")?;
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList {
                        ids: vec![PointId::from(point_uuid(id))],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| RagError::vector_store(PROVIDER, "delete_embedding_by_id", e))?;
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// `{project_id}_chunks` with anything outside `[A-Za-z0-9_-]` replaced
pub fn collection_name(project_id: &str) -> String {
    let sanitized: String = project_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_chunks", sanitized)
}

/// Stable point id for a chunk id
pub fn point_uuid(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

fn to_point(record: &VectorRecord) -> Result<PointStruct> {
    let payload = Payload::try_from(json!({
        CHUNK_ID: record.id,
        TENANT_ID: record.tenant_id,
        DOCUMENT_ID: record.document_id,
        CONTENT: record.content,
    }))
    .map_err(|e| RagError::vector_store(PROVIDER, "create_embeddings", e))?;

    Ok(PointStruct::new(
        point_uuid(&record.id),
        record.embedding.clone(),
        payload,
    ))
}

fn from_point(point: ScoredPoint) -> ScoredChunk {
    let payload = point.payload;
    ScoredChunk {
        id: payload_string(&payload, CHUNK_ID),
        tenant_id: payload_string(&payload, TENANT_ID),
        document_id: payload_string(&payload, DOCUMENT_ID),
        content: payload_string(&payload, CONTENT),
        score: point.score,
    }
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> String {
    payload
        .get(key)
        .and_then(qdrant_value_to_string)
        .unwrap_or_default()
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}
