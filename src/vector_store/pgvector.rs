//! PostgreSQL + pgvector store
//!
//! Records live in one table keyed by chunk id. Similarity is
//! `1 - (embedding <=> query)` over an HNSW cosine index; every query is
//! filtered on `tenant_id`.

use anyhow::Context;
use async_trait::async_trait;
use pgvector::Vector;
use tokio::sync::OnceCell;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use super::{
    build_records, check_dimensions, not_initialized, rank, tenant_conflict, ScoredChunk,
    VectorRecord, VectorStore, WRITE_BATCH_SIZE,
};
use crate::errors::{RagError, Result};

const PROVIDER: &str = "pgvector";

/// Bound parameters per inserted row
const PARAMS_PER_ROW: usize = 5;

/// Fully-qualified Postgres table name (schema + table)
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> anyhow::Result<Self> {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Quoted `schema.table`
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Index name derived from schema, table and a suffix
    pub fn index_name(&self, suffix: &str) -> String {
        quote_ident(&format!(
            "{}_{}_{}",
            sanitize_ident(&self.schema),
            sanitize_ident(&self.table),
            suffix
        ))
    }
}

/// Quote a Postgres identifier, escaping embedded quotes
pub fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

pub struct PgVectorStore {
    database_url: String,
    table: TableName,
    dimensions: usize,
    client: OnceCell<Client>,
}

impl PgVectorStore {
    /// Validate names; the connection is opened by `initialize`
    pub fn new(database_url: &str, schema: &str, table: &str, dimensions: usize) -> Result<Self> {
        let table = TableName::new(schema, table)
            .map_err(|e| RagError::vector_store(PROVIDER, "connect", e))?;

        Ok(Self {
            database_url: database_url.to_string(),
            table,
            dimensions,
            client: OnceCell::new(),
        })
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    fn client(&self, operation: &'static str) -> Result<&Client> {
        self.client
            .get()
            .ok_or_else(|| not_initialized(PROVIDER, operation))
    }

    async fn connect(&self) -> anyhow::Result<Client> {
        let (client, connection) = tokio_postgres::connect(&self.database_url, NoTls)
            .await
            .context("failed to connect to Postgres")?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });

        for statement in schema_statements(&self.table, self.dimensions) {
            client
                .batch_execute(&statement)
                .await
                .with_context(|| format!("failed to run: {}", statement))?;
        }

        tracing::info!(table = %self.table.qualified(), dimensions = self.dimensions, "pgvector schema ready");
        Ok(client)
    }

    async fn insert_batch(&self, client: &Client, records: &[VectorRecord]) -> Result<()> {
        let sql = insert_sql(&self.table, records.len());

        let vectors: Vec<Vector> = records
            .iter()
            .map(|r| Vector::from(r.embedding.clone()))
            .collect();

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(records.len() * PARAMS_PER_ROW);
        for (record, vector) in records.iter().zip(&vectors) {
            params.push(&record.id);
            params.push(&record.tenant_id);
            params.push(&record.document_id);
            params.push(&record.content);
            params.push(vector);
        }

        let affected = client
            .execute(sql.as_str(), &params)
            .await
            .map_err(|e| RagError::vector_store(PROVIDER, "create_embeddings", e))?;

        // Rows owned by another tenant are skipped by the upsert guard
        if affected != records.len() as u64 {
            let tenant_id = records.first().map(|r| r.tenant_id.as_str()).unwrap_or_default();
            let skipped = self.foreign_ids(client, tenant_id, records).await?;
            return Err(tenant_conflict(PROVIDER, tenant_id, &skipped));
        }
        Ok(())
    }

    /// Chunk ids among `records` already stored under a different tenant
    async fn foreign_ids(
        &self,
        client: &Client,
        tenant_id: &str,
        records: &[VectorRecord],
    ) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT id FROM {} WHERE id = ANY($1) AND tenant_id <> $2 ORDER BY id",
            self.table.qualified()
        );
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let rows = client
            .query(sql.as_str(), &[&ids, &tenant_id])
            .await
            .map_err(|e| RagError::vector_store(PROVIDER, "create_embeddings", e))?;

        rows.iter()
            .map(|row| row.try_get::<_, String>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RagError::vector_store(PROVIDER, "create_embeddings", e))
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn initialize(&self) -> Result<()> {
        self.client
            .get_or_try_init(|| async {
                self.connect()
                    .await
                    .map_err(|e| RagError::vector_store(PROVIDER, "initialize", e))
            })
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
        let client = self.client("create_embeddings")?;
        let records = build_records(
            PROVIDER,
            self.dimensions,
            tenant_id,
            document_id,
            embeddings,
            contents,
        )?;

        let foreign = self.foreign_ids(client, tenant_id, &records).await?;
        if !foreign.is_empty() {
            return Err(tenant_conflict(PROVIDER, tenant_id, &foreign));
        }

        for batch in records.chunks(WRITE_BATCH_SIZE) {
            self.insert_batch(client, batch).await?;
            tracing::debug!(document_id, size = batch.len(), "inserted batch");
        }

        Ok(records.len())
    }

    async fn query_embeddings(
        &self,
        query: &[f32],
        tenant_id: &str,
        n_results: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let client = self.client("query_embeddings")?;
        check_dimensions(PROVIDER, "query_embeddings", self.dimensions, query)?;
        if n_results == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, tenant_id, document_id, content, \
                (1 - (embedding <=> $1))::real AS similarity \
             FROM {} \
             WHERE tenant_id = $2 \
             ORDER BY embedding <=> $1 ASC, id ASC \
             LIMIT $3",
            self.table.qualified()
        );

        let vector = Vector::from(query.to_vec());
        let limit = n_results as i64;
        let rows = client
            .query(sql.as_str(), &[&vector, &tenant_id, &limit])
            .await
            .map_err(|e| RagError::vector_store(PROVIDER, "query_embeddings", e))?;

        let mut results = rows
            .iter()
            .map(|row| -> std::result::Result<ScoredChunk, tokio_postgres::Error> {
                Ok(ScoredChunk {
                    id: row.try_get("id")?,
                    tenant_id: row.try_get("tenant_id")?,
                    document_id: row.try_get("document_id")?,
                    content: row.try_get("content")?,
                    score: row.try_get("similarity")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RagError::vector_store(PROVIDER, "query_embeddings", e))?;

        rank(&mut results);
        Ok(results)
    }

    async fn delete_embeddings_by_document_id(&self, document_id: &str) -> Result<()> {
        let client = self.client("delete_embeddings_by_document_id")?;
        let sql = format!("DELETE FROM {} WHERE document_id = $1", self.table.qualified());
        let deleted = client
            .execute(sql.as_str(), &[&document_id])
            .await
            .map_err(|e| RagError::vector_store(PROVIDER, "delete_embeddings_by_document_id", e))?;
        tracing::debug!(document_id, deleted, "deleted document rows");
        Ok(())
    }

    async fn delete_embedding_by_id(&self, id: &str) -> Result<()> {
        let client = self.client("delete_embedding_by_id")?;
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table.qualified());
        client
            .execute(sql.as_str(), &[&id])
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

/// Idempotent DDL run on initialize
fn schema_statements(table: &TableName, dimensions: usize) -> Vec<String> {
    let qualified = table.qualified();
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding VECTOR({}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            qualified, dimensions
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING hnsw (embedding vector_cosine_ops)",
            table.index_name("embedding_hnsw_idx"),
            qualified
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (tenant_id)",
            table.index_name("tenant_idx"),
            qualified
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (document_id)",
            table.index_name("document_idx"),
            qualified
        ),
    ]
}

/// Multi-row upsert for `rows` records
fn insert_sql(table: &TableName, rows: usize) -> String {
    let values: Vec<String> = (0..rows)
        .map(|row| {
            let base = row * PARAMS_PER_ROW;
            format!(
                "(${}, ${}, ${}, ${}, ${})",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5
            )
        })
        .collect();

    format!(
        "INSERT INTO {} AS existing (id, tenant_id, document_id, content, embedding) VALUES {} \
         ON CONFLICT (id) DO UPDATE SET \
            content = EXCLUDED.content, \
            embedding = EXCLUDED.embedding \
         WHERE existing.tenant_id = EXCLUDED.tenant_id",
        table.qualified(),
        values.join(", ")
    )
}
