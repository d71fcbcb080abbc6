//! Service facade
//!
//! Builds every component from `Config` once, runs store initialization and
//! language model selection at startup, then exposes the public entry points.

use std::sync::Arc;
use std::time::Duration;

use crate::chunking::TextSplitter;
use crate::config::{Config, LlmConfig, RetrievalConfig};
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::errors::Result;
use crate::indexing::{IndexReport, IndexingPipeline};
use crate::llm::{
    select_available, GenerationOptions, LanguageModel, LanguageModelBackend, TextStream,
};
use crate::query::context::{ContextBuilder, ContextConfig};
use crate::query::{Answer, QueryPipeline};
use crate::telemetry::{TelemetryCollector, TelemetryStats};
use crate::vector_store::{VectorStore, VectorStoreBackend};

pub struct RagService {
    indexing: IndexingPipeline,
    query: QueryPipeline,
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn VectorStore>,
    telemetry: TelemetryCollector,
}

impl RagService {
    /// Validate config, build providers, initialize the store and pick the
    /// first healthy language model
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let timeout = Duration::from_secs(config.network.request_timeout_secs);

        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(Embedder::from_config(&config.embedding, timeout)?);

        let store: Arc<dyn VectorStore> =
            Arc::new(VectorStoreBackend::from_config(&config.vector_store)?);
        store.initialize().await?;

        let candidates = config
            .llm
            .backends
            .iter()
            .map(|backend| {
                LanguageModelBackend::from_config(backend, timeout)
                    .map(|llm| Arc::new(llm) as Arc<dyn LanguageModel>)
            })
            .collect::<Result<Vec<_>>>()?;
        let llm = select_available(candidates).await?;

        tracing::info!(
            embedder = embedder.name(),
            store = store.name(),
            llm = llm.model(),
            "service ready"
        );

        Ok(Self::from_parts(
            config.text_splitter()?,
            embedder,
            store,
            llm,
            &config.retrieval,
            &config.llm,
        ))
    }

    /// Assemble from already-built components; the store must already be
    /// initialized
    pub fn from_parts(
        splitter: TextSplitter,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        retrieval: &RetrievalConfig,
        generation: &LlmConfig,
    ) -> Self {
        let telemetry = TelemetryCollector::new();

        let indexing = IndexingPipeline::new(
            splitter,
            Arc::clone(&embedder),
            Arc::clone(&store),
            telemetry.clone(),
        );

        let context = ContextBuilder::with_config(ContextConfig {
            max_context_tokens: retrieval.max_context_tokens,
            include_scores: false,
            format: retrieval.format,
        });
        let options = GenerationOptions {
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            ..Default::default()
        };
        let query = QueryPipeline::new(embedder, Arc::clone(&store), Arc::clone(&llm), telemetry.clone())
            .with_top_k(retrieval.top_k)
            .with_context_builder(context)
            .with_generation_options(options);

        Self {
            indexing,
            query,
            llm,
            store,
            telemetry,
        }
    }

    pub async fn index_document(
        &self,
        tenant_id: &str,
        document_id: &str,
        text: &str,
    ) -> Result<IndexReport> {
        self.indexing.index_document(tenant_id, document_id, text).await
    }

    pub async fn reindex_document(
        &self,
        tenant_id: &str,
        document_id: &str,
        text: &str,
    ) -> Result<IndexReport> {
        self.indexing.reindex_document(tenant_id, document_id, text).await
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.indexing.delete_document(document_id).await
    }

    pub async fn answer_query(&self, tenant_id: &str, query: &str) -> Result<String> {
        self.query.answer_query(tenant_id, query).await
    }

    pub async fn answer_with_sources(&self, tenant_id: &str, query: &str) -> Result<Answer> {
        self.query.answer_with_sources(tenant_id, query).await
    }

    pub async fn answer_query_stream(&self, tenant_id: &str, query: &str) -> Result<TextStream> {
        self.query.answer_query_stream(tenant_id, query).await
    }

    /// Ranked snippets; `count = None` uses the configured top-k
    pub async fn search_text(
        &self,
        tenant_id: &str,
        query: &str,
        count: Option<usize>,
    ) -> Result<Vec<String>> {
        self.query.search_text(tenant_id, query, count).await
    }

    /// Language model selected at startup
    pub fn language_model(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    pub fn stats(&self) -> TelemetryStats {
        self.telemetry.get_stats()
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }
}
