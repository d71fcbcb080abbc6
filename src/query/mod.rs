//! Query pipeline
//!
//! embed question → retrieve top-k for the tenant → assemble context →
//! synthesize an answer. Retrieval order is stable; the generated text is
//! only as deterministic as the model's temperature allows.

pub mod context;

use futures_util::stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::embedding::EmbeddingProvider;
use crate::errors::Result;
use crate::llm::{FinishReason, GenerationOptions, LanguageModel, TextStream};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::vector_store::{ScoredChunk, VectorStore, DEFAULT_N_RESULTS};

use context::{AssembledContext, ContextBuilder};

/// Returned without calling the model when nothing was retrieved
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant context to answer that question.";

/// Synthesized answer with the chunks it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
    pub tokens_used: Option<u32>,
    pub finish_reason: FinishReason,
}

pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LanguageModel>,
    context: ContextBuilder,
    top_k: usize,
    options: GenerationOptions,
    telemetry: TelemetryCollector,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            context: ContextBuilder::new(),
            top_k: DEFAULT_N_RESULTS,
            options: GenerationOptions::default(),
            telemetry,
        }
    }

    /// Number of chunks retrieved for answers
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Ranked chunks for the tenant; `count` defaults to the configured top-k
    pub async fn search(
        &self,
        tenant_id: &str,
        query: &str,
        count: Option<usize>,
    ) -> Result<Vec<ScoredChunk>> {
        let started = Instant::now();
        let n_results = count.unwrap_or(self.top_k);

        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .inspect_err(|e| self.telemetry.record_failure("embed", e))?;

        let results = self
            .store
            .query_embeddings(&embedding, tenant_id, n_results)
            .await
            .inspect_err(|e| self.telemetry.record_failure("retrieve", e))?;

        self.telemetry.record(TelemetryEvent::SearchPerformed {
            tenant_id: tenant_id.to_string(),
            results: results.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Instant::now(),
        });
        tracing::debug!(tenant_id, results = results.len(), "retrieved chunks");

        Ok(results)
    }

    /// Raw ranked snippet contents, no synthesis
    pub async fn search_text(
        &self,
        tenant_id: &str,
        query: &str,
        count: Option<usize>,
    ) -> Result<Vec<String>> {
        let results = self.search(tenant_id, query, count).await?;
        Ok(results.into_iter().map(|r| r.content).collect())
    }

    pub async fn answer_query(&self, tenant_id: &str, query: &str) -> Result<String> {
        Ok(self.answer_with_sources(tenant_id, query).await?.answer)
    }

    /// Answer plus the retrieved chunks and generation metadata
    pub async fn answer_with_sources(&self, tenant_id: &str, query: &str) -> Result<Answer> {
        let started = Instant::now();
        let sources = self.search(tenant_id, query, None).await?;
        let context = self.context.build(&sources);

        let answer = if context.is_empty() {
            Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources,
                tokens_used: None,
                finish_reason: FinishReason::Stop,
            }
        } else {
            let prompt = self.context.augment_prompt(query, &context);
            let generation = self
                .llm
                .generate(&prompt, &self.options)
                .await
                .inspect_err(|e| self.telemetry.record_failure("generate", e))?;
            Answer {
                answer: generation.text,
                sources: used_sources(sources, &context),
                tokens_used: generation.tokens_used,
                finish_reason: generation.finish_reason,
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.telemetry.record(TelemetryEvent::QueryAnswered {
            tenant_id: tenant_id.to_string(),
            retrieved: answer.sources.len(),
            tokens_used: answer.tokens_used,
            duration_ms,
            timestamp: Instant::now(),
        });
        tracing::info!(
            tenant_id,
            sources = answer.sources.len(),
            tokens = ?answer.tokens_used,
            duration_ms,
            "answered query"
        );

        Ok(answer)
    }

    /// Stream the synthesized answer fragment by fragment
    ///
    /// The query counts as answered once the stream is open; token usage is
    /// not known up front.
    pub async fn answer_query_stream(&self, tenant_id: &str, query: &str) -> Result<TextStream> {
        let started = Instant::now();
        let sources = self.search(tenant_id, query, None).await?;
        let context = self.context.build(&sources);

        if context.is_empty() {
            self.record_answered(tenant_id, 0, started);
            return Ok(stream::once(async { Ok(NO_CONTEXT_ANSWER.to_string()) }).boxed());
        }

        let prompt = self.context.augment_prompt(query, &context);
        let options = GenerationOptions {
            stream: true,
            ..self.options.clone()
        };
        let fragments = self
            .llm
            .generate_stream(&prompt, &options)
            .await
            .inspect_err(|e| self.telemetry.record_failure("generate", e))?;

        self.record_answered(tenant_id, context.chunk_count, started);
        Ok(fragments)
    }

    fn record_answered(&self, tenant_id: &str, retrieved: usize, started: Instant) {
        self.telemetry.record(TelemetryEvent::QueryAnswered {
            tenant_id: tenant_id.to_string(),
            retrieved,
            tokens_used: None,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Instant::now(),
        });
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

/// Keep only the chunks that made it into the context
fn used_sources(sources: Vec<ScoredChunk>, context: &AssembledContext) -> Vec<ScoredChunk> {
    sources
        .into_iter()
        .take(context.chunk_count)
        .collect()
}
