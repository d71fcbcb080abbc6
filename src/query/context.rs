//! Context assembly for retrieval-augmented prompts
use serde::{Deserialize, Serialize};

use crate::vector_store::ScoredChunk;

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Budget for retrieved context, estimated at ~4 bytes per token
    pub max_context_tokens: usize,
    /// Show similarity scores next to each chunk
    pub include_scores: bool,
    pub format: ContextFormat,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 2000,
            include_scores: false,
            format: ContextFormat::default(),
        }
    }
}

/// Format for presenting context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFormat {
    /// Clear chunk boundaries with source labels
    Structured,
    /// Compact single-line format
    Inline,
    /// Numbered list
    #[default]
    Numbered,
}

/// Assembled context for prompt augmentation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub chunk_count: usize,
    pub estimated_tokens: usize,
    /// Chunk ids included, best first
    pub chunk_ids: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }
}

pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Pack chunks best-first until the token budget is reached. The top
    /// chunk is always included so a small budget never hides every result.
    pub fn build(&self, chunks: &[ScoredChunk]) -> AssembledContext {
        let mut parts = Vec::new();
        let mut total_tokens = 0;
        let mut chunk_ids = Vec::new();

        for chunk in chunks {
            let tokens = estimate_tokens(&chunk.content);
            if !parts.is_empty() && total_tokens + tokens > self.config.max_context_tokens {
                break;
            }

            parts.push(self.format_chunk(parts.len() + 1, chunk));
            total_tokens += tokens;
            chunk_ids.push(chunk.id.clone());
        }

        if parts.is_empty() {
            return AssembledContext::default();
        }

        let text = match self.config.format {
            ContextFormat::Structured => format!(
                "Retrieved Context ({} chunks):\n\n{}\n",
                parts.len(),
                parts.join("\n\n")
            ),
            ContextFormat::Inline => format!("Context: {}", parts.join(" | ")),
            ContextFormat::Numbered => format!("Context:\n{}\n", parts.join("\n")),
        };

        AssembledContext {
            text,
            chunk_count: parts.len(),
            estimated_tokens: total_tokens,
            chunk_ids,
        }
    }

    fn format_chunk(&self, index: usize, chunk: &ScoredChunk) -> String {
        let content = chunk.content.trim();
        match (self.config.format, self.config.include_scores) {
            (ContextFormat::Structured, true) => format!(
                "[Chunk {}] (source: {}, score: {:.2})\n{}",
                index, chunk.document_id, chunk.score, content
            ),
            (ContextFormat::Structured, false) => format!(
                "[Chunk {}] (source: {})\n{}",
                index, chunk.document_id, content
            ),
            (ContextFormat::Inline, true) => {
                format!("[{}|{:.2}] {}", chunk.document_id, chunk.score, content)
            }
            (ContextFormat::Inline, false) => content.to_string(),
            (ContextFormat::Numbered, true) => {
                format!("{}. (score: {:.2}) {}", index, chunk.score, content)
            }
            (ContextFormat::Numbered, false) => format!("{}. {}", index, content),
        }
    }

    /// Prompt asking the model to answer from the assembled context only
    pub fn augment_prompt(&self, question: &str, context: &AssembledContext) -> String {
        format!(
            "Answer the question using only the context below. \
             If the context does not contain the answer, say that you don't know.\n\n\
             {}\nQuestion: {}\nAnswer:",
            context.text, question
        )
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Rough token estimate: ~4 bytes per token
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
