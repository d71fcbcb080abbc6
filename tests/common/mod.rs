//! Shared test doubles for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ragline::chunking::{ChunkUnit, TextSplitter};
use ragline::config::{LlmConfig, RetrievalConfig};
use ragline::embedding::EmbeddingProvider;
use ragline::llm::{
    ChatMessage, FinishReason, Generation, GenerationOptions, LanguageModel, TextStream,
};
use ragline::vector_store::{MemoryVectorStore, VectorStore};
use ragline::{RagService, Result};

pub const DIMENSIONS: usize = 64;

/// Deterministic hashed bag-of-words embedder. Case, punctuation and a few
/// stop words are ignored, so "grass?" and "Grass." land in the same bucket.
pub struct BagOfWordsEmbedder {
    dimensions: usize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self {
            dimensions: DIMENSIONS,
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if word.is_empty() || STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            vector[bucket(&word, self.dimensions)] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

const STOP_WORDS: &[&str] = &["the", "is", "a", "what", "of"];

/// FNV-1a
fn bucket(word: &str, dimensions: usize) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % dimensions as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "test"
    }
}

/// Language model that returns a fixed reply and counts calls
pub struct ScriptedLlm {
    reply: String,
    healthy: bool,
    pub calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            healthy: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new("")
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Generation {
            text: self.reply.clone(),
            tokens_used: Some(self.reply.split_whitespace().count() as u32),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fragments: Vec<Result<String>> = self
            .reply
            .split_inclusive(' ')
            .map(|f| Ok(f.to_string()))
            .collect();
        Ok(stream::iter(fragments).boxed())
    }

    async fn chat(&self, _messages: &[ChatMessage], options: &GenerationOptions) -> Result<Generation> {
        self.generate("", options).await
    }

    async fn is_available(&self) -> bool {
        self.healthy
    }
}

/// Everything a test needs to drive and inspect a service
pub struct Harness {
    pub service: RagService,
    pub store: Arc<MemoryVectorStore>,
    pub llm: Arc<ScriptedLlm>,
}

/// Service over an initialized in-memory store, word chunks of `size`/`overlap`
pub async fn harness(size: usize, overlap: usize) -> Harness {
    let store = Arc::new(MemoryVectorStore::new(DIMENSIONS));
    store.initialize().await.unwrap();
    build(store, size, overlap)
}

/// Same as [`harness`] but the store is never initialized
pub fn uninitialized_harness() -> Harness {
    build(Arc::new(MemoryVectorStore::new(DIMENSIONS)), 16, 4)
}

fn build(store: Arc<MemoryVectorStore>, size: usize, overlap: usize) -> Harness {
    let llm = Arc::new(ScriptedLlm::new("Grass is green."));
    let service = RagService::from_parts(
        TextSplitter::new(size, overlap, ChunkUnit::Words).unwrap(),
        Arc::new(BagOfWordsEmbedder::new()),
        store.clone(),
        llm.clone(),
        &RetrievalConfig::default(),
        &LlmConfig::default(),
    );
    Harness {
        service,
        store,
        llm,
    }
}
