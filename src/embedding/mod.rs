//! Embedding providers
//!
//! Turns text into fixed-length vectors. Two backends exist:
//! - `local`: a sentence-transformer run in-process with candle
//! - `ollama`: an Ollama server's embeddings endpoint
//!
//! The backend is picked once at startup by [`Embedder::from_config`] and
//! handed to the pipelines as an `Arc<dyn EmbeddingProvider>`.

pub mod local;
pub mod ollama;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::errors::{RagError, Result};

pub use local::LocalEmbedder;
pub use ollama::OllamaEmbedder;

/// Capability set shared by every embedding backend
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of documents; output order matches input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Length of every vector this provider produces
    fn dimensions(&self) -> usize;

    /// Provider name used in errors and logs
    fn name(&self) -> &str;
}

/// Closed set of embedding backends
pub enum Embedder {
    Local(LocalEmbedder),
    Ollama(OllamaEmbedder),
}

impl Embedder {
    /// Build the configured backend. The local model is not loaded here;
    /// it loads on first use.
    pub fn from_config(config: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        match config {
            EmbeddingConfig::Local {
                model,
                revision,
                dimensions,
            } => Ok(Embedder::Local(LocalEmbedder::new(
                model.clone(),
                revision.clone(),
                *dimensions,
            ))),
            EmbeddingConfig::Ollama {
                base_url,
                model,
                dimensions,
            } => Ok(Embedder::Ollama(OllamaEmbedder::new(
                base_url, model, *dimensions, timeout,
            )?)),
        }
    }

    fn inner(&self) -> &dyn EmbeddingProvider {
        match self {
            Embedder::Local(e) => e,
            Embedder::Ollama(e) => e,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner().embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.inner().embed_query(text).await
    }

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner().dimensions()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

/// Reject a vector whose length differs from the declared dimensionality
pub(crate) fn check_dimensions(provider: &str, expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(RagError::embedding(
            provider,
            format!(
                "model returned {} dimensions, expected {}",
                vector.len(),
                expected
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_local_is_lazy() {
        let embedder =
            Embedder::from_config(&EmbeddingConfig::default(), Duration::from_secs(5)).unwrap();
        assert_eq!(embedder.name(), "local");
        assert_eq!(embedder.dimensions(), 384);
        assert_eq!(embedder.model_name(), "sentence-transformers/all-MiniLM-L6-v2");
    }

    #[test]
    fn test_from_config_ollama() {
        let config = EmbeddingConfig::Ollama {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
        };
        let embedder = Embedder::from_config(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(embedder.name(), "ollama");
        assert_eq!(embedder.dimensions(), 768);
    }

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions("test", 3, &[0.1, 0.2, 0.3]).is_ok());
        let err = check_dimensions("test", 3, &[0.1]).unwrap_err();
        assert!(matches!(err, RagError::Embedding { .. }));
    }
}
