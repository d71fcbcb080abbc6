//! Ollama embeddings client
//!
//! One request per text against `POST /api/embeddings`; batches are sent
//! sequentially so the output order always matches the input order.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{check_dimensions, EmbeddingProvider};
use crate::errors::{RagError, Result};

const PROVIDER: &str = "ollama";

/// Remote embedding provider backed by an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Create a client for `base_url` (e.g. http://127.0.0.1:11434)
    pub fn new(base_url: &str, model: &str, dimensions: usize, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::embedding(PROVIDER, e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::embedding(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::embedding(
                PROVIDER,
                format!("HTTP {}: {}", status, error_text),
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::embedding(PROVIDER, e))?;

        check_dimensions(PROVIDER, self.dimensions, &body.embedding)?;
        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        tracing::debug!(count = embeddings.len(), model = %self.model, "embedded documents");
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// Ollama embeddings request
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Ollama embeddings response
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let embedder =
            OllamaEmbedder::new("http://localhost:11434/", "nomic-embed-text", 768, Duration::from_secs(5))
                .unwrap();
        assert_eq!(embedder.base_url(), "http://localhost:11434");
        assert_eq!(embedder.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_request_shape() {
        let request = EmbeddingRequest {
            model: "nomic-embed-text",
            prompt: "hello",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["prompt"], "hello");
    }

    #[test]
    fn test_response_parse() {
        let body: EmbeddingResponse =
            serde_json::from_str(r#"{"embedding":[0.5,-0.25,1.0]}"#).unwrap();
        assert_eq!(body.embedding, vec![0.5, -0.25, 1.0]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_wrapped() {
        let embedder =
            OllamaEmbedder::new("http://127.0.0.1:9", "nomic-embed-text", 768, Duration::from_secs(2))
                .unwrap();
        let err = embedder.embed_query("hello").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding { ref provider, .. } if provider == "ollama"));
    }

    #[tokio::test]
    #[ignore] // Requires Ollama running with nomic-embed-text pulled
    async fn test_query_and_document_lengths_match() {
        let embedder =
            OllamaEmbedder::new("http://127.0.0.1:11434", "nomic-embed-text", 768, Duration::from_secs(30))
                .unwrap();
        let query = embedder.embed_query("grass").await.unwrap();
        let docs = embedder.embed_documents(&["grass".to_string()]).await.unwrap();
        assert_eq!(query.len(), embedder.dimensions());
        assert_eq!(docs[0].len(), embedder.dimensions());
    }
}
