//! Ollama language model client
//!
//! - `POST /api/generate` for completion (buffered or streamed)
//! - `POST /api/chat` for conversations
//! - `GET /api/tags` as the health check

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::stream::decode_objects;
use super::{
    ChatMessage, FinishReason, Generation, GenerationOptions, LanguageModel, TextStream,
};
use crate::errors::{RagError, Result};

const PROVIDER: &str = "ollama";

/// Health checks fail fast regardless of the request timeout
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Ollama-backed language model
#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaLlm {
    /// Create a client for `model` served at `base_url`
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::llm(PROVIDER, "connect", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Models installed on the server
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| RagError::llm(PROVIDER, "list_models", e))?;

        let response = check_status(response, "list_models").await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| RagError::llm(PROVIDER, "list_models", e))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        operation: &'static str,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::llm(PROVIDER, operation, e))?;

        check_status(response, operation).await
    }

    /// Streamed `/api/generate` objects; in-band errors become `Err` items
    async fn generate_chunks(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<BoxStream<'static, Result<GenerateChunk>>> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: SamplingOptions::from(options),
        };
        let response = self.post("/api/generate", &request, "generate_stream").await?;

        let chunks = decode_objects::<_, _, GenerateChunk>(PROVIDER, response.bytes_stream())
            .map(|item: Result<GenerateChunk>| -> Result<GenerateChunk> {
                let mut chunk = item?;
                match chunk.error.take() {
                    Some(error) => Err(RagError::llm(PROVIDER, "stream", error)),
                    None => Ok(chunk),
                }
            });

        Ok(chunks.boxed())
    }
}

async fn check_status(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(RagError::llm(
        PROVIDER,
        operation,
        format!("HTTP {}: {}", status, error_text),
    ))
}

#[async_trait]
impl LanguageModel for OllamaLlm {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Generation> {
        options.validate()?;

        if options.stream {
            let mut chunks = self.generate_chunks(prompt, options).await?;
            let mut text = String::new();
            let mut last = None;
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                text.push_str(&chunk.response);
                if chunk.done {
                    last = Some(chunk);
                }
            }

            // The closing `done` object carries the stop reason and eval counts
            let (tokens_used, reason) = match &last {
                Some(chunk) => (chunk.token_count(), chunk.done_reason.as_deref()),
                None => (None, None),
            };
            return Ok(Generation {
                text,
                tokens_used,
                finish_reason: FinishReason::from_backend(reason),
            });
        }

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: SamplingOptions::from(options),
        };
        let response = self.post("/api/generate", &request, "generate").await?;
        let body: GenerateChunk = response
            .json()
            .await
            .map_err(|e| RagError::llm(PROVIDER, "generate", e))?;

        if let Some(error) = body.error {
            return Err(RagError::llm(PROVIDER, "generate", error));
        }

        tracing::debug!(model = %self.model, tokens = ?body.token_count(), "generation complete");

        Ok(Generation {
            tokens_used: body.token_count(),
            finish_reason: FinishReason::from_backend(body.done_reason.as_deref()),
            text: body.response,
        })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        options.validate()?;

        let fragments = self
            .generate_chunks(prompt, options)
            .await?
            .filter_map(|item| async move {
                match item {
                    Ok(chunk) if chunk.response.is_empty() => None,
                    Ok(chunk) => Some(Ok(chunk.response)),
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(fragments.boxed())
    }

    async fn chat(&self, messages: &[ChatMessage], options: &GenerationOptions) -> Result<Generation> {
        options.validate()?;

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: SamplingOptions::from(options),
        };
        let response = self.post("/api/chat", &request, "chat").await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::llm(PROVIDER, "chat", e))?;

        if let Some(error) = body.error {
            return Err(RagError::llm(PROVIDER, "chat", error));
        }

        let tokens_used = match (body.prompt_eval_count, body.eval_count) {
            (None, None) => None,
            (p, e) => Some(p.unwrap_or(0) + e.unwrap_or(0)),
        };

        Ok(Generation {
            text: body.message.map(|m| m.content).unwrap_or_default(),
            tokens_used,
            finish_reason: FinishReason::from_backend(body.done_reason.as_deref()),
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "ollama health check failed");
                false
            }
        }
    }
}

/// Sampling options in Ollama's naming
#[derive(Debug, Default, Serialize, PartialEq)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

impl From<&GenerationOptions> for SamplingOptions {
    fn from(options: &GenerationOptions) -> Self {
        Self {
            num_predict: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            stop: options.stop_sequences.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: SamplingOptions,
}

/// One `/api/generate` object: the whole answer, or one streamed fragment
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateChunk {
    response: String,
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

impl GenerateChunk {
    fn token_count(&self) -> Option<u32> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (p, e) => Some(p.unwrap_or(0) + e.unwrap_or(0)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatResponse {
    message: Option<ChatMessage>,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}
