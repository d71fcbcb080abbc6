//! Language model providers
//!
//! Completion, chat and token streaming behind one trait. The configured
//! backends are health-checked once at startup and the first one that
//! answers is used for the process lifetime.

pub mod ollama;
pub mod stream;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmBackendConfig;
use crate::errors::{RagError, Result};

pub use ollama::OllamaLlm;

/// Lazy, finite sequence of generated text fragments. Dropping it cancels
/// the underlying request.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Sampling and delivery options for one generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// 0.0 is deterministic, 1.0 is most random
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff
    pub top_k: Option<u32>,
    /// Strings that end generation early
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    /// Deliver tokens as they are produced
    #[serde(default)]
    pub stream: bool,
}

impl GenerationOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    /// Check sampling ranges
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(RagError::ConfigError(format!(
                    "temperature {} outside 0.0..=1.0",
                    t
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(RagError::ConfigError(format!("top_p {} outside 0.0..=1.0", p)));
            }
        }
        Ok(())
    }
}

/// Why generation stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end or a stop sequence
    Stop,
    /// Hit `max_tokens`
    Length,
    /// Anything else the backend reported
    Other(String),
}

impl FinishReason {
    /// Map a backend's reason string
    pub fn from_backend(reason: Option<&str>) -> Self {
        match reason {
            None | Some("stop") | Some("") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }
}

/// Completed generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub tokens_used: Option<u32>,
    pub finish_reason: FinishReason,
}

/// Chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Capability set shared by every language model backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name used in errors and logs
    fn name(&self) -> &str;

    /// Model identifier
    fn model(&self) -> &str;

    /// Complete a prompt
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Generation>;

    /// Complete a prompt, yielding fragments as they arrive
    async fn generate_stream(&self, prompt: &str, options: &GenerationOptions)
        -> Result<TextStream>;

    /// Continue a conversation
    async fn chat(&self, messages: &[ChatMessage], options: &GenerationOptions)
        -> Result<Generation>;

    /// Health check
    async fn is_available(&self) -> bool;
}

/// Closed set of language model backends
pub enum LanguageModelBackend {
    Ollama(OllamaLlm),
}

impl LanguageModelBackend {
    /// Build one configured backend
    pub fn from_config(config: &LlmBackendConfig, timeout: Duration) -> Result<Self> {
        match config {
            LlmBackendConfig::Ollama { base_url, model } => {
                Ok(LanguageModelBackend::Ollama(OllamaLlm::new(base_url, model, timeout)?))
            }
        }
    }

    fn inner(&self) -> &dyn LanguageModel {
        match self {
            LanguageModelBackend::Ollama(llm) => llm,
        }
    }
}

#[async_trait]
impl LanguageModel for LanguageModelBackend {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn model(&self) -> &str {
        self.inner().model()
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Generation> {
        self.inner().generate(prompt, options).await
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        self.inner().generate_stream(prompt, options).await
    }

    async fn chat(&self, messages: &[ChatMessage], options: &GenerationOptions) -> Result<Generation> {
        self.inner().chat(messages, options).await
    }

    async fn is_available(&self) -> bool {
        self.inner().is_available().await
    }
}

/// Return the first candidate whose health check passes
pub async fn select_available(
    candidates: Vec<Arc<dyn LanguageModel>>,
) -> Result<Arc<dyn LanguageModel>> {
    let mut checked = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let label = format!("{}:{}", candidate.name(), candidate.model());
        if candidate.is_available().await {
            tracing::info!(provider = %label, "language model available");
            return Ok(candidate);
        }
        tracing::warn!(provider = %label, "language model failed health check");
        checked.push(label);
    }

    Err(RagError::NoProviderAvailable { providers: checked })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedHealth {
        model: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl LanguageModel for FixedHealth {
        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            self.model
        }

        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<Generation> {
            Ok(Generation {
                text: self.model.to_string(),
                tokens_used: None,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<TextStream> {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            options: &GenerationOptions,
        ) -> Result<Generation> {
            self.generate("", options).await
        }

        async fn is_available(&self) -> bool {
            self.healthy
        }
    }

    #[tokio::test]
    async fn test_select_first_healthy() {
        let candidates: Vec<Arc<dyn LanguageModel>> = vec![
            Arc::new(FixedHealth { model: "down", healthy: false }),
            Arc::new(FixedHealth { model: "up", healthy: true }),
        ];
        let selected = select_available(candidates).await.unwrap();
        assert_eq!(selected.model(), "up");
    }

    #[tokio::test]
    async fn test_select_none_available() {
        let candidates: Vec<Arc<dyn LanguageModel>> = vec![
            Arc::new(FixedHealth { model: "a", healthy: false }),
            Arc::new(FixedHealth { model: "b", healthy: false }),
        ];
        let err = select_available(candidates).await.err().unwrap();
        match err {
            RagError::NoProviderAvailable { providers } => {
                assert_eq!(providers, vec!["fixed:a", "fixed:b"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_select_empty_list() {
        assert!(matches!(
            select_available(Vec::new()).await,
            Err(RagError::NoProviderAvailable { .. })
        ));
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_backend(None), FinishReason::Stop);
        assert_eq!(FinishReason::from_backend(Some("length")), FinishReason::Length);
        assert_eq!(
            FinishReason::from_backend(Some("load")),
            FinishReason::Other("load".to_string())
        );
    }

    #[test]
    fn test_options_validation() {
        assert!(GenerationOptions::default().with_temperature(0.0).validate().is_ok());
        assert!(GenerationOptions::default().with_temperature(1.5).validate().is_err());
        let options = GenerationOptions {
            top_p: Some(-0.1),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_chat_role_serialization() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
    }
}
