//! Error types for ragline
//!
//! Every provider failure is wrapped with the provider name (and, for
//! stores and language models, the operation) so a caller can tell which
//! backend broke without re-running anything.

use thiserror::Error;

/// Boxed underlying cause carried by provider errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the RAG pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid chunk size / overlap combination
    #[error("Invalid chunking configuration (size {chunk_size}, overlap {chunk_overlap}): {reason}")]
    ChunkingConfiguration {
        chunk_size: usize,
        chunk_overlap: usize,
        reason: String,
    },

    /// Embedding backend failures
    #[error("Embedding provider '{provider}' failed: {source}")]
    Embedding {
        provider: String,
        #[source]
        source: BoxError,
    },

    /// Vector store failures (initialize, write, query, delete)
    #[error("Vector store '{provider}' failed during {operation}: {source}")]
    VectorStore {
        provider: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// Language model failures
    #[error("Language model '{provider}' failed during {operation}: {source}")]
    Llm {
        provider: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// No configured backend answered its health check
    #[error("No provider available (checked: {})", providers.join(", "))]
    NoProviderAvailable { providers: Vec<String> },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RagError {
    /// Wrap an embedding backend failure
    pub fn embedding(provider: impl Into<String>, source: impl Into<BoxError>) -> Self {
        RagError::Embedding {
            provider: provider.into(),
            source: source.into(),
        }
    }

    /// Wrap a vector store failure for the given operation
    pub fn vector_store(
        provider: impl Into<String>,
        operation: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        RagError::VectorStore {
            provider: provider.into(),
            operation,
            source: source.into(),
        }
    }

    /// Wrap a language model failure for the given operation
    pub fn llm(
        provider: impl Into<String>,
        operation: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        RagError::Llm {
            provider: provider.into(),
            operation,
            source: source.into(),
        }
    }

    /// Name of the provider that produced this error, if any
    pub fn provider(&self) -> Option<&str> {
        match self {
            RagError::Embedding { provider, .. }
            | RagError::VectorStore { provider, .. }
            | RagError::Llm { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

impl From<toml::de::Error> for RagError {
    fn from(err: toml::de::Error) -> Self {
        RagError::ConfigError(format!("Failed to parse config: {}", err))
    }
}
