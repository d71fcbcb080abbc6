//! Configuration management for ragline
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.ragline/config.toml unless a path is given explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chunking::{ChunkUnit, TextSplitter};
use crate::errors::{RagError, Result};
use crate::query::context::ContextFormat;

/// Default Ollama endpoint used by both the embedder and the language model
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Complete configuration, supplied once at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Chunking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub unit: ChunkUnit,
}

/// Embedding backend selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbeddingConfig {
    /// In-process sentence-transformer run with candle
    Local {
        #[serde(default = "default_local_model")]
        model: String,
        #[serde(default = "default_revision")]
        revision: String,
        #[serde(default = "default_local_dimensions")]
        dimensions: usize,
    },
    /// Ollama inference server
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_ollama_embedding_model")]
        model: String,
        #[serde(default = "default_ollama_dimensions")]
        dimensions: usize,
    },
}

/// Vector store backend selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum VectorStoreConfig {
    /// Qdrant similarity service
    Qdrant {
        #[serde(default = "default_qdrant_url")]
        url: String,
        #[serde(default = "default_project_id")]
        project_id: String,
        dimensions: usize,
    },
    /// PostgreSQL with the pgvector extension
    Pgvector {
        database_url: String,
        #[serde(default = "default_schema")]
        schema: String,
        #[serde(default = "default_table")]
        table: String,
        dimensions: usize,
    },
    /// Process-local store, lost on exit
    Memory { dimensions: usize },
}

/// Language model backends, tried in order until one is healthy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backends: Vec<LlmBackendConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One language model backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum LlmBackendConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        #[serde(default = "default_llm_model")]
        model: String,
    },
}

/// Retrieval and context assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_context_tokens: usize,
    pub format: ContextFormat,
}

/// Logging output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Transport settings shared by HTTP clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
}

fn default_local_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_local_dimensions() -> usize {
    384
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_ollama_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_ollama_dimensions() -> usize {
    768
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_project_id() -> String {
    "default".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_table() -> String {
    "chunk_embeddings".to_string()
}

fn default_llm_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

fn default_llm_backends() -> Vec<LlmBackendConfig> {
    vec![LlmBackendConfig::Ollama {
        base_url: default_ollama_url(),
        model: default_llm_model(),
    }]
}

fn default_context_format() -> ContextFormat {
    ContextFormat::Numbered
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 40,
            unit: ChunkUnit::Words,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::Local {
            model: default_local_model(),
            revision: default_revision(),
            dimensions: default_local_dimensions(),
        }
    }
}

impl EmbeddingConfig {
    /// Declared vector length
    pub fn dimensions(&self) -> usize {
        match self {
            EmbeddingConfig::Local { dimensions, .. }
            | EmbeddingConfig::Ollama { dimensions, .. } => *dimensions,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        VectorStoreConfig::Qdrant {
            url: default_qdrant_url(),
            project_id: default_project_id(),
            dimensions: default_local_dimensions(),
        }
    }
}

impl VectorStoreConfig {
    /// Configured vector length
    pub fn dimensions(&self) -> usize {
        match self {
            VectorStoreConfig::Qdrant { dimensions, .. }
            | VectorStoreConfig::Pgvector { dimensions, .. }
            | VectorStoreConfig::Memory { dimensions } => *dimensions,
        }
    }

    /// Whether records outlive the process. The memory store is emptied
    /// when each CLI invocation exits.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, VectorStoreConfig::Memory { .. })
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backends: default_llm_backends(),
            temperature: Some(0.2),
            max_tokens: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_tokens: 2000,
            format: default_context_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard configuration location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ragline").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        TextSplitter::new(
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
            self.chunking.unit,
        )?;

        let embedding_dims = self.embedding.dimensions();
        let store_dims = self.vector_store.dimensions();
        if embedding_dims == 0 || store_dims == 0 {
            return Err(RagError::ConfigError(
                "dimensions must be greater than 0".to_string(),
            ));
        }

        if embedding_dims != store_dims {
            return Err(RagError::ConfigError(format!(
                "embedding dimensions ({}) do not match vector store dimensions ({})",
                embedding_dims, store_dims
            )));
        }

        match &self.vector_store {
            VectorStoreConfig::Qdrant { url, project_id, .. } => {
                if url.trim().is_empty() || project_id.trim().is_empty() {
                    return Err(RagError::ConfigError(
                        "qdrant url and project_id are required".to_string(),
                    ));
                }
            }
            VectorStoreConfig::Pgvector {
                database_url,
                table,
                ..
            } => {
                if database_url.trim().is_empty() || table.trim().is_empty() {
                    return Err(RagError::ConfigError(
                        "pgvector database_url and table are required".to_string(),
                    ));
                }
            }
            VectorStoreConfig::Memory { .. } => {}
        }

        if self.llm.backends.is_empty() {
            return Err(RagError::ConfigError(
                "at least one llm backend must be configured".to_string(),
            ));
        }

        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err(RagError::ConfigError(
                    "temperature must be between 0.0 and 1.0".to_string(),
                ));
            }
        }

        if self.retrieval.top_k == 0 {
            return Err(RagError::ConfigError(
                "top_k must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(RagError::ConfigError(format!(
                    "Invalid log level: {}",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RagError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| RagError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Splitter built from the chunking section
    pub fn text_splitter(&self) -> Result<TextSplitter> {
        TextSplitter::new(
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
            self.chunking.unit,
        )
    }
}
