//! In-process embedding engine
//!
//! Runs a BERT-family sentence-transformer with candle. Weights are fetched
//! from the HuggingFace Hub and loaded once, on first use.
use anyhow::{Context, Result};
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;

use super::{check_dimensions, EmbeddingProvider};
use crate::errors::RagError;

const PROVIDER: &str = "local";

/// Documents embedded per forward pass; bounds peak memory only
pub const BATCH_SIZE: usize = 32;

/// Longest token sequence fed to the model
const MAX_SEQUENCE_LEN: usize = 512;

/// Embedding engine backed by a lazily loaded candle model
pub struct LocalEmbedder {
    model_id: String,
    revision: String,
    dimensions: usize,
    model: OnceCell<Arc<LoadedModel>>,
}

/// Model, tokenizer and device, shared read-only across calls
struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    hidden_size: usize,
}

impl LocalEmbedder {
    /// Create the engine without touching the network or disk
    pub fn new(model_id: String, revision: String, dimensions: usize) -> Self {
        Self {
            model_id,
            revision,
            dimensions,
            model: OnceCell::new(),
        }
    }

    /// Whether the model has been loaded yet
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Load the model on first call; concurrent first callers share one load
    async fn handle(&self) -> crate::errors::Result<Arc<LoadedModel>> {
        let loaded = self
            .model
            .get_or_try_init(|| async {
                let model_id = self.model_id.clone();
                let revision = self.revision.clone();
                tracing::info!(model = %model_id, "loading local embedding model");

                let loaded = tokio::task::spawn_blocking(move || {
                    LoadedModel::load(&model_id, &revision)
                })
                .await
                .map_err(|e| RagError::embedding(PROVIDER, e))?
                .map_err(|e| RagError::embedding(PROVIDER, e))?;

                if loaded.hidden_size != self.dimensions {
                    return Err(RagError::embedding(
                        PROVIDER,
                        format!(
                            "model {} produces {} dimensions, configured for {}",
                            self.model_id, loaded.hidden_size, self.dimensions
                        ),
                    ));
                }

                Ok::<_, RagError>(Arc::new(loaded))
            })
            .await?;

        Ok(Arc::clone(loaded))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> crate::errors::Result<Vec<Vec<f32>>> {
        let model = self.handle().await?;
        let embeddings = tokio::task::spawn_blocking(move || model.embed_batch(&texts))
            .await
            .map_err(|e| RagError::embedding(PROVIDER, e))?
            .map_err(|e| RagError::embedding(PROVIDER, e))?;

        for embedding in &embeddings {
            check_dimensions(PROVIDER, self.dimensions, embedding)?;
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> crate::errors::Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            tracing::debug!(batch = batch.len(), "embedding document batch");
            embeddings.extend(self.embed_batch(batch.to_vec()).await?);
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> crate::errors::Result<Vec<f32>> {
        self.embed_batch(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::embedding(PROVIDER, "model returned no embedding"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

impl LoadedModel {
    /// Download (or reuse cached) model files and build the model
    fn load(model_id: &str, revision: &str) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let config_path = repo
            .get("config.json")
            .context("Failed to download model config")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model weights")?;

        let config_contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&config_contents).context("Failed to parse model config")?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        // SAFETY: the weights file is not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .context("Failed to load model weights")?
        };

        let model = BertModel::load(vb, &config).context("Failed to create BERT model")?;

        Ok(Self {
            model,
            tokenizer,
            device,
            hidden_size: config.hidden_size,
        })
    }

    /// Embed one batch: tokenize, pad, forward, mean-pool, L2-normalise
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let mut token_ids_vec = Vec::with_capacity(encodings.len());
        let mut attention_mask_vec = Vec::with_capacity(encodings.len());

        for encoding in &encodings {
            let mut ids = encoding.get_ids().to_vec();
            let mut mask = encoding.get_attention_mask().to_vec();
            ids.truncate(MAX_SEQUENCE_LEN);
            mask.truncate(MAX_SEQUENCE_LEN);
            token_ids_vec.push(ids);
            attention_mask_vec.push(mask);
        }

        let max_len = token_ids_vec.iter().map(|ids| ids.len()).max().unwrap_or(0);
        let batch_size = texts.len();

        let mut padded_ids = vec![vec![0u32; max_len]; batch_size];
        let mut padded_mask = vec![vec![0u32; max_len]; batch_size];

        for (i, (ids, mask)) in token_ids_vec.iter().zip(attention_mask_vec.iter()).enumerate() {
            padded_ids[i][..ids.len()].copy_from_slice(ids);
            padded_mask[i][..mask.len()].copy_from_slice(mask);
        }

        let flat_ids: Vec<u32> = padded_ids.into_iter().flatten().collect();
        let flat_mask: Vec<u32> = padded_mask.into_iter().flatten().collect();

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = Self::mean_pool(&hidden, &attention_mask)?;
        let normalized = Self::l2_normalize(&pooled)?;

        Ok(normalized.to_vec2::<f32>()?)
    }

    /// Mean pooling with attention mask
    fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask_expanded = attention_mask
            .unsqueeze(2)?
            .expand(embeddings.shape())?
            .to_dtype(embeddings.dtype())?;

        let sum_embeddings = (embeddings * &mask_expanded)?.sum(1)?;
        let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

        Ok(sum_embeddings.broadcast_div(&sum_mask)?)
    }

    fn l2_normalize(embeddings: &Tensor) -> Result<Tensor> {
        let norm = embeddings
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::MAX)?;
        Ok(embeddings.broadcast_div(&norm)?)
    }
}
