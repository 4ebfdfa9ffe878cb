//! Sentence-transformer embedder using Candle.
//!
//! Defaults to `sentence-transformers/all-MiniLM-L6-v2`:
//! - 384 dimensions
//! - 256 token window
//! - BERT architecture, mean pooled

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::tokio::ApiBuilder;
use hf_hub::{Repo, RepoType};
use ragdocs_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use std::path::PathBuf;
use tokenizers::Tokenizer;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default model on the Hugging Face hub.
pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Embedding dimension of the default model.
pub const DEFAULT_DIMENSION: usize = 384;

/// Longest token sequence fed to the model.
const MAX_TOKENS: usize = 256;

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
}

/// BERT sentence embedder running locally.
pub struct CandleEmbedder {
    model_id: String,
    dimension: usize,
    device: Device,
    cache_dir: PathBuf,
    loaded: RwLock<Option<LoadedModel>>,
}

fn inference<E: std::fmt::Display>(step: &'static str) -> impl Fn(E) -> EmbedError {
    move |e| EmbedError::Inference(format!("{step}: {e}"))
}

fn model_load<E: std::fmt::Display>(step: &'static str) -> impl Fn(E) -> EmbedError {
    move |e| EmbedError::ModelLoad(format!("{step}: {e}"))
}

impl CandleEmbedder {
    /// Create an embedder for the default model, caching weights in `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self::with_model(cache_dir, DEFAULT_MODEL_ID, DEFAULT_DIMENSION)
    }

    /// Create an embedder for another sentence-transformer checkpoint.
    pub fn with_model(cache_dir: PathBuf, model_id: &str, dimension: usize) -> Self {
        // Try to use CUDA if available, fallback to CPU
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        info!("CandleEmbedder using device: {:?}", device);

        Self {
            model_id: model_id.to_string(),
            dimension,
            device,
            cache_dir,
            loaded: RwLock::new(None),
        }
    }

    /// Download (first run only) and load the model.
    pub async fn init(&self) -> Result<(), EmbedError> {
        if self.loaded.read().await.is_some() {
            return Ok(());
        }
        let mut slot = self.loaded.write().await;
        if slot.is_some() {
            return Ok(());
        }

        info!("Loading embedding model {}", self.model_id);
        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .build()
            .map_err(model_load("hub client"))?;
        let repo = api.repo(Repo::new(self.model_id.clone(), RepoType::Model));

        debug!("Fetching tokenizer, config and weights");
        let tokenizer_path = repo.get("tokenizer.json").await.map_err(model_load("tokenizer"))?;
        let config_path = repo.get("config.json").await.map_err(model_load("config"))?;
        let weights_path = repo
            .get("model.safetensors")
            .await
            .map_err(model_load("weights"))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(model_load("tokenizer"))?;
        let config_str = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(model_load("read config"))?;
        let config: Config = serde_json::from_str(&config_str).map_err(model_load("parse config"))?;

        // SAFETY: the safetensors file is only read, never written, while mapped.
        #[allow(unsafe_code)]
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &self.device)
                .map_err(model_load("map weights"))?
        };
        let model = BertModel::load(vb, &config).map_err(model_load("build model"))?;

        *slot = Some(LoadedModel { model, tokenizer });
        info!("Embedding model ready");
        Ok(())
    }

    fn encode_batch(
        &self,
        loaded: &LoadedModel,
        texts: &[&str],
        normalize: bool,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let encodings = loaded
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(inference("tokenize"))?;

        let max_len = encodings
            .iter()
            .map(|e| e.len())
            .max()
            .unwrap_or(0)
            .min(MAX_TOKENS);

        let batch_size = texts.len();
        let mut input_ids = Vec::with_capacity(batch_size * max_len);
        let mut attention = Vec::with_capacity(batch_size * max_len);
        let mut token_counts = Vec::with_capacity(batch_size);
        for encoding in &encodings {
            let ids = encoding.get_ids();
            let len = ids.len().min(max_len);
            token_counts.push(len);
            input_ids.extend_from_slice(&ids[..len]);
            input_ids.extend(std::iter::repeat_n(0u32, max_len - len));
            attention.extend(std::iter::repeat_n(1u32, len));
            attention.extend(std::iter::repeat_n(0u32, max_len - len));
        }

        let shape = (batch_size, max_len);
        let input_ids =
            Tensor::from_vec(input_ids, shape, &self.device).map_err(inference("input ids"))?;
        let attention_mask =
            Tensor::from_vec(attention, shape, &self.device).map_err(inference("attention mask"))?;
        let token_type_ids = input_ids.zeros_like().map_err(inference("token types"))?;

        let hidden = loaded
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(inference("forward"))?;

        let pooled = mean_pool(&hidden, &attention_mask)?;
        let embeddings = if normalize {
            l2_normalize(&pooled)?
        } else {
            pooled
        };

        let rows = embeddings.to_vec2::<f32>().map_err(inference("to_vec2"))?;
        Ok(rows
            .into_iter()
            .zip(token_counts)
            .map(|(embedding, token_count)| EmbeddingOutput {
                embedding,
                token_count,
            })
            .collect())
    }
}

/// Average token embeddings, ignoring padding.
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor, EmbedError> {
    let mask = attention_mask
        .to_dtype(DType::F32)
        .and_then(|m| m.unsqueeze(2))
        .and_then(|m| m.broadcast_as(hidden.shape()))
        .map_err(inference("expand mask"))?;
    let summed = hidden
        .mul(&mask)
        .and_then(|t| t.sum(1))
        .map_err(inference("masked sum"))?;
    let counts = mask
        .sum(1)
        .and_then(|t| t.clamp(1e-9, f64::MAX))
        .map_err(inference("token count"))?;
    summed.div(&counts).map_err(inference("mean"))
}

fn l2_normalize(embeddings: &Tensor) -> Result<Tensor, EmbedError> {
    let norm = embeddings
        .sqr()
        .and_then(|t| t.sum_keepdim(1))
        .and_then(|t| t.sqrt())
        .and_then(|t| t.clamp(1e-12, f64::MAX))
        .map_err(inference("norm"))?;
    embeddings.broadcast_div(&norm).map_err(inference("normalize"))
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.init().await?;

        let guard = self.loaded.read().await;
        let loaded = guard
            .as_ref()
            .ok_or_else(|| EmbedError::Inference("model not loaded".to_string()))?;

        debug!("Embedding {} texts with batch_size {}", texts.len(), config.batch_size);
        let mut outputs = Vec::with_capacity(texts.len());
        for batch in texts.chunks(config.batch_size.max(1)) {
            outputs.extend(self.encode_batch(loaded, batch, config.normalize)?);
        }

        match outputs.first() {
            Some(first) if first.embedding.len() != self.dimension => {
                Err(EmbedError::DimensionMismatch {
                    expected: self.dimension,
                    actual: first.embedding.len(),
                })
            }
            _ => Ok(outputs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires model download
    async fn test_candle_embedder() {
        let cache_dir = std::env::temp_dir().join("ragdocs-candle-test");
        let embedder = CandleEmbedder::new(cache_dir);
        embedder.init().await.unwrap();

        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.model_name(), DEFAULT_MODEL_ID);

        let config = EmbeddingConfig::default();
        let results = embedder
            .embed_text(&["Hello world", "This is a test"], &config)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].embedding.len(), 384);

        let norm: f32 = results[0].embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
