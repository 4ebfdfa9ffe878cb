//! Deterministic feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with BLAKE3 into one of
//! `dimension` buckets with a hash-derived sign. Texts sharing words end up
//! with positive cosine similarity, so the full pipeline works offline and in
//! tests without a model download.

use async_trait::async_trait;
use ragdocs_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};

/// Offline embedder based on token feature hashing.
///
/// ```rust
/// use ragdocs_core::{Embedder, EmbeddingConfig};
/// use ragdocs_embed::HashingEmbedder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let embedder = HashingEmbedder::new(64);
/// let outputs = embedder
///     .embed_text(&["alpha beta", "gamma"], &EmbeddingConfig::default())
///     .await?;
/// assert_eq!(outputs.len(), 2);
/// assert_eq!(outputs[0].embedding.len(), 64);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create a hashing embedder producing `dimension`-sized vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str, normalize: bool) -> EmbeddingOutput {
        let mut embedding = vec![0.0f32; self.dimension];
        let mut token_count = 0;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) % self.dimension as u64;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket as usize] += sign;
            token_count += 1;
        }

        if normalize {
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                embedding.iter_mut().for_each(|x| *x /= norm);
            }
        }
        EmbeddingOutput {
            embedding,
            token_count,
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| self.embed_one(text, config.normalize))
            .collect())
    }
}
