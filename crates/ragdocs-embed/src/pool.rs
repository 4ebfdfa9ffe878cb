//! Embedder pool for concurrent embedding operations.

use ragdocs_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Shared embedder with bounded concurrent inference.
///
/// Ingestion and retrieval both go through the pool, so a burst of watcher
/// events cannot starve queries of the model.
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    /// Limits concurrent inference
    semaphore: Semaphore,
    max_concurrent: usize,
}

impl EmbedderPool {
    /// Create a new embedder pool.
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    /// Get the embedding dimension.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Get the model name.
    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Get the underlying embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Embed texts in `config.batch_size` slices, one permit per slice.
    ///
    /// Every returned vector is checked against [`Self::dimension`].
    pub async fn embed_batch(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let mut outputs = Vec::with_capacity(texts.len());
        for batch in texts.chunks(config.batch_size.max(1)) {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|e| EmbedError::Inference(format!("semaphore error: {e}")))?;
            debug!("Embedding batch of {}", batch.len());
            let batch_outputs = self.embedder.embed_text(batch, config).await?;
            if batch_outputs.len() != batch.len() {
                return Err(EmbedError::Inference(format!(
                    "embedder returned {} vectors for {} inputs",
                    batch_outputs.len(),
                    batch.len()
                )));
            }
            outputs.extend(batch_outputs);
        }
        self.check_dimensions(&outputs)?;
        Ok(outputs)
    }

    /// Embed a single query.
    pub async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EmbedError::Inference(format!("semaphore error: {e}")))?;

        let output = self.embedder.embed_query(query, config).await?;
        self.check_dimensions(std::slice::from_ref(&output))?;
        Ok(output)
    }

    fn check_dimensions(&self, outputs: &[EmbeddingOutput]) -> Result<(), EmbedError> {
        let expected = self.dimension();
        match outputs.iter().find(|o| o.embedding.len() != expected) {
            Some(bad) => Err(EmbedError::DimensionMismatch {
                expected,
                actual: bad.embedding.len(),
            }),
            None => Ok(()),
        }
    }

    /// Get pool statistics.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get max concurrent operations.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
