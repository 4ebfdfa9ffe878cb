//! Similarity retrieval over stored chunks.

use ragdocs_core::{
    ChunkStore, EmbeddingConfig, Error, Result, VectorQuery, decode_payload,
};
use ragdocs_embed::EmbedderPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Retrieval tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Chunks returned per query
    pub top_k: usize,
    /// Nearest neighbours considered before truncating to `top_k`
    pub candidates: usize,
    /// Joins chunk texts in [`Retriever::retrieve`]
    pub delimiter: String,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidates: 10,
            delimiter: "\n".to_string(),
        }
    }
}

/// A decoded hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub source_file: String,
    pub score: f32,
    pub text: String,
}

/// Embeds a prompt and returns the closest stored chunks.
pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<EmbedderPool>,
    config: RetrieverConfig,
    embed_config: EmbeddingConfig,
}

impl Retriever {
    /// Create a retriever. `candidates` is raised to at least `top_k`.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<EmbedderPool>,
        mut config: RetrieverConfig,
    ) -> Self {
        config.candidates = config.candidates.max(config.top_k);
        Self {
            store,
            embedder,
            config,
            embed_config: EmbeddingConfig::default(),
        }
    }

    /// Get the configuration in effect.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Ranked chunks for `query`, optionally restricted to one source file.
    ///
    /// Records whose payload cannot be decoded are logged and skipped.
    pub async fn retrieve_chunks(
        &self,
        query: &str,
        source_file: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>> {
        debug!("Retrieving for {:?} (filter: {:?})", query, source_file);

        let embedding = self
            .embedder
            .embed_query(query, &self.embed_config)
            .await
            .map_err(Error::Embedding)?;

        let hits = self
            .store
            .vector_search(VectorQuery {
                embedding: embedding.embedding,
                limit: self.config.top_k,
                candidates: self.config.candidates,
                source_file: source_file.map(str::to_string),
            })
            .await
            .map_err(Error::Store)?;

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|hit| match decode_payload(&hit.payload) {
                Ok(text) => Some(RetrievedChunk {
                    source_file: hit.source_file,
                    score: hit.score,
                    text,
                }),
                Err(e) => {
                    warn!("Skipping undecodable chunk {}: {}", hit.id, e);
                    None
                }
            })
            .collect();

        debug!("Found {} results", chunks.len());
        Ok(chunks)
    }

    /// Texts of the ranked chunks joined with the configured delimiter.
    pub async fn retrieve(&self, query: &str, source_file: Option<&str>) -> Result<String> {
        let chunks = self.retrieve_chunks(query, source_file).await?;
        Ok(chunks
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(&self.config.delimiter))
    }
}
