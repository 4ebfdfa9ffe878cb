//! Core traits for ragdocs components.
//!
//! - [`ContentExtractor`]: Turn a document into plain text
//! - [`Embedder`]: Generate vector embeddings
//! - [`ChunkStore`]: Persist chunk records and search them
//!
//! Components receive these as `Arc<dyn Trait>` so tests can substitute
//! in-memory doubles.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::error::{EmbedError, ExtractError, StoreError};
use crate::types::{
    ChunkRecord, EmbeddingConfig, EmbeddingOutput, SearchHit, StoreStats, VectorQuery,
};

// ============================================================================
// Content Extraction
// ============================================================================

/// Trait for extracting text from files.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Lowercase extensions (without dot) this extractor handles.
    fn extensions(&self) -> &[&str];

    /// Check if this extractor can handle the given file.
    fn can_extract(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Extract plain text from a file.
    async fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension. Constant for the lifetime of the embedder.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one output per input, in order.
    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError>;

    /// Embed a query.
    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let results = self.embed_text(&[query], config).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))
    }
}

// ============================================================================
// Chunk Storage
// ============================================================================

/// Persistent collection of chunk records keyed by fingerprint.
///
/// Whether a file is "known" is derived from the records themselves: a file
/// is known while at least one record carries its `source_file`.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Initialize the store.
    async fn init(&self) -> Result<(), StoreError>;

    /// Embedding dimension every record must have.
    fn dimension(&self) -> usize;

    /// Return the subset of `ids` already present anywhere in the store.
    async fn find_existing(&self, ids: &[String]) -> Result<HashSet<String>, StoreError>;

    /// Insert records whose id is absent; existing ids are skipped silently.
    ///
    /// Returns the number of records actually written.
    async fn insert_many(&self, records: &[ChunkRecord]) -> Result<u64, StoreError>;

    /// Delete every record attributed to `source_file`.
    async fn delete_by_source(&self, source_file: &str) -> Result<u64, StoreError>;

    /// Distinct `source_file` values currently stored.
    async fn distinct_sources(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Nearest neighbours by cosine similarity, best first.
    async fn vector_search(&self, query: VectorQuery) -> Result<Vec<SearchHit>, StoreError>;

    /// Get store statistics.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
