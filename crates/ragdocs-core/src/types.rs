//! Core types for ragdocs.
//!
//! ## Storage
//! - [`ChunkRecord`]: One stored chunk, keyed by its content fingerprint
//! - [`StoreStats`]: Aggregate counts reported by a chunk store
//!
//! ## Chunking and embedding
//! - [`ChunkConfig`]: Size and overlap for the splitter
//! - [`EmbeddingConfig`]: Configuration for embedding generation
//! - [`EmbeddingOutput`]: Result of embedding a text
//!
//! ## Search
//! - [`VectorQuery`]: Parameters for a nearest-neighbour lookup
//! - [`SearchHit`]: A matching record with similarity score
//!
//! ## File events
//! - [`FileEvent`]: Typed file system notifications consumed by the indexer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::StoreError;

// ============================================================================
// Chunk Records
// ============================================================================

/// A stored chunk.
///
/// `id` is the fingerprint of the raw chunk text and the primary key of the
/// store. Records are never mutated in place; they are inserted once and
/// removed in bulk when their source file changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Hex-encoded content fingerprint
    pub id: String,
    /// Compressed and base64-encoded chunk text
    pub payload: String,
    /// Embedding vector
    pub embedding: Vec<f32>,
    /// Normalized path of the originating file
    pub source_file: String,
}

impl ChunkRecord {
    /// Check the record shape before it reaches storage.
    pub fn validate(&self, dimension: usize) -> Result<(), StoreError> {
        if self.id.is_empty() || !self.id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::Schema(format!(
                "chunk id must be a non-empty hex string, got {:?}",
                self.id
            )));
        }
        if self.payload.is_empty() {
            return Err(StoreError::Schema(format!(
                "chunk {} has an empty payload",
                self.id
            )));
        }
        if self.source_file.is_empty() {
            return Err(StoreError::Schema(format!(
                "chunk {} has no source file",
                self.id
            )));
        }
        if self.embedding.len() != dimension {
            return Err(StoreError::Schema(format!(
                "chunk {} has embedding dimension {}, store expects {}",
                self.id,
                self.embedding.len(),
                dimension
            )));
        }
        Ok(())
    }
}

/// Chunk store statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total number of chunk records
    pub total_chunks: u64,
    /// Number of distinct source files
    pub total_files: u64,
    /// Last time the store was written
    pub last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Chunking
// ============================================================================

/// Configuration for chunking. Sizes are counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Upper bound for a chunk
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// Configuration for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Normalize embeddings to unit length
    pub normalize: bool,
    /// Batch size for processing
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            batch_size: 32,
        }
    }
}

/// Output from embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// The embedding vector
    pub embedding: Vec<f32>,
    /// Number of tokens in input
    pub token_count: usize,
}

// ============================================================================
// Search
// ============================================================================

/// A nearest-neighbour query.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    /// Query embedding
    pub embedding: Vec<f32>,
    /// Maximum hits to return
    pub limit: usize,
    /// Candidate pool considered before truncating to `limit`
    pub candidates: usize,
    /// Restrict hits to a single source file
    pub source_file: Option<String>,
}

/// A search hit, ranked by descending score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Chunk fingerprint
    pub id: String,
    /// Normalized source path
    pub source_file: String,
    /// Encoded payload, decoded by the caller
    pub payload: String,
    /// Cosine similarity
    pub score: f32,
}

// ============================================================================
// File Events
// ============================================================================

/// File system event for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileEvent {
    /// Paths touched by this event.
    pub fn paths(&self) -> Vec<&PathBuf> {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => vec![p],
            Self::Renamed { from, to } => vec![from, to],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dim: usize) -> ChunkRecord {
        ChunkRecord {
            id: "ab12".to_string(),
            payload: "eJwrSS0uAQAEXQHB".to_string(),
            embedding: vec![0.0; dim],
            source_file: "notes.txt".to_string(),
        }
    }

    #[test]
    fn test_chunk_config_default() {
        let config = ChunkConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.overlap, 50);
    }

    #[test]
    fn test_embedding_config_default() {
        let config = EmbeddingConfig::default();
        assert!(config.normalize);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn test_record_validates() {
        assert!(record(4).validate(4).is_ok());
    }

    #[test]
    fn test_record_rejects_wrong_dimension() {
        let err = record(3).validate(4).unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
        assert!(err.to_string().contains("dimension 3"));
    }

    #[test]
    fn test_record_rejects_non_hex_id() {
        let mut rec = record(4);
        rec.id = "not-hex".to_string();
        assert!(rec.validate(4).is_err());
        rec.id = String::new();
        assert!(rec.validate(4).is_err());
    }

    #[test]
    fn test_record_rejects_missing_fields() {
        let mut rec = record(4);
        rec.payload.clear();
        assert!(rec.validate(4).is_err());

        let mut rec = record(4);
        rec.source_file.clear();
        assert!(rec.validate(4).is_err());
    }

    #[test]
    fn test_record_serialization() {
        let rec = record(2);
        let json = serde_json::to_string(&rec).unwrap();
        let back: ChunkRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_file_event_paths() {
        let event = FileEvent::Renamed {
            from: PathBuf::from("a.txt"),
            to: PathBuf::from("b.txt"),
        };
        assert_eq!(event.paths().len(), 2);

        let event = FileEvent::Deleted(PathBuf::from("a.txt"));
        assert_eq!(event.paths(), vec![&PathBuf::from("a.txt")]);
    }
}
