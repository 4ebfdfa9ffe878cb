//! Ingestion pipeline: extract, split, fingerprint, dedup, embed, store.

use ragdocs_chunker::RecursiveSplitter;
use ragdocs_core::{
    ChunkConfig, ChunkRecord, ChunkStore, EmbeddingConfig, Result, encode_payload, fingerprint,
    normalize_source,
};
use ragdocs_embed::EmbedderPool;
use ragdocs_extract::ExtractorRegistry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default cap on the size of a file handed to the extractors (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chunk configuration
    pub chunk_config: ChunkConfig,
    /// Embedding configuration
    pub embed_config: EmbeddingConfig,
    /// Files larger than this are skipped
    pub max_file_size: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_config: ChunkConfig::default(),
            embed_config: EmbeddingConfig::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Normalized store key of the file
    pub source_file: String,
    /// Pieces produced by the splitter, before dedup
    pub total_chunks: usize,
    /// Records actually inserted
    pub new_chunks: u64,
    /// Pieces already stored (here or under another file) or repeated in this file
    pub skipped_chunks: u64,
}

/// Turns a document on disk into deduplicated chunk records.
///
/// Chunks are keyed by the fingerprint of their text, so a piece already in
/// the store under any file is never embedded or stored again.
pub struct IngestionPipeline {
    /// Watched root; store keys are relative to it
    root: PathBuf,
    store: Arc<dyn ChunkStore>,
    extractors: Arc<ExtractorRegistry>,
    splitter: RecursiveSplitter,
    embedder: Arc<EmbedderPool>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    /// Create a pipeline. Fails if the chunk configuration is invalid.
    pub fn new(
        root: PathBuf,
        store: Arc<dyn ChunkStore>,
        extractors: Arc<ExtractorRegistry>,
        embedder: Arc<EmbedderPool>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let splitter = RecursiveSplitter::new(config.chunk_config)?;
        Ok(Self {
            root,
            store,
            extractors,
            splitter,
            embedder,
            config,
        })
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Get the embedder pool.
    pub fn embedder(&self) -> &Arc<EmbedderPool> {
        &self.embedder
    }

    /// Store key for `path`.
    pub fn source_key(&self, path: &Path) -> String {
        normalize_source(&self.root, &self.resolve(path))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Ingest one file.
    ///
    /// Extraction failures are logged and treated as empty text. Store and
    /// embedding failures propagate; nothing is inserted in that case.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let full_path = self.resolve(path);
        let source_file = normalize_source(&self.root, &full_path);
        let mut report = IngestReport {
            source_file: source_file.clone(),
            ..IngestReport::default()
        };

        if let Ok(metadata) = tokio::fs::metadata(&full_path).await {
            if metadata.len() > self.config.max_file_size {
                warn!(
                    "Skipping {} ({} bytes exceeds limit of {})",
                    source_file,
                    metadata.len(),
                    self.config.max_file_size
                );
                return Ok(report);
            }
        }

        let text = match self.extractors.extract(&full_path).await {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to extract {}: {}", source_file, e);
                String::new()
            }
        };

        let pieces = self.splitter.split(&text);
        report.total_chunks = pieces.len();
        if pieces.is_empty() {
            debug!("No chunks for {}", source_file);
            return Ok(report);
        }

        // Collapse repeats inside this file before asking the store
        let mut seen = HashSet::new();
        let unique: Vec<(String, String)> = pieces
            .into_iter()
            .map(|piece| (fingerprint(&piece), piece))
            .filter(|(id, _)| seen.insert(id.clone()))
            .collect();

        let ids: Vec<String> = unique.iter().map(|(id, _)| id.clone()).collect();
        let existing = self.store.find_existing(&ids).await?;
        let fresh: Vec<(String, String)> = unique
            .into_iter()
            .filter(|(id, _)| !existing.contains(id))
            .collect();

        if fresh.is_empty() {
            report.skipped_chunks = report.total_chunks as u64;
            info!("No new chunks for {}", source_file);
            return Ok(report);
        }

        let texts: Vec<&str> = fresh.iter().map(|(_, text)| text.as_str()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts, &self.config.embed_config)
            .await?;

        let mut records = Vec::with_capacity(fresh.len());
        for ((id, text), output) in fresh.iter().zip(embeddings) {
            records.push(ChunkRecord {
                id: id.clone(),
                payload: encode_payload(text)?,
                embedding: output.embedding,
                source_file: source_file.clone(),
            });
        }

        let inserted = self.store.insert_many(&records).await?;
        report.new_chunks = inserted;
        report.skipped_chunks = report.total_chunks as u64 - inserted;
        info!(
            "Indexed {} ({} new, {} skipped)",
            source_file, report.new_chunks, report.skipped_chunks
        );
        Ok(report)
    }

    /// Remove every chunk attributed to `path`. Returns the number removed.
    pub async fn delete_chunks(&self, path: &Path) -> Result<u64> {
        let source_file = self.source_key(path);
        let removed = self.store.delete_by_source(&source_file).await?;
        info!("Removed {} chunks for {}", removed, source_file);
        Ok(removed)
    }
}
