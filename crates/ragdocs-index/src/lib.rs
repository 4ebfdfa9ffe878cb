//! Ingestion, reconciliation and file watching for ragdocs.
//!
//! Documents flow through: extraction → splitting → fingerprinting → dedup →
//! embedding → storage.
//!
//! # Components
//!
//! - [`IngestionPipeline`]: ingests one file, deletes a file's chunks
//! - [`FolderScanner`]: startup pass that ingests files the store does not know
//! - [`FileWatcher`]: debounced notifications turned into [`FileEvent`](ragdocs_core::FileEvent)s
//! - [`WatchService`]: applies events per file with a settle delay
//! - [`IndexUpdate`]: events emitted while watching
//!
//! # Example
//!
//! ```rust,ignore
//! use ragdocs_index::{FolderScanner, IngestionPipeline, WatchConfig, WatchService};
//!
//! let pipeline = Arc::new(IngestionPipeline::new(root, store, extractors, embedder, config)?);
//!
//! // Catch up with files added while we were down, then follow changes
//! FolderScanner::new(pipeline.clone()).reconcile().await?;
//! let service = WatchService::new(pipeline, WatchConfig::default());
//! let mut updates = service.subscribe();
//! let handle = service.start()?;
//!
//! while let Ok(update) = updates.recv().await {
//!     match update {
//!         IndexUpdate::FileIndexed { path, new_chunks } => { /* ... */ }
//!         IndexUpdate::FileError { path, error } => { /* ... */ }
//!         _ => {}
//!     }
//! }
//! handle.stop().await?;
//! ```

pub mod pipeline;
pub mod scanner;
pub mod service;
pub mod watcher;

pub use pipeline::{DEFAULT_MAX_FILE_SIZE, IngestReport, IngestionPipeline, PipelineConfig};
pub use scanner::{FolderScanner, ScanReport, discover_files};
pub use service::{
    DEFAULT_DEBOUNCE, DEFAULT_IDLE_TIMEOUT, DEFAULT_SETTLE_DELAY, IndexUpdate, WatchConfig,
    WatchHandle, WatchService,
};
pub use watcher::FileWatcher;

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by the unit tests.

    use crate::pipeline::{IngestionPipeline, PipelineConfig};
    use async_trait::async_trait;
    use ragdocs_core::{
        ChunkConfig, ChunkRecord, ChunkStore, EmbedError, Embedder, EmbeddingConfig,
        EmbeddingOutput, SearchHit, StoreError, StoreStats, VectorQuery,
    };
    use ragdocs_embed::EmbedderPool;
    use ragdocs_extract::ExtractorRegistry;
    use ragdocs_store::MemoryStore;
    use std::collections::{BTreeSet, HashSet};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder that counts the texts it embeds.
    pub struct MockEmbedder {
        pub texts: AtomicUsize,
    }

    impl MockEmbedder {
        pub const DIM: usize = 8;

        pub fn new() -> Self {
            Self {
                texts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        fn model_name(&self) -> &str {
            "mock-embedder"
        }

        fn dimension(&self) -> usize {
            Self::DIM
        }

        async fn embed_text(
            &self,
            texts: &[&str],
            _config: &EmbeddingConfig,
        ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|text| {
                    let seed: usize = text.bytes().map(usize::from).sum();
                    EmbeddingOutput {
                        embedding: (0..Self::DIM)
                            .map(|i| ((seed + i) % 7) as f32 + 1.0)
                            .collect(),
                        token_count: text.split_whitespace().count(),
                    }
                })
                .collect())
        }
    }

    /// Memory store that can be told to fail listing or inserts.
    pub struct FailingStore {
        inner: MemoryStore,
        fail_listing: bool,
        fail_inserts: bool,
    }

    impl FailingStore {
        pub fn failing_listing() -> Self {
            Self {
                inner: MemoryStore::new(MockEmbedder::DIM),
                fail_listing: true,
                fail_inserts: false,
            }
        }

        pub fn failing_inserts() -> Self {
            Self {
                inner: MemoryStore::new(MockEmbedder::DIM),
                fail_listing: false,
                fail_inserts: true,
            }
        }
    }

    #[async_trait]
    impl ChunkStore for FailingStore {
        async fn init(&self) -> Result<(), StoreError> {
            self.inner.init().await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        async fn find_existing(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
            self.inner.find_existing(ids).await
        }

        async fn insert_many(&self, records: &[ChunkRecord]) -> Result<u64, StoreError> {
            if self.fail_inserts {
                return Err(StoreError::Insert("store unavailable".to_string()));
            }
            self.inner.insert_many(records).await
        }

        async fn delete_by_source(&self, source_file: &str) -> Result<u64, StoreError> {
            self.inner.delete_by_source(source_file).await
        }

        async fn distinct_sources(&self) -> Result<BTreeSet<String>, StoreError> {
            if self.fail_listing {
                return Err(StoreError::Query("store unavailable".to_string()));
            }
            self.inner.distinct_sources().await
        }

        async fn vector_search(&self, query: VectorQuery) -> Result<Vec<SearchHit>, StoreError> {
            self.inner.vector_search(query).await
        }

        async fn stats(&self) -> Result<StoreStats, StoreError> {
            self.inner.stats().await
        }
    }

    /// Pipeline over `root` with the default extractors and a mock embedder.
    pub fn pipeline_with(
        root: &Path,
        store: Arc<dyn ChunkStore>,
        chunk_config: ChunkConfig,
    ) -> (IngestionPipeline, Arc<MockEmbedder>) {
        let embedder = Arc::new(MockEmbedder::new());
        let pipeline = IngestionPipeline::new(
            root.to_path_buf(),
            store,
            Arc::new(ExtractorRegistry::with_defaults()),
            Arc::new(EmbedderPool::new(embedder.clone(), 2)),
            PipelineConfig {
                chunk_config,
                ..PipelineConfig::default()
            },
        )
        .unwrap();
        (pipeline, embedder)
    }
}
