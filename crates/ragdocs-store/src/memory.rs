//! In-memory chunk store with optional JSON snapshots.
//!
//! Without a snapshot path the store lives only as long as the process, which
//! is what tests want. With one, [`MemoryStore::persistent`] reloads the
//! snapshot on `init` and rewrites it after every successful mutation, giving
//! small deployments persistence without the `lancedb` feature.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragdocs_core::{ChunkRecord, ChunkStore, SearchHit, StoreError, StoreStats, VectorQuery};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
struct State {
    records: HashMap<String, ChunkRecord>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    dimension: usize,
    records: Vec<ChunkRecord>,
}

/// Chunk store held in memory, searched by brute-force cosine similarity.
///
/// ```rust
/// use ragdocs_store::MemoryStore;
/// use ragdocs_core::ChunkStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new(384);
/// store.init().await?;
/// assert_eq!(store.stats().await?.total_chunks, 0);
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    dimension: usize,
    snapshot: Option<PathBuf>,
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create a volatile store with the given embedding dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            snapshot: None,
            state: RwLock::new(State::default()),
        }
    }

    /// Create a store backed by a JSON snapshot file.
    #[must_use]
    pub fn persistent(path: PathBuf, dimension: usize) -> Self {
        Self {
            dimension,
            snapshot: Some(path),
            state: RwLock::new(State::default()),
        }
    }

    /// Snapshot location, if any.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }

    async fn load_snapshot(&self, path: &Path) -> Result<Vec<ChunkRecord>, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Init(format!("failed to read snapshot: {e}"))),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Init(format!("corrupt snapshot {}: {e}", path.display())))?;
        if snapshot.dimension != self.dimension {
            return Err(StoreError::Init(format!(
                "snapshot has dimension {}, store expects {}",
                snapshot.dimension, self.dimension
            )));
        }
        Ok(snapshot.records)
    }

    /// Rewrite the snapshot from `state`. No-op for volatile stores.
    async fn persist(&self, state: &State) -> std::io::Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let mut records: Vec<ChunkRecord> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let snapshot = Snapshot {
            dimension: self.dimension,
            records,
        };
        let json = serde_json::to_vec(&snapshot)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        if let Some(path) = &self.snapshot {
            let records = self.load_snapshot(path).await?;
            let mut state = self.state.write().await;
            for record in records {
                record.validate(self.dimension)?;
                state.records.insert(record.id.clone(), record);
            }
            info!(
                "Loaded {} chunks from snapshot {}",
                state.records.len(),
                path.display()
            );
        }
        debug!("MemoryStore initialized (dimension: {})", self.dimension);
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn find_existing(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter(|id| state.records.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, records: &[ChunkRecord]) -> Result<u64, StoreError> {
        for record in records {
            record.validate(self.dimension)?;
        }

        let mut state = self.state.write().await;
        let mut inserted = Vec::new();
        for record in records {
            if !state.records.contains_key(&record.id) {
                state.records.insert(record.id.clone(), record.clone());
                inserted.push(record.id.clone());
            }
        }
        if inserted.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist(&state).await {
            for id in &inserted {
                state.records.remove(id);
            }
            return Err(StoreError::Insert(format!("failed to write snapshot: {e}")));
        }
        state.last_updated = Some(Utc::now());
        debug!("Inserted {} of {} chunks", inserted.len(), records.len());
        Ok(inserted.len() as u64)
    }

    async fn delete_by_source(&self, source_file: &str) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let doomed: Vec<String> = state
            .records
            .values()
            .filter(|r| r.source_file == source_file)
            .map(|r| r.id.clone())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let removed: Vec<ChunkRecord> = doomed
            .iter()
            .filter_map(|id| state.records.remove(id))
            .collect();
        if let Err(e) = self.persist(&state).await {
            for record in removed {
                state.records.insert(record.id.clone(), record);
            }
            return Err(StoreError::Delete(format!("failed to write snapshot: {e}")));
        }
        state.last_updated = Some(Utc::now());
        debug!("Deleted {} chunks for {}", removed.len(), source_file);
        Ok(removed.len() as u64)
    }

    async fn distinct_sources(&self) -> Result<BTreeSet<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .map(|r| r.source_file.clone())
            .collect())
    }

    async fn vector_search(&self, query: VectorQuery) -> Result<Vec<SearchHit>, StoreError> {
        if query.embedding.len() != self.dimension {
            return Err(StoreError::Query(format!(
                "query dimension {} does not match store dimension {}",
                query.embedding.len(),
                self.dimension
            )));
        }

        let state = self.state.read().await;
        let mut scored: Vec<(f32, &ChunkRecord)> = state
            .records
            .values()
            .filter(|r| {
                query
                    .source_file
                    .as_deref()
                    .is_none_or(|source| r.source_file == source)
            })
            .map(|r| (Self::cosine_similarity(&query.embedding, &r.embedding), r))
            .collect();

        // Sort by score descending, ties by id for stable output
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored
            .into_iter()
            .take(query.candidates.max(query.limit))
            .take(query.limit)
            .map(|(score, r)| SearchHit {
                id: r.id.clone(),
                source_file: r.source_file.clone(),
                payload: r.payload.clone(),
                score,
            })
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.read().await;
        let files: HashSet<&str> = state
            .records
            .values()
            .map(|r| r.source_file.as_str())
            .collect();
        Ok(StoreStats {
            total_chunks: state.records.len() as u64,
            total_files: files.len() as u64,
            last_updated: state.last_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdocs_core::{encode_payload, fingerprint};
    use std::sync::Arc;
    use tempfile::tempdir;

    const DIM: usize = 4;

    fn record(text: &str, source: &str, embedding: [f32; DIM]) -> ChunkRecord {
        ChunkRecord {
            id: fingerprint(text),
            payload: encode_payload(text).unwrap(),
            embedding: embedding.to_vec(),
            source_file: source.to_string(),
        }
    }

    fn query(embedding: [f32; DIM], limit: usize, source: Option<&str>) -> VectorQuery {
        VectorQuery {
            embedding: embedding.to_vec(),
            limit,
            candidates: limit * 2,
            source_file: source.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_insert_is_insert_if_absent() {
        let store = MemoryStore::new(DIM);
        store.init().await.unwrap();

        let first = record("alpha", "a.txt", [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(store.insert_many(&[first.clone()]).await.unwrap(), 1);

        // Same id from another file is ignored, first attribution wins
        let dup = record("alpha", "b.txt", [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(store.insert_many(&[dup]).await.unwrap(), 0);

        let sources = store.distinct_sources().await.unwrap();
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec!["a.txt"]);
        assert_eq!(store.stats().await.unwrap().total_chunks, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_store_one_copy() {
        let store = Arc::new(MemoryStore::new(DIM));
        store.init().await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                let rec = record("shared", &format!("{i}.txt"), [0.0, 1.0, 0.0, 0.0]);
                store.insert_many(&[rec]).await.unwrap()
            });
        }
        let mut inserted = 0;
        while let Some(result) = tasks.join_next().await {
            inserted += result.unwrap();
        }

        assert_eq!(inserted, 1);
        assert_eq!(store.stats().await.unwrap().total_chunks, 1);
        assert_eq!(store.distinct_sources().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_existing() {
        let store = MemoryStore::new(DIM);
        let rec = record("alpha", "a.txt", [1.0, 0.0, 0.0, 0.0]);
        store.insert_many(&[rec.clone()]).await.unwrap();

        let missing = fingerprint("beta");
        let found = store
            .find_existing(&[rec.id.clone(), missing])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains(&rec.id));
    }

    #[tokio::test]
    async fn test_rejects_bad_shape_without_partial_insert() {
        let store = MemoryStore::new(DIM);
        let good = record("good", "a.txt", [1.0, 0.0, 0.0, 0.0]);
        let mut bad = record("bad", "a.txt", [1.0, 0.0, 0.0, 0.0]);
        bad.embedding.push(0.5);

        let err = store.insert_many(&[good, bad]).await.unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
        assert_eq!(store.stats().await.unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn test_delete_by_source_is_complete() {
        let store = MemoryStore::new(DIM);
        store
            .insert_many(&[
                record("a1", "a.txt", [1.0, 0.0, 0.0, 0.0]),
                record("a2", "a.txt", [0.0, 1.0, 0.0, 0.0]),
                record("b1", "b.txt", [0.0, 0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_source("a.txt").await.unwrap(), 2);
        assert_eq!(store.delete_by_source("a.txt").await.unwrap(), 0);

        let sources = store.distinct_sources().await.unwrap();
        assert!(!sources.contains("a.txt"));
        assert!(sources.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_vector_search_ranks_and_limits() {
        let store = MemoryStore::new(DIM);
        store
            .insert_many(&[
                record("x", "a.txt", [1.0, 0.0, 0.0, 0.0]),
                record("xy", "a.txt", [0.7, 0.7, 0.0, 0.0]),
                record("y", "b.txt", [0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .vector_search(query([1.0, 0.0, 0.0, 0.0], 2, None))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, fingerprint("x"));
        assert_eq!(hits[1].id, fingerprint("xy"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_vector_search_filters_by_source() {
        let store = MemoryStore::new(DIM);
        store
            .insert_many(&[
                record("x", "a.txt", [1.0, 0.0, 0.0, 0.0]),
                record("y", "b.txt", [0.9, 0.1, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .vector_search(query([1.0, 0.0, 0.0, 0.0], 5, Some("b.txt")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_file, "b.txt");
    }

    #[tokio::test]
    async fn test_vector_search_rejects_wrong_dimension() {
        let store = MemoryStore::new(DIM);
        let result = store
            .vector_search(VectorQuery {
                embedding: vec![1.0; DIM + 1],
                limit: 5,
                candidates: 10,
                source_file: None,
            })
            .await;
        assert!(matches!(result, Err(StoreError::Query(_))));
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index").join("chunks.json");

        {
            let store = MemoryStore::persistent(path.clone(), DIM);
            store.init().await.unwrap();
            store
                .insert_many(&[
                    record("a1", "a.txt", [1.0, 0.0, 0.0, 0.0]),
                    record("b1", "b.txt", [0.0, 1.0, 0.0, 0.0]),
                ])
                .await
                .unwrap();
            store.delete_by_source("b.txt").await.unwrap();
        }

        let reopened = MemoryStore::persistent(path, DIM);
        reopened.init().await.unwrap();
        let sources = reopened.distinct_sources().await.unwrap();
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_snapshot_dimension_mismatch_fails_init() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks.json");
        {
            let store = MemoryStore::persistent(path.clone(), DIM);
            store
                .insert_many(&[record("a1", "a.txt", [1.0, 0.0, 0.0, 0.0])])
                .await
                .unwrap();
        }

        let other = MemoryStore::persistent(path, DIM + 1);
        assert!(matches!(other.init().await, Err(StoreError::Init(_))));
    }

    #[tokio::test]
    async fn test_stats_counts_files() {
        let store = MemoryStore::new(DIM);
        store
            .insert_many(&[
                record("a1", "a.txt", [1.0, 0.0, 0.0, 0.0]),
                record("a2", "a.txt", [0.0, 1.0, 0.0, 0.0]),
                record("b1", "b.txt", [0.0, 0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.total_files, 2);
        assert!(stats.last_updated.is_some());
    }
}
