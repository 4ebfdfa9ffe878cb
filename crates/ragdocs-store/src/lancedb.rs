//! `LanceDB` implementation of [`ChunkStore`].

use crate::schema::{CHUNKS_TABLE, chunks_schema};
use arrow_array::{Array, ArrayRef, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table, connect};
use ragdocs_core::{ChunkRecord, ChunkStore, SearchHit, StoreError, StoreStats, VectorQuery};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Ids per `IN (...)` predicate when probing for existing rows.
const ID_PROBE_BATCH: usize = 512;

/// LanceDB-backed chunk store.
pub struct LanceStore {
    /// Path to the `LanceDB` database
    db_path: PathBuf,
    /// Embedding dimension
    embedding_dim: usize,
    /// Database connection (lazy initialized)
    connection: RwLock<Option<Connection>>,
    /// Chunks table handle
    chunks_table: RwLock<Option<Table>>,
    last_updated: RwLock<Option<DateTime<Utc>>>,
}

impl LanceStore {
    /// Create a new `LanceStore`.
    #[must_use]
    pub fn new(db_path: PathBuf, embedding_dim: usize) -> Self {
        Self {
            db_path,
            embedding_dim,
            connection: RwLock::new(None),
            chunks_table: RwLock::new(None),
            last_updated: RwLock::new(None),
        }
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get or create connection.
    async fn get_connection(&self) -> Result<Connection, StoreError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn = self.connection.write().await;
        match conn.as_ref() {
            Some(c) => Ok(c.clone()),
            None => {
                let db_path_str = self.db_path.to_string_lossy().to_string();
                let new_conn = connect(&db_path_str)
                    .execute()
                    .await
                    .map_err(|e| StoreError::Init(format!("Failed to connect to LanceDB: {e}")))?;
                *conn = Some(new_conn.clone());
                Ok(new_conn)
            }
        }
    }

    /// Get or open chunks table.
    async fn get_chunks_table(&self) -> Result<Table, StoreError> {
        {
            let table = self.chunks_table.read().await;
            if let Some(ref t) = *table {
                return Ok(t.clone());
            }
        }

        let conn = self.get_connection().await?;
        let mut table_lock = self.chunks_table.write().await;
        match table_lock.as_ref() {
            Some(t) => Ok(t.clone()),
            None => {
                let t = conn
                    .open_table(CHUNKS_TABLE)
                    .execute()
                    .await
                    .map_err(|e| StoreError::Init(format!("Failed to open chunks table: {e}")))?;
                *table_lock = Some(t.clone());
                Ok(t)
            }
        }
    }

    /// Convert records to an Arrow `RecordBatch`.
    fn records_to_batch(&self, records: &[&ChunkRecord]) -> Result<RecordBatch, StoreError> {
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let payloads: Vec<&str> = records.iter().map(|r| r.payload.as_str()).collect();
        let sources: Vec<&str> = records.iter().map(|r| r.source_file.as_str()).collect();
        let vector_array = build_vector_array(records, self.embedding_dim);

        RecordBatch::try_new(
            Arc::new(chunks_schema(self.embedding_dim)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(payloads)),
                Arc::new(StringArray::from(sources)),
                vector_array,
            ],
        )
        .map_err(|e| StoreError::Insert(format!("Failed to create RecordBatch: {e}")))
    }

    async fn touch(&self) {
        *self.last_updated.write().await = Some(Utc::now());
    }
}

#[async_trait]
impl ChunkStore for LanceStore {
    async fn init(&self) -> Result<(), StoreError> {
        info!("Initializing LanceDB at {:?}", self.db_path);

        if let Some(parent) = self.db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Init(format!("Failed to create db directory: {e}")))?;
        }

        let conn = self.get_connection().await?;
        let tables = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to list tables: {e}")))?;

        if !tables.iter().any(|t| t == CHUNKS_TABLE) {
            info!("Creating chunks table");
            conn.create_empty_table(CHUNKS_TABLE, Arc::new(chunks_schema(self.embedding_dim)))
                .execute()
                .await
                .map_err(|e| StoreError::Init(format!("Failed to create chunks table: {e}")))?;
        }

        info!("LanceDB initialized successfully");
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.embedding_dim
    }

    async fn find_existing(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut found = HashSet::new();
        if ids.is_empty() {
            return Ok(found);
        }
        let table = self.get_chunks_table().await?;

        for batch_ids in ids.chunks(ID_PROBE_BATCH) {
            let list = batch_ids
                .iter()
                .map(|id| quote(id))
                .collect::<Vec<_>>()
                .join(", ");
            let mut results = table
                .query()
                .only_if(format!("id IN ({list})"))
                .select(Select::columns(&["id"]))
                .execute()
                .await
                .map_err(|e| StoreError::Query(format!("Failed to probe ids: {e}")))?;

            while let Some(batch) = results
                .try_next()
                .await
                .map_err(|e| StoreError::Query(format!("Failed to fetch ids: {e}")))?
            {
                found.extend(string_column(&batch, "id")?.iter().flatten().map(str::to_string));
            }
        }
        Ok(found)
    }

    async fn insert_many(&self, records: &[ChunkRecord]) -> Result<u64, StoreError> {
        for record in records {
            record.validate(self.embedding_dim)?;
        }

        // Keep the first record per id so a single batch is insert-if-absent too
        let mut seen = HashSet::new();
        let unique: Vec<&ChunkRecord> = records.iter().filter(|r| seen.insert(&r.id)).collect();
        if unique.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = unique.iter().map(|r| r.id.clone()).collect();
        let existing = self.find_existing(&ids).await?;
        let fresh: Vec<&ChunkRecord> = unique
            .into_iter()
            .filter(|r| !existing.contains(&r.id))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        debug!("Inserting {} chunks", fresh.len());
        let table = self.get_chunks_table().await?;
        let batch = self.records_to_batch(&fresh)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        // merge_insert keeps concurrent writers from duplicating an id
        let mut merge = table.merge_insert(&["id"]);
        merge.when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .map_err(|e| StoreError::Insert(format!("Failed to insert chunks: {e}")))?;

        self.touch().await;
        Ok(fresh.len() as u64)
    }

    async fn delete_by_source(&self, source_file: &str) -> Result<u64, StoreError> {
        debug!("Deleting chunks for file: {}", source_file);
        let table = self.get_chunks_table().await?;
        let filter = format!("source_file = {}", quote(source_file));

        let count = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to count chunks: {e}")))?;
        if count == 0 {
            return Ok(0);
        }

        table
            .delete(&filter)
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to delete chunks: {e}")))?;

        self.touch().await;
        Ok(count as u64)
    }

    async fn distinct_sources(&self) -> Result<BTreeSet<String>, StoreError> {
        let table = self.get_chunks_table().await?;
        let mut results = table
            .query()
            .select(Select::columns(&["source_file"]))
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query sources: {e}")))?;

        let mut sources = BTreeSet::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch sources: {e}")))?
        {
            sources.extend(
                string_column(&batch, "source_file")?
                    .iter()
                    .flatten()
                    .map(str::to_string),
            );
        }
        Ok(sources)
    }

    async fn vector_search(&self, query: VectorQuery) -> Result<Vec<SearchHit>, StoreError> {
        if query.embedding.len() != self.embedding_dim {
            return Err(StoreError::Query(format!(
                "query dimension {} does not match store dimension {}",
                query.embedding.len(),
                self.embedding_dim
            )));
        }
        debug!(
            "Searching with limit {} ({} candidates)",
            query.limit, query.candidates
        );

        let table = self.get_chunks_table().await?;
        let mut search = table
            .vector_search(query.embedding.clone())
            .map_err(|e| StoreError::Query(format!("Failed to create search query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(query.candidates.max(query.limit));
        if let Some(source) = &query.source_file {
            search = search.only_if(format!("source_file = {}", quote(source)));
        }

        let mut results = search
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch results: {e}")))?
        {
            hits.extend(batch_to_hits(&batch)?);
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(query.limit);
        debug!("Found {} results", hits.len());
        Ok(hits)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let table = self.get_chunks_table().await?;
        let total_chunks = table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count chunks: {e}")))?;
        let total_files = self.distinct_sources().await?.len();

        Ok(StoreStats {
            total_chunks: total_chunks as u64,
            total_files: total_files as u64,
            last_updated: *self.last_updated.read().await,
        })
    }
}

/// SQL string literal with embedded quotes doubled.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Schema(format!("missing {name} column")))
}

fn build_vector_array(records: &[&ChunkRecord], dim: usize) -> ArrayRef {
    use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};

    let mut builder = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);
    for record in records {
        builder.values().append_slice(&record.embedding);
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>, StoreError> {
    let ids = string_column(batch, "id")?;
    let payloads = string_column(batch, "payload")?;
    let sources = string_column(batch, "source_file")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<arrow_array::Float32Array>());

    Ok((0..batch.num_rows())
        .map(|i| SearchHit {
            id: ids.value(i).to_string(),
            source_file: sources.value(i).to_string(),
            payload: payloads.value(i).to_string(),
            score: distances.map_or(0.0, |d| 1.0 - d.value(i)),
        })
        .collect())
}
