//! Configuration handling for ragdocs.
//!
//! Settings are read from a TOML file; every field has a default so a
//! missing file or a partial one is fine.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use ragdocs_core::{ChunkConfig, EmbeddingConfig as EmbedRuntimeConfig};
use ragdocs_index::{PipelineConfig, WatchConfig};
use ragdocs_query::RetrieverConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Watching and ingestion
    #[serde(default)]
    pub index: IndexConfig,

    /// Text splitting
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding model
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval
    #[serde(default)]
    pub query: QueryConfig,

    /// HTTP tool surface
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory map persisted as a JSON snapshot
    #[default]
    Memory,
    /// `LanceDB` table (requires the `lancedb` feature)
    Lancedb,
}

/// Store-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Override for the index location (default: per-folder data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Index-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Debounce duration for file watcher (ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Wait before reading a created or modified file (ms)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Idle time before a file's watch worker is retired (ms)
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,

    /// Maximum file size to index (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_settle_ms() -> u64 {
    5_000
}

fn default_idle_ms() -> u64 {
    60_000
}

fn default_max_file_size() -> u64 {
    52_428_800 // 50MB
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            settle_ms: default_settle_ms(),
            idle_ms: default_idle_ms(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Chunking-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length (characters)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between neighbouring chunks (characters)
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    500
}

fn default_overlap() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Sentence-transformer model run with candle
    #[default]
    Candle,
    /// Feature hashing, no model download
    Hashing,
}

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Hugging Face model id (candle backend)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Max concurrent embedding jobs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_batch_size() -> usize {
    32
}

fn default_max_concurrent() -> usize {
    2
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Query-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Chunks returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Neighbours considered before truncating
    #[serde(default = "default_candidates")]
    pub candidates: usize,

    /// Separator between returned chunks
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_top_k() -> usize {
    5
}

fn default_candidates() -> usize {
    10
}

fn default_delimiter() -> String {
    "\n".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidates: default_candidates(),
            delimiter: default_delimiter(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `RAGDOCS_CONFIG` or the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, falling back to [`Config::config_path`].
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let Some(path) = path.or_else(Self::config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Config file location.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("RAGDOCS_CONFIG") {
            return Some(PathBuf::from(path));
        }
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Annotated sample configuration.
    pub fn sample_toml() -> &'static str {
        r#"# ragdocs configuration

[store]
# "memory" (JSON snapshot) or "lancedb"
backend = "memory"
# path = "/var/lib/ragdocs/index"

[index]
debounce_ms = 500
settle_ms = 5000
idle_ms = 60000
max_file_size = 52428800

[chunking]
chunk_size = 500
overlap = 50

[embedding]
# "candle" or "hashing"
backend = "candle"
model = "sentence-transformers/all-MiniLM-L6-v2"
dimension = 384
batch_size = 32
max_concurrent = 2

[query]
top_k = 5
candidates = 10
delimiter = "\n"

[server]
bind = "127.0.0.1:8000"

[logging]
level = "info"
"#
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.chunking.chunk_size,
            overlap: self.chunking.overlap,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunk_config: self.chunk_config(),
            embed_config: EmbedRuntimeConfig {
                batch_size: self.embedding.batch_size,
                ..EmbedRuntimeConfig::default()
            },
            max_file_size: self.index.max_file_size,
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            debounce: Duration::from_millis(self.index.debounce_ms),
            settle_delay: Duration::from_millis(self.index.settle_ms),
            idle_timeout: Duration::from_millis(self.index.idle_ms),
            ..WatchConfig::default()
        }
    }

    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            top_k: self.query.top_k,
            candidates: self.query.candidates,
            delimiter: self.query.delimiter.clone(),
        }
    }

    /// Directory holding the index for `root`.
    pub fn index_dir(&self, root: &Path) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => index_dir_for(root),
        }
    }
}

/// Get the data directory for ragdocs.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("RAGDOCS_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "ragdocs").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the config directory for ragdocs.
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ragdocs").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Per-folder index directory: `<data dir>/indices/<hash of root>`.
pub fn index_dir_for(root: &Path) -> Result<PathBuf> {
    let data = data_dir().context("Failed to get data directory")?;
    Ok(data.join("indices").join(root_hash(root)))
}

fn root_hash(root: &Path) -> String {
    let hash = blake3::hash(root.to_string_lossy().as_bytes());
    hash.to_hex()[..16].to_string()
}
