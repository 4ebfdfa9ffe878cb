//! # ragdocs CLI
//!
//! Watches a document folder and keeps a deduplicated, vector-searchable
//! chunk store in step with it. An HTTP surface exposes the two tools an
//! agent needs: retrieval with an optional file filter, and file listing.
//!
//! ## Commands
//!
//! - `ragdocs serve <FOLDER>` - Reconcile, watch for changes and serve the tool API
//! - `ragdocs scan <FOLDER>` - Ingest files the index does not know yet
//! - `ragdocs query <FOLDER> <PROMPT>` - Retrieve context from the index
//! - `ragdocs files <FOLDER>` - List the documents the tools can see
//! - `ragdocs status <FOLDER>` - Show index statistics
//!
//! ## Examples
//!
//! ```bash
//! # Index once, then ask
//! ragdocs scan ~/Documents
//! ragdocs query ~/Documents "quarterly revenue" --file reports/q3.pdf
//!
//! # Keep the index live and serve http://127.0.0.1:8000
//! ragdocs serve ~/Documents
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragdocs_core::{ChunkStore, Embedder, normalize_filter};
#[cfg(feature = "candle")]
use ragdocs_embed::CandleEmbedder;
use ragdocs_embed::{EmbedderPool, HashingEmbedder};
use ragdocs_extract::ExtractorRegistry;
use ragdocs_index::{
    FolderScanner, IndexUpdate, IngestionPipeline, WatchService, discover_files,
};
use ragdocs_query::{DocumentTools, Retriever};
#[cfg(feature = "lancedb")]
use ragdocs_store::LanceStore;
use ragdocs_store::MemoryStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod server;

use config::{Config, EmbeddingBackend, StoreBackend};
#[cfg(feature = "candle")]
use config::data_dir;

#[derive(Parser)]
#[command(name = "ragdocs")]
#[command(about = "Retrieval backend for a folder of documents")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/ragdocs/config.toml)
    #[arg(short, long, global = true, env = "RAGDOCS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile, watch the folder and serve the tool API
    Serve {
        /// Document folder
        folder: PathBuf,

        /// Address to bind (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Ingest files the index does not know yet
    Scan {
        /// Document folder
        folder: PathBuf,
    },

    /// Retrieve context for a prompt
    Query {
        /// Document folder
        folder: PathBuf,

        /// Prompt to embed
        prompt: String,

        /// Only return chunks from this file
        #[arg(long)]
        file: Option<String>,
    },

    /// List documents in the folder
    Files {
        /// Document folder
        folder: PathBuf,
    },

    /// Show index status
    Status {
        /// Document folder
        folder: PathBuf,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for query results.
#[derive(Serialize)]
struct QueryOutput {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    results: Vec<ResultItem>,
}

#[derive(Serialize)]
struct ResultItem {
    file: String,
    score: f32,
    content: String,
}

/// Output structure for scan.
#[derive(Serialize)]
struct ScanOutput {
    path: String,
    discovered: usize,
    already_known: usize,
    ingested: usize,
    failed: usize,
}

/// Output structure for status.
#[derive(Serialize)]
struct StatusOutput {
    path: String,
    total_files: u64,
    total_chunks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

/// Wired-up ingestion and retrieval for one folder.
struct Components {
    pipeline: Arc<IngestionPipeline>,
    tools: Arc<DocumentTools>,
}

fn create_store(config: &Config, root: &Path) -> Result<Arc<dyn ChunkStore>> {
    let index_dir = config.index_dir(root)?;
    let dimension = config.embedding.dimension;
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::persistent(
            index_dir.join("chunks.json"),
            dimension,
        ))),
        #[cfg(feature = "lancedb")]
        StoreBackend::Lancedb => Ok(Arc::new(LanceStore::new(
            index_dir.join("index.lance"),
            dimension,
        ))),
        #[cfg(not(feature = "lancedb"))]
        StoreBackend::Lancedb => {
            anyhow::bail!("store.backend = \"lancedb\" requires building with the `lancedb` feature")
        }
    }
}

async fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding.backend {
        #[cfg(feature = "candle")]
        EmbeddingBackend::Candle => {
            let cache_dir = data_dir()
                .context("Failed to get data directory")?
                .join("models");
            let embedder = CandleEmbedder::with_model(
                cache_dir,
                &config.embedding.model,
                config.embedding.dimension,
            );

            // Downloads the model on first run
            info!("Initializing embedder (this may download the model on first run)...");
            embedder
                .init()
                .await
                .context("Failed to initialize embedder")?;
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "candle"))]
        EmbeddingBackend::Candle => anyhow::bail!(
            "embedding.backend = \"candle\" requires the `candle` feature; use \"hashing\" instead"
        ),
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.embedding.dimension,
        ))),
    }
}

/// Create the standard component stack with an initialized store.
async fn create_components(config: &Config, root: &Path) -> Result<Components> {
    let store = create_store(config, root)?;
    store.init().await.context("Failed to initialize store")?;

    let embedder = create_embedder(config).await?;
    let pool = Arc::new(EmbedderPool::new(
        embedder,
        config.embedding.max_concurrent,
    ));

    let pipeline = Arc::new(
        IngestionPipeline::new(
            root.to_path_buf(),
            store.clone(),
            Arc::new(ExtractorRegistry::with_defaults()),
            pool.clone(),
            config.pipeline_config(),
        )
        .context("Invalid chunking configuration")?,
    );

    let retriever = Retriever::new(store, pool, config.retriever_config());
    let tools = Arc::new(DocumentTools::new(root.to_path_buf(), retriever));

    Ok(Components { pipeline, tools })
}

fn resolve_folder(folder: &Path) -> Result<PathBuf> {
    if !folder.is_dir() {
        anyhow::bail!("Directory does not exist: {}", folder.display());
    }
    folder
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", folder.display()))
}

fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.clone()).context("Failed to load config")?;
    init_logging(cli.verbose, &config.logging.level)?;

    match cli.command {
        Commands::Serve { folder, bind } => {
            let root = resolve_folder(&folder)?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let components = create_components(&config, &root).await?;

            // Catch up before any live event can race the startup pass
            let report = FolderScanner::new(components.pipeline.clone())
                .reconcile()
                .await
                .context("Startup scan failed")?;
            info!(
                "Startup scan: {} files, {} ingested, {} failed",
                report.discovered, report.ingested, report.failed
            );

            let service = WatchService::new(components.pipeline.clone(), config.watch_config());
            let mut updates = service.subscribe();
            let reporter = tokio::spawn(async move {
                loop {
                    match updates.recv().await {
                        Ok(IndexUpdate::FileIndexed { path, new_chunks }) => {
                            info!("Indexed: {} ({} new chunks)", path, new_chunks);
                        }
                        Ok(IndexUpdate::FileRemoved { path, chunks }) => {
                            info!("Removed: {} ({} chunks)", path, chunks);
                        }
                        Ok(IndexUpdate::FileError { path, error }) => {
                            warn!("Error: {}: {}", path, error);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Update reporter lagged by {} events", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let handle = service.start().context("Failed to start watcher")?;
            info!("Watching {:?}. Press Ctrl+C to stop.", root);

            let served = server::serve(&bind, components.tools, shutdown_signal()).await;
            handle.stop().await.context("Failed to stop watcher")?;
            reporter.abort();
            served?;
        }

        Commands::Scan { folder } => {
            let root = resolve_folder(&folder)?;
            info!("Scanning {:?}", root);
            let components = create_components(&config, &root).await?;

            let report = FolderScanner::new(components.pipeline)
                .reconcile()
                .await
                .context("Scan failed")?;

            match cli.format {
                OutputFormat::Json => {
                    let output = ScanOutput {
                        path: root.to_string_lossy().to_string(),
                        discovered: report.discovered,
                        already_known: report.already_known,
                        ingested: report.ingested,
                        failed: report.failed,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Scanned {}", root.display());
                    println!("  Discovered:    {}", report.discovered);
                    println!("  Already known: {}", report.already_known);
                    println!("  Ingested:      {}", report.ingested);
                    println!("  Failed:        {}", report.failed);
                }
            }
        }

        Commands::Query {
            folder,
            prompt,
            file,
        } => {
            let root = resolve_folder(&folder)?;

            let index_dir = config.index_dir(&root)?;
            if !index_dir.exists() {
                anyhow::bail!(
                    "Index not found for {}. Run 'ragdocs scan {}' first.",
                    root.display(),
                    root.display()
                );
            }

            let components = create_components(&config, &root).await?;
            let filter = file
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .map(|name| normalize_filter(&root, name));

            let results = components
                .tools
                .retriever()
                .retrieve_chunks(&prompt, filter.as_deref())
                .await
                .context("Query execution failed")?;

            match cli.format {
                OutputFormat::Json => {
                    let output = QueryOutput {
                        prompt: prompt.clone(),
                        filename: filter,
                        results: results
                            .into_iter()
                            .map(|r| ResultItem {
                                file: r.source_file,
                                score: r.score,
                                content: r.text,
                            })
                            .collect(),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Query: {prompt}\n");
                    if results.is_empty() {
                        println!("No results found.");
                    } else {
                        for (i, result) in results.iter().enumerate() {
                            println!(
                                "{}. {} (score: {:.3})",
                                i + 1,
                                result.source_file,
                                result.score
                            );
                            println!("   {}", truncate(&result.text, 100));
                            println!();
                        }
                    }
                }
            }
        }

        Commands::Files { folder } => {
            let root = resolve_folder(&folder)?;
            let files = discover_files(&root)
                .await
                .context("Failed to list files")?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&files)?);
                }
                OutputFormat::Text => {
                    for file in files {
                        println!("{file}");
                    }
                }
            }
        }

        Commands::Status { folder } => {
            let root = resolve_folder(&folder)?;

            if !config.index_dir(&root)?.exists() {
                match cli.format {
                    OutputFormat::Json => {
                        println!(r#"{{"error": "Index not found"}}"#);
                    }
                    OutputFormat::Text => {
                        println!("Index not found for {}", root.display());
                        println!("Run 'ragdocs scan {}' to create it.", root.display());
                    }
                }
                return Ok(());
            }

            let store = create_store(&config, &root)?;
            store.init().await.context("Failed to initialize store")?;
            let stats = store.stats().await?;

            match cli.format {
                OutputFormat::Json => {
                    let output = StatusOutput {
                        path: root.to_string_lossy().to_string(),
                        total_files: stats.total_files,
                        total_chunks: stats.total_chunks,
                        last_updated: stats.last_updated.map(|t| t.to_rfc3339()),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Index Status for {}", root.display());
                    println!("  Files:  {}", stats.total_files);
                    println!("  Chunks: {}", stats.total_chunks);
                    if let Some(last) = stats.last_updated {
                        println!("  Updated: {}", last.format("%Y-%m-%d %H:%M:%S"));
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                match cli.config.or_else(Config::config_path) {
                    Some(path) => println!("{}", path.display()),
                    None => println!("Could not determine config directory"),
                }
            }
        },
    }

    Ok(())
}

/// Truncate a string to max length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_len {
        s
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_and_long() {
        assert_eq!(truncate("a\nb", 10), "a b");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_cli_parses_query_with_file() {
        let cli = Cli::try_parse_from([
            "ragdocs", "query", "/docs", "what changed", "--file", "notes.txt",
        ])
        .unwrap();
        match cli.command {
            Commands::Query { prompt, file, .. } => {
                assert_eq!(prompt, "what changed");
                assert_eq!(file.as_deref(), Some("notes.txt"));
            }
            _ => panic!("expected query command"),
        }
    }
}
