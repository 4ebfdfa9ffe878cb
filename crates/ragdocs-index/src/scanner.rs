//! Startup reconciliation between the watched folder and the store.

use crate::pipeline::IngestionPipeline;
use ragdocs_core::{Error, Result, is_accepted, is_hidden, normalize_source};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Accepted files found in the folder
    pub discovered: usize,
    /// Files the store already had chunks for
    pub already_known: usize,
    /// Files ingested during this pass
    pub ingested: usize,
    /// Files whose ingestion failed
    pub failed: usize,
}

/// Ingests every accepted file the store does not know yet.
pub struct FolderScanner {
    pipeline: Arc<IngestionPipeline>,
}

impl FolderScanner {
    /// Create a scanner over the pipeline's root.
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        Self { pipeline }
    }

    /// Bring the store in line with the folder.
    ///
    /// Known files are never re-ingested, so a second run with no changes on
    /// disk does nothing. If the store cannot list its files, every file is
    /// treated as unknown rather than blocking startup.
    pub async fn reconcile(&self) -> Result<ScanReport> {
        let root = self.pipeline.root();
        info!("Reconciling {:?}", root);

        let known: BTreeSet<String> = match self.pipeline.store().distinct_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                warn!("Could not list known files, rescanning everything: {e}");
                BTreeSet::new()
            }
        };

        let files = discover_files(root).await?;
        let mut report = ScanReport {
            discovered: files.len(),
            ..ScanReport::default()
        };

        for file in files {
            if known.contains(&file) {
                debug!("Already indexed: {}", file);
                report.already_known += 1;
                continue;
            }
            match self.pipeline.ingest(Path::new(&file)).await {
                Ok(_) => report.ingested += 1,
                Err(e) => {
                    error!("Failed to ingest {}: {}", file, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Reconciled {:?}: {} discovered, {} known, {} ingested, {} failed",
            root, report.discovered, report.already_known, report.ingested, report.failed
        );
        Ok(report)
    }
}

/// Normalized keys of every accepted, non-hidden file under `root`, sorted.
pub async fn discover_files(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(Error::InvalidInput(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut found = Vec::new();
        visit_dir(&root, &root, &mut found);
        found.sort();
        found
    })
    .await
    .map_err(|e| Error::Other(format!("scan task failed: {e}")))
}

fn visit_dir(root: &Path, dir: &Path, found: &mut Vec<String>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Cannot read directory {:?}: {}", dir, e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path: PathBuf = entry.path();
        if is_hidden(&path) {
            continue;
        }
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            visit_dir(root, &path, found);
        } else if path.is_file() && is_accepted(&path) {
            found.push(normalize_source(root, &path));
        }
    }
}
