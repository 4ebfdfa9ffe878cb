//! Long-running watch service applying file events to the store.
//!
//! Events are routed to one worker task per file. A worker applies its
//! file's events strictly in arrival order:
//!
//! | Event    | Action                                          |
//! |----------|-------------------------------------------------|
//! | created  | delete any chunks, settle, then ingest          |
//! | modified | delete the file's chunks, settle, then ingest   |
//! | deleted  | delete the file's chunks                        |
//! | renamed  | handled as deleted(from) plus created(to)       |
//!
//! A create may land on a file that is already indexed (atomic saves rename
//! a temporary file over the original), so it purges like a modify.
//! Different files proceed concurrently. Workers with nothing to do for
//! [`WatchConfig::idle_timeout`] are retired and respawned on the next event.
//! The settle delay only lowers the chance of reading a half-written file; it
//! is not a guarantee.

use crate::pipeline::IngestionPipeline;
use crate::watcher::FileWatcher;
use ragdocs_core::{Error, FileEvent, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default pause between a create/modify notification and reading the file.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Default debounce window for raw notifications.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Default time a file's worker may sit idle before it is retired.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Index update events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    FileIndexed { path: String, new_chunks: u64 },
    FileRemoved { path: String, chunks: u64 },
    FileError { path: String, error: String },
}

/// Configuration for the watch service.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Debounce window handed to the file watcher
    pub debounce: Duration,
    /// Wait after create/modify before ingesting
    pub settle_delay: Duration,
    /// Capacity of the event queue between watcher and dispatcher
    pub queue_capacity: usize,
    /// Idle time after which a file's worker is retired
    pub idle_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            settle_delay: DEFAULT_SETTLE_DELAY,
            queue_capacity: 1024,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Keeps the store in sync with the watched folder.
pub struct WatchService {
    pipeline: Arc<IngestionPipeline>,
    config: WatchConfig,
    update_tx: broadcast::Sender<IndexUpdate>,
}

impl WatchService {
    /// Create a new watch service.
    pub fn new(pipeline: Arc<IngestionPipeline>, config: WatchConfig) -> Self {
        let (update_tx, _) = broadcast::channel(256);
        Self {
            pipeline,
            config,
            update_tx,
        }
    }

    /// Subscribe to index updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.update_tx.subscribe()
    }

    /// Watch the pipeline's root and apply events until stopped.
    pub fn start(&self) -> Result<WatchHandle> {
        let (event_tx, event_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let mut watcher = FileWatcher::new(
            self.pipeline.root().to_path_buf(),
            event_tx,
            self.config.debounce,
        )
        .map_err(|e| Error::Other(format!("watcher error: {e}")))?;
        watcher
            .watch()
            .map_err(|e| Error::Other(format!("watch error: {e}")))?;
        info!("Watching {:?}", self.pipeline.root());

        let mut handle = self.run(event_rx);
        handle.watcher = Some(watcher);
        Ok(handle)
    }

    /// Apply events from `events` until stopped or the sender side closes.
    ///
    /// Useful on its own to drive the service with synthetic events.
    pub fn run(&self, events: mpsc::Receiver<FileEvent>) -> WatchHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let active = Arc::new(AtomicUsize::new(0));
        let worker = Worker {
            pipeline: Arc::clone(&self.pipeline),
            settle_delay: self.config.settle_delay,
            update_tx: self.update_tx.clone(),
        };
        let dispatcher = tokio::spawn(dispatch(
            worker,
            events,
            shutdown_rx,
            self.config.idle_timeout,
            Arc::clone(&active),
        ));

        WatchHandle {
            watcher: None,
            shutdown: shutdown_tx,
            dispatcher,
            active,
        }
    }
}

/// Running watch service. Call [`WatchHandle::stop`] on shutdown.
pub struct WatchHandle {
    watcher: Option<FileWatcher>,
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
    active: Arc<AtomicUsize>,
}

impl WatchHandle {
    /// Files that currently have a worker.
    pub fn active_files(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop observing, cut pending settle waits short and wait for workers.
    ///
    /// Ingests whose wait was cut short still run to completion.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch() {
                warn!("Failed to release watch: {e}");
            }
        }
        let _ = self.shutdown.send(true);
        self.dispatcher
            .await
            .map_err(|e| Error::Other(format!("watch dispatcher failed: {e}")))?;
        info!("Watch service stopped");
        Ok(())
    }
}

/// What a file worker does with one event.
#[derive(Debug)]
enum FileAction {
    /// Purge the file's chunks, settle, then ingest the current contents
    Refresh(PathBuf),
    /// Purge the file's chunks
    Remove(PathBuf),
}

impl FileAction {
    fn from_event(event: FileEvent) -> Vec<Self> {
        match event {
            FileEvent::Created(path) | FileEvent::Modified(path) => vec![Self::Refresh(path)],
            FileEvent::Deleted(path) => vec![Self::Remove(path)],
            FileEvent::Renamed { from, to } => vec![Self::Remove(from), Self::Refresh(to)],
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Refresh(path) | Self::Remove(path) => path,
        }
    }
}

/// Dispatcher side of one file's worker.
struct FileQueue {
    tx: mpsc::UnboundedSender<FileAction>,
    /// Actions sent but not yet finished by the worker
    pending: Arc<AtomicUsize>,
    last_event: Instant,
}

impl FileQueue {
    fn retirable(&self, idle_timeout: Duration) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && self.last_event.elapsed() >= idle_timeout
    }
}

#[derive(Clone)]
struct Worker {
    pipeline: Arc<IngestionPipeline>,
    settle_delay: Duration,
    update_tx: broadcast::Sender<IndexUpdate>,
}

async fn dispatch(
    worker: Worker,
    mut events: mpsc::Receiver<FileEvent>,
    mut shutdown: watch::Receiver<bool>,
    idle_timeout: Duration,
    active: Arc<AtomicUsize>,
) {
    let mut queues: HashMap<String, FileQueue> = HashMap::new();
    let mut tasks = JoinSet::new();
    let mut sweep = tokio::time::interval(idle_timeout.max(MIN_SWEEP_INTERVAL));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => break,
            Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = result {
                    error!("File worker failed: {e}");
                }
                continue;
            }
            _ = sweep.tick() => {
                // Idle workers with nothing in flight exit once their sender is dropped
                queues.retain(|key, queue| {
                    let keep = !queue.retirable(idle_timeout);
                    if !keep {
                        debug!("Retiring idle worker for {}", key);
                    }
                    keep
                });
                active.store(queues.len(), Ordering::SeqCst);
                continue;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        debug!("Received file event: {:?}", event);

        for action in FileAction::from_event(event) {
            let key = worker.pipeline.source_key(action.path());
            let queue = queues.entry(key).or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                let pending = Arc::new(AtomicUsize::new(0));
                tasks.spawn(file_worker(
                    worker.clone(),
                    rx,
                    Arc::clone(&pending),
                    shutdown.clone(),
                ));
                FileQueue {
                    tx,
                    pending,
                    last_event: Instant::now(),
                }
            });
            queue.pending.fetch_add(1, Ordering::SeqCst);
            queue.last_event = Instant::now();
            if let Err(e) = queue.tx.send(action) {
                queue.pending.fetch_sub(1, Ordering::SeqCst);
                warn!("Worker for {:?} is gone, dropping event", e.0.path());
            }
        }
        active.store(queues.len(), Ordering::SeqCst);
    }

    // Closing the queues lets each worker drain and exit
    drop(queues);
    active.store(0, Ordering::SeqCst);
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!("File worker failed: {e}");
        }
    }
}

async fn file_worker(
    worker: Worker,
    mut actions: mpsc::UnboundedReceiver<FileAction>,
    pending: Arc<AtomicUsize>,
    mut shutdown: watch::Receiver<bool>,
) {
    while let Some(action) = actions.recv().await {
        match action {
            FileAction::Refresh(path) => {
                // Atomic saves arrive as a create over an indexed file
                if worker.delete(&path, false).await {
                    settle(worker.settle_delay, &mut shutdown).await;
                    worker.ingest(&path).await;
                }
            }
            FileAction::Remove(path) => {
                worker.delete(&path, true).await;
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sleep for `delay`, returning early once shutdown is signalled.
async fn settle(delay: Duration, shutdown: &mut watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => {}
        _ = shutdown.changed() => debug!("Settle wait cut short by shutdown"),
    }
}

impl Worker {
    async fn ingest(&self, path: &Path) {
        let key = self.pipeline.source_key(path);
        let update = match self.pipeline.ingest(path).await {
            Ok(report) => IndexUpdate::FileIndexed {
                path: key,
                new_chunks: report.new_chunks,
            },
            Err(e) => {
                error!("Failed to index {}: {}", key, e);
                IndexUpdate::FileError {
                    path: key,
                    error: e.to_string(),
                }
            }
        };
        let _ = self.update_tx.send(update);
    }

    /// Returns whether the file's chunks are gone. A removal of zero chunks
    /// is only announced when `announce_empty` is set.
    async fn delete(&self, path: &Path, announce_empty: bool) -> bool {
        let key = self.pipeline.source_key(path);
        match self.pipeline.delete_chunks(path).await {
            Ok(chunks) => {
                if chunks > 0 || announce_empty {
                    let _ = self
                        .update_tx
                        .send(IndexUpdate::FileRemoved { path: key, chunks });
                }
                true
            }
            Err(e) => {
                error!("Failed to delete chunks for {}: {}", key, e);
                let _ = self.update_tx.send(IndexUpdate::FileError {
                    path: key,
                    error: e.to_string(),
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockEmbedder, pipeline_with};
    use ragdocs_core::{ChunkConfig, ChunkStore, fingerprint};
    use ragdocs_store::MemoryStore;
    use std::fs;
    use tempfile::tempdir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn service(root: &Path, store: Arc<MemoryStore>, settle_delay: Duration) -> WatchService {
        service_with(
            root,
            store,
            WatchConfig {
                settle_delay,
                ..WatchConfig::default()
            },
        )
    }

    fn service_with(root: &Path, store: Arc<MemoryStore>, config: WatchConfig) -> WatchService {
        let (pipeline, _) = pipeline_with(root, store, ChunkConfig::default());
        WatchService::new(Arc::new(pipeline), config)
    }

    async fn next_update(rx: &mut broadcast::Receiver<IndexUpdate>) -> IndexUpdate {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_created_file_is_ingested() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "fresh content").unwrap();
        let store = Arc::new(MemoryStore::new(MockEmbedder::DIM));
        let service = service(dir.path(), store.clone(), Duration::from_millis(10));
        let mut updates = service.subscribe();

        let (tx, rx) = mpsc::channel(8);
        let handle = service.run(rx);
        tx.send(FileEvent::Created(path)).await.unwrap();

        assert_eq!(
            next_update(&mut updates).await,
            IndexUpdate::FileIndexed {
                path: "notes.txt".to_string(),
                new_chunks: 1
            }
        );
        assert!(store.distinct_sources().await.unwrap().contains("notes.txt"));
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_modified_file_replaces_old_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, "first revision").unwrap();
        let store = Arc::new(MemoryStore::new(MockEmbedder::DIM));
        let service = service(dir.path(), store.clone(), Duration::from_millis(10));
        let mut updates = service.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let handle = service.run(rx);

        tx.send(FileEvent::Created(path.clone())).await.unwrap();
        next_update(&mut updates).await;

        fs::write(&path, "second revision").unwrap();
        tx.send(FileEvent::Modified(path)).await.unwrap();
        assert!(matches!(
            next_update(&mut updates).await,
            IndexUpdate::FileRemoved { chunks: 1, .. }
        ));
        assert!(matches!(
            next_update(&mut updates).await,
            IndexUpdate::FileIndexed { new_chunks: 1, .. }
        ));

        let ids = [fingerprint("first revision"), fingerprint("second revision")];
        let existing = store.find_existing(&ids).await.unwrap();
        assert!(!existing.contains(&ids[0]));
        assert!(existing.contains(&ids[1]));
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_over_indexed_file_replaces_old_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("draft.txt");
        fs::write(&path, "first draft").unwrap();
        let store = Arc::new(MemoryStore::new(MockEmbedder::DIM));
        let service = service(dir.path(), store.clone(), Duration::from_millis(10));
        let mut updates = service.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let handle = service.run(rx);

        tx.send(FileEvent::Created(path.clone())).await.unwrap();
        next_update(&mut updates).await;

        // Editors save by renaming a temporary file over the original
        let tmp = dir.path().join(".draft.txt.swp");
        fs::write(&tmp, "second draft").unwrap();
        fs::rename(&tmp, &path).unwrap();
        tx.send(FileEvent::Created(path)).await.unwrap();

        assert_eq!(
            next_update(&mut updates).await,
            IndexUpdate::FileRemoved {
                path: "draft.txt".to_string(),
                chunks: 1
            }
        );
        assert_eq!(
            next_update(&mut updates).await,
            IndexUpdate::FileIndexed {
                path: "draft.txt".to_string(),
                new_chunks: 1
            }
        );

        let ids = [fingerprint("first draft"), fingerprint("second draft")];
        let existing = store.find_existing(&ids).await.unwrap();
        assert!(!existing.contains(&ids[0]));
        assert!(existing.contains(&ids[1]));
        assert_eq!(store.stats().await.unwrap().total_chunks, 1);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_for_one_file_apply_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short-lived.txt");
        fs::write(&path, "temporary").unwrap();
        let store = Arc::new(MemoryStore::new(MockEmbedder::DIM));
        let service = service(dir.path(), store.clone(), Duration::from_millis(50));
        let mut updates = service.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let handle = service.run(rx);

        tx.send(FileEvent::Created(path.clone())).await.unwrap();
        tx.send(FileEvent::Deleted(path)).await.unwrap();

        assert!(matches!(
            next_update(&mut updates).await,
            IndexUpdate::FileIndexed { .. }
        ));
        assert!(matches!(
            next_update(&mut updates).await,
            IndexUpdate::FileRemoved { chunks: 1, .. }
        ));
        assert!(store.distinct_sources().await.unwrap().is_empty());
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_moves_attribution() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old.txt");
        let new = dir.path().join("new.txt");
        fs::write(&old, "moving text").unwrap();
        let store = Arc::new(MemoryStore::new(MockEmbedder::DIM));
        let service = service(dir.path(), store.clone(), Duration::from_millis(10));
        let mut updates = service.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let handle = service.run(rx);

        tx.send(FileEvent::Created(old.clone())).await.unwrap();
        next_update(&mut updates).await;

        fs::rename(&old, &new).unwrap();
        tx.send(FileEvent::Renamed { from: old, to: new }).await.unwrap();
        next_update(&mut updates).await;
        next_update(&mut updates).await;

        let sources = store.distinct_sources().await.unwrap();
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec!["new.txt"]);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_cuts_settle_short_and_finishes_ingest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("late.txt");
        fs::write(&path, "written just before shutdown").unwrap();
        let store = Arc::new(MemoryStore::new(MockEmbedder::DIM));
        let service = service(dir.path(), store.clone(), Duration::from_secs(3600));
        let (tx, rx) = mpsc::channel(8);
        let handle = service.run(rx);

        tx.send(FileEvent::Created(path)).await.unwrap();
        // Give the dispatcher a moment to route the event
        tokio::time::sleep(Duration::from_millis(50)).await;

        timeout(WAIT, handle.stop()).await.unwrap().unwrap();
        assert!(store.distinct_sources().await.unwrap().contains("late.txt"));
    }

    #[tokio::test]
    async fn test_idle_workers_are_retired() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(MockEmbedder::DIM));
        let service = service_with(
            dir.path(),
            store.clone(),
            WatchConfig {
                settle_delay: Duration::from_millis(10),
                idle_timeout: Duration::from_millis(50),
                ..WatchConfig::default()
            },
        );
        let mut updates = service.subscribe();
        let (tx, rx) = mpsc::channel(32);
        let handle = service.run(rx);

        for i in 0..10 {
            let path = dir.path().join(format!("file-{i}.txt"));
            fs::write(&path, format!("content of file {i}")).unwrap();
            tx.send(FileEvent::Created(path)).await.unwrap();
        }
        for _ in 0..10 {
            assert!(matches!(
                next_update(&mut updates).await,
                IndexUpdate::FileIndexed { new_chunks: 1, .. }
            ));
        }

        timeout(WAIT, async {
            while handle.active_files() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        // A retired file gets a fresh worker on its next event
        let path = dir.path().join("file-0.txt");
        fs::remove_file(&path).unwrap();
        tx.send(FileEvent::Deleted(path)).await.unwrap();
        assert_eq!(
            next_update(&mut updates).await,
            IndexUpdate::FileRemoved {
                path: "file-0.txt".to_string(),
                chunks: 1
            }
        );
        assert_eq!(store.stats().await.unwrap().total_chunks, 9);
        handle.stop().await.unwrap();
    }

    #[test]
    fn test_watch_config_default() {
        let config = WatchConfig::default();
        assert_eq!(config.settle_delay, Duration::from_secs(5));
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }
}
