//! File system watcher for detecting document changes.

use notify_debouncer_full::notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{
    DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache, new_debouncer,
};
use ragdocs_core::{FileEvent, is_accepted, is_hidden};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, warn};

/// Debounced watcher that turns raw notifications into [`FileEvent`]s.
///
/// Only accepted, non-hidden files under the root produce events.
pub struct FileWatcher {
    root: PathBuf,
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Create a watcher that feeds `event_tx`. Call [`FileWatcher::watch`] to start.
    pub fn new(
        root: PathBuf,
        event_tx: tokio_mpsc::Sender<FileEvent>,
        debounce_duration: Duration,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();

        // Debouncer callbacks run on notify's thread; forward from our own
        let filter_root = root.clone();
        std::thread::spawn(move || {
            while let Ok(result) = rx.recv() {
                if !handle_debounced_events(&filter_root, result, &event_tx) {
                    break;
                }
            }
            debug!("Watcher event thread exiting");
        });

        let debouncer = new_debouncer(debounce_duration, None, move |result| {
            let _ = tx.send(result);
        })?;

        Ok(Self { root, debouncer })
    }

    /// Start watching the root recursively.
    pub fn watch(&mut self) -> Result<(), notify_debouncer_full::notify::Error> {
        debug!("Starting to watch: {:?}", self.root);
        self.debouncer.watch(&self.root, RecursiveMode::Recursive)
    }

    /// Release the watch on the root.
    pub fn unwatch(&mut self) -> Result<(), notify_debouncer_full::notify::Error> {
        debug!("Stopping watch: {:?}", self.root);
        self.debouncer.unwatch(&self.root)
    }
}

/// Returns false once the receiving side is gone.
fn handle_debounced_events(
    root: &Path,
    result: DebounceEventResult,
    event_tx: &tokio_mpsc::Sender<FileEvent>,
) -> bool {
    match result {
        Ok(events) => {
            for event in events {
                for file_event in convert_event(root, &event) {
                    // Blocking send since we're in a std thread
                    if event_tx.blocking_send(file_event).is_err() {
                        warn!("Event channel closed");
                        return false;
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                error!("Watch error: {error}");
            }
        }
    }
    true
}

/// Whether any component of `path` below `root` is a dot-entry.
fn hidden_below(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.ancestors().any(is_hidden)
}

fn relevant(root: &Path, path: &Path) -> bool {
    is_accepted(path) && !hidden_below(root, path) && !path.is_dir()
}

/// Translate one debounced notification. Renames become a delete, a create,
/// or both when the two ends disagree on relevance.
fn convert_event(root: &Path, event: &DebouncedEvent) -> Vec<FileEvent> {
    let Some(path) = event.paths.first().cloned() else {
        return Vec::new();
    };
    let keep = |p: &Path| relevant(root, p);

    match &event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Create(_) if keep(&path) => vec![FileEvent::Created(path)],
        EventKind::Remove(_) if keep(&path) => vec![FileEvent::Deleted(path)],
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) if keep(&path) => {
            vec![FileEvent::Deleted(path)]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) if keep(&path) => {
            vec![FileEvent::Created(path)]
        }
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Other if event.paths.len() >= 2 => {
            let to = event.paths[1].clone();
            match (keep(&path), keep(&to)) {
                (true, true) => vec![FileEvent::Renamed { from: path, to }],
                (true, false) => vec![FileEvent::Deleted(path)],
                (false, true) => vec![FileEvent::Created(to)],
                (false, false) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => Vec::new(),
        EventKind::Modify(_) if keep(&path) => vec![FileEvent::Modified(path)],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_debouncer_full::notify::event::{AccessKind, DataChange, MetadataKind};
    use std::time::Instant;

    fn make_event(kind: EventKind, paths: Vec<PathBuf>) -> DebouncedEvent {
        DebouncedEvent {
            event: notify_debouncer_full::notify::Event {
                kind,
                paths,
                attrs: Default::default(),
            },
            time: Instant::now(),
        }
    }

    fn root() -> PathBuf {
        PathBuf::from("/docs")
    }

    #[test]
    fn test_convert_event_create() {
        let path = root().join("notes.txt");
        let event = make_event(EventKind::Create(CreateKind::File), vec![path.clone()]);

        assert_eq!(convert_event(&root(), &event), vec![FileEvent::Created(path)]);
    }

    #[test]
    fn test_convert_event_modify() {
        let path = root().join("report.pdf");
        let event = make_event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            vec![path.clone()],
        );

        assert_eq!(convert_event(&root(), &event), vec![FileEvent::Modified(path)]);
    }

    #[test]
    fn test_convert_event_delete() {
        let path = root().join("sub/deck.pptx");
        let event = make_event(EventKind::Remove(RemoveKind::File), vec![path.clone()]);

        assert_eq!(convert_event(&root(), &event), vec![FileEvent::Deleted(path)]);
    }

    #[test]
    fn test_convert_event_rename_both() {
        let from = root().join("old.txt");
        let to = root().join("new.txt");
        let event = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![from.clone(), to.clone()],
        );

        assert_eq!(
            convert_event(&root(), &event),
            vec![FileEvent::Renamed { from, to }]
        );
    }

    #[test]
    fn test_rename_to_unaccepted_extension_is_delete() {
        let from = root().join("draft.txt");
        let to = root().join("draft.bak");
        let event = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![from.clone(), to],
        );

        assert_eq!(convert_event(&root(), &event), vec![FileEvent::Deleted(from)]);
    }

    #[test]
    fn test_metadata_and_access_ignored() {
        let path = root().join("notes.txt");
        let metadata = make_event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            vec![path.clone()],
        );
        let access = make_event(EventKind::Access(AccessKind::Any), vec![path]);

        assert!(convert_event(&root(), &metadata).is_empty());
        assert!(convert_event(&root(), &access).is_empty());
    }

    #[test]
    fn test_unaccepted_extension_skipped() {
        let event = make_event(
            EventKind::Create(CreateKind::File),
            vec![root().join("photo.png")],
        );

        assert!(convert_event(&root(), &event).is_empty());
    }

    #[test]
    fn test_hidden_files_skipped() {
        let hidden_file = make_event(
            EventKind::Create(CreateKind::File),
            vec![root().join(".notes.txt")],
        );
        let hidden_dir = make_event(
            EventKind::Create(CreateKind::File),
            vec![root().join(".trash/notes.txt")],
        );

        assert!(convert_event(&root(), &hidden_file).is_empty());
        assert!(convert_event(&root(), &hidden_dir).is_empty());
    }

    #[test]
    fn test_hidden_root_is_allowed() {
        let root = PathBuf::from("/home/me/.documents");
        let path = root.join("notes.txt");
        assert!(!hidden_below(&root, &path));
        assert!(hidden_below(&root, &root.join(".cache/notes.txt")));
    }
}
