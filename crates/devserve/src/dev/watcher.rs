//! Debounced watcher for the mirrored static directory.
//!
//! Raw notify events are collected until the directory has been quiet for
//! the debounce window, then delivered as one batch. One batch means one
//! rebuild of the mirror.

use crate::error::{Result, ServerError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A changed file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    fn from_event(kind: &EventKind, path: PathBuf) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FileChange::Created(path)),
            EventKind::Modify(_) => Some(FileChange::Modified(path)),
            EventKind::Remove(_) => Some(FileChange::Removed(path)),
            _ => None,
        }
    }
}

/// Watches a directory recursively. Dropping it stops the watch.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Watch `root`, delivering change batches after `debounce` of quiet.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or the platform watcher
    /// cannot be created.
    pub fn new(root: PathBuf, debounce: Duration) -> Result<(Self, mpsc::Receiver<Vec<FileChange>>)> {
        if !root.exists() {
            return Err(ServerError::FileNotFound(root));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::channel(16);

        let filter_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            for path in event.paths {
                if should_ignore(&path, &filter_root) {
                    continue;
                }
                if let Some(change) = FileChange::from_event(&event.kind, path) {
                    let _ = raw_tx.send(change);
                }
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        tokio::spawn(debounce_changes(raw_rx, batch_tx, debounce));
        debug!(root = %root.display(), "watching static directory");

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            batch_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Collect changes until none arrive for `window`, then emit them together.
async fn debounce_changes(
    mut raw: mpsc::UnboundedReceiver<FileChange>,
    batches: mpsc::Sender<Vec<FileChange>>,
    window: Duration,
) {
    while let Some(first) = raw.recv().await {
        let mut pending = BTreeSet::from([first]);

        loop {
            match tokio::time::timeout(window, raw.recv()).await {
                Ok(Some(change)) => {
                    pending.insert(change);
                }
                // Watcher dropped mid-batch; flush what we have
                Ok(None) => break,
                Err(_) => break,
            }
        }

        trace!(count = pending.len(), "debounced change batch");
        if batches.send(pending.into_iter().collect()).await.is_err() {
            return;
        }
    }
}

/// Paths outside `root` and hidden files or directories are ignored.
fn should_ignore(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };

    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}
