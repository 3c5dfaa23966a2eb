//! Recursive file watcher.
//!
//! Wraps a `notify` watcher and forwards create/modify/remove events for
//! files under the root as [`ChangeEvent`]s on a tokio channel. The sequence
//! ends when the [`FileWatcher`] is dropped.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::event::{ChangeEvent, ChangeKind};
use crate::error::WatchSetupError;

/// Capacity of the raw event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Check that `root` is an existing, readable directory.
///
/// Returns the canonical path so event paths can be compared against it.
pub(crate) fn check_root(root: &Path) -> Result<PathBuf, WatchSetupError> {
    let metadata = std::fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => WatchSetupError::RootMissing(root.to_path_buf()),
        _ => WatchSetupError::Inaccessible {
            path: root.to_path_buf(),
            source: e,
        },
    })?;

    if !metadata.is_dir() {
        return Err(WatchSetupError::NotADirectory(root.to_path_buf()));
    }

    std::fs::read_dir(root).map_err(|e| WatchSetupError::Inaccessible {
        path: root.to_path_buf(),
        source: e,
    })?;

    root.canonicalize()
        .map_err(|e| WatchSetupError::Inaccessible {
            path: root.to_path_buf(),
            source: e,
        })
}

/// Convert a `notify::EventKind` to a [`ChangeKind`].
///
/// Returns `None` for kinds that never trigger a reload (access, metadata-only
/// changes, unknown events).
fn change_kind(kind: EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Forward one notify callback result to the event channel.
fn forward_notify_event(res: Result<Event, notify::Error>, tx: &mpsc::Sender<ChangeEvent>) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring transient watch error");
            return;
        }
    };

    let Some(kind) = change_kind(event.kind) else {
        return;
    };

    for path in event.paths {
        // Deleted paths can no longer be stat'ed and fall through as files
        if kind != ChangeKind::Deleted && path.is_dir() {
            continue;
        }

        // Callback runs on notify's own thread, outside the runtime
        if tx.blocking_send(ChangeEvent::new(path, kind)).is_err() {
            return;
        }
    }
}

/// Running recursive watcher. Dropping it stops event production.
pub(crate) struct FileWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns [`WatchSetupError`] if the root is missing, not a directory,
    /// unreadable, or the OS watcher cannot be installed.
    pub(crate) fn start(
        root: &Path,
    ) -> Result<(Self, mpsc::Receiver<ChangeEvent>), WatchSetupError> {
        let root = check_root(root)?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res| forward_notify_event(res, &tx))
            .map_err(|e| WatchSetupError::Watcher {
                path: root.clone(),
                source: e,
            })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatchSetupError::Watcher {
                path: root.clone(),
                source: e,
            })?;

        tracing::info!(root = %root.display(), "File watcher started");

        Ok((
            Self {
                root,
                _watcher: watcher,
            },
            rx,
        ))
    }

    /// Canonical root being watched.
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }
}
