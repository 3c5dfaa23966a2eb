//! Change and signal types flowing through the live reload pipeline.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::WatchSetupError;

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A raw change reported by the file watcher.
#[derive(Clone, Debug)]
pub(crate) struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: Instant,
}

impl ChangeEvent {
    pub(crate) fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: Instant::now(),
        }
    }
}

/// "At least one relevant file changed since the last signal."
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ReloadSignal;

/// What to watch and how to coalesce changes.
///
/// Immutable once built. Extensions are stored lowercase without the leading
/// dot so `".HTML"` and `"html"` name the same entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    root_dir: PathBuf,
    extensions: BTreeSet<String>,
    debounce: Duration,
}

impl WatchConfig {
    /// Build a watch configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WatchSetupError::ZeroDebounce`] if `debounce` is zero.
    pub fn new<I, S>(
        root_dir: impl Into<PathBuf>,
        extensions: I,
        debounce: Duration,
    ) -> Result<Self, WatchSetupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if debounce.is_zero() {
            return Err(WatchSetupError::ZeroDebounce);
        }

        let extensions = extensions
            .into_iter()
            .filter_map(|e| normalize_extension(e.as_ref()))
            .collect();

        Ok(Self {
            root_dir: root_dir.into(),
            extensions,
            debounce,
        })
    }

    /// Directory watched recursively.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Normalized reload-triggering extensions.
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    /// Quiet period before a reload is emitted.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

/// Lowercase an extension and strip its leading dot; `None` when blank.
fn normalize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.');
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
