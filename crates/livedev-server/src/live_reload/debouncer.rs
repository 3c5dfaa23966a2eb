//! Change filtering and trailing-edge debouncing.
//!
//! Editors emit several events per save (truncate + write, temp file swap).
//! Accepted events reset a single quiet-period timer; when it expires one
//! [`ReloadSignal`] is emitted for the whole burst, however many files it
//! touched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::event::{ChangeEvent, ChangeKind, ReloadSignal};

/// Drops events that can never trigger a reload.
#[derive(Clone, Debug)]
pub(crate) struct ChangeFilter {
    extensions: BTreeSet<String>,
}

impl ChangeFilter {
    /// Create a filter over normalized extensions (lowercase, no dot).
    pub(crate) fn new(extensions: BTreeSet<String>) -> Self {
        Self { extensions }
    }

    /// Whether `event` may contribute to a reload.
    ///
    /// Checks the extension first, then the change kind.
    pub(crate) fn accepts(&self, event: &ChangeEvent) -> bool {
        let relevant_extension = event
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()));

        relevant_extension
            && matches!(
                event.kind,
                ChangeKind::Created | ChangeKind::Modified | ChangeKind::Deleted
            )
    }
}

/// Paths that changed during one quiet period, with their coalesced kinds.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PendingBatch {
    pub changes: Vec<(PathBuf, ChangeKind)>,
}

/// Pending burst waiting for its quiet period to end.
struct Pending {
    changes: BTreeMap<PathBuf, ChangeKind>,
    deadline: Instant,
}

/// Thread-safe trailing-edge debouncer with a single shared deadline.
pub(crate) struct EventDebouncer {
    pending: Mutex<Option<Pending>>,
    debounce_duration: Duration,
}

impl EventDebouncer {
    /// Create a new debouncer with the specified quiet period.
    pub(crate) fn new(debounce_duration: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            debounce_duration,
        }
    }

    /// Record an accepted event and push the deadline out.
    pub(crate) fn record(&self, event: ChangeEvent) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        // Measured from when the change was seen, not when it was processed
        let deadline = event.observed_at + self.debounce_duration;

        let batch = pending.get_or_insert_with(|| Pending {
            changes: BTreeMap::new(),
            deadline,
        });
        batch.deadline = batch.deadline.max(deadline);
        batch
            .changes
            .entry(event.path)
            .and_modify(|kind| *kind = Self::coalesce(*kind, event.kind))
            .or_insert(event.kind);
    }

    /// Coalesce two kinds reported for the same path within one window.
    ///
    /// Unlike a per-file sync, a path that was created and deleted again is
    /// kept: the burst still happened and still earns its reload.
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> ChangeKind {
        use ChangeKind::{Created, Deleted, Modified};

        match (existing, new) {
            (Created, Created | Modified) => Created,
            (Created, Deleted) => Deleted,

            (Modified, Created) => Created,
            (Modified, Modified) => Modified,
            (Modified, Deleted) => Deleted,

            // Replaced in place
            (Deleted, Created) => Modified,
            (Deleted, Modified | Deleted) => Deleted,
        }
    }

    /// Take the pending batch if its deadline has passed.
    pub(crate) fn drain_ready(&self, now: Instant) -> Option<PendingBatch> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        if pending.as_ref()?.deadline > now {
            return None;
        }

        pending.take().map(|batch| PendingBatch {
            changes: batch.changes.into_iter().collect(),
        })
    }

    /// Deadline of the pending batch, for timer scheduling.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.as_ref().map(|p| p.deadline)
    }

    /// Drop the pending batch without emitting it.
    pub(crate) fn clear(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Turn raw change events into reload signals.
///
/// Runs until the event sequence ends or `cancel` fires; either way the
/// pending timer is discarded and no late signal is sent. When a signal is
/// already queued and not yet dispatched, a new one folds into it.
pub(crate) async fn run_debounce_loop(
    mut events: mpsc::Receiver<ChangeEvent>,
    filter: ChangeFilter,
    debouncer: EventDebouncer,
    signals: mpsc::Sender<ReloadSignal>,
    cancel: CancellationToken,
) {
    loop {
        let deadline = debouncer.next_deadline();

        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            event = events.recv() => {
                let Some(event) = event else { break };
                if filter.accepts(&event) {
                    tracing::debug!(path = %event.path.display(), kind = ?event.kind, "Recorded change");
                    debouncer.record(event);
                } else {
                    tracing::trace!(path = %event.path.display(), "Ignored change");
                }
            }

            () = sleep_until_deadline(deadline) => {
                let Some(batch) = debouncer.drain_ready(Instant::now()) else {
                    continue;
                };

                let paths: Vec<_> = batch
                    .changes
                    .iter()
                    .map(|(path, kind)| format!("{} ({kind:?})", path.display()))
                    .collect();
                tracing::info!(changes = ?paths, "Files changed, reloading");

                match signals.try_send(ReloadSignal) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("Reload already queued, coalescing");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        }
    }

    debouncer.clear();
    tracing::debug!("Debounce loop stopped");
}
