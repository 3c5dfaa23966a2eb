//! Live reload manager.
//!
//! Owns the watcher, the debounce and dispatch tasks, and the session
//! registry for one server instance. Built on server start, torn down with
//! [`LiveReloadManager::shutdown`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::debouncer::{ChangeFilter, EventDebouncer, run_debounce_loop};
use super::dispatcher::PushDispatcher;
use super::event::{ReloadSignal, WatchConfig};
use super::registry::{SessionHandle, SessionId, SessionRegistry};
use super::watcher::FileWatcher;
use crate::error::WatchSetupError;

/// Default bound on delivering one reload to one session.
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time a new channel has to send its handshake.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Live reload settings.
#[derive(Clone, Debug)]
pub struct LiveReloadOptions {
    /// What to watch and how to coalesce changes.
    pub watch: WatchConfig,
    /// Per-session delivery bound.
    pub delivery_timeout: Duration,
    /// Handshake bound for new channels.
    pub handshake_timeout: Duration,
}

impl LiveReloadOptions {
    /// Options with default timeouts.
    #[must_use]
    pub fn new(watch: WatchConfig) -> Self {
        Self {
            watch,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Coordinates file watching and reload delivery.
pub(crate) struct LiveReloadManager {
    registry: Arc<SessionRegistry>,
    watcher: Mutex<Option<FileWatcher>>,
    cancel: CancellationToken,
    handshake_timeout: Duration,
}

impl LiveReloadManager {
    /// Validate the root, start the watcher and spawn the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WatchSetupError`] if the root cannot be watched.
    pub(crate) fn start(options: &LiveReloadOptions) -> Result<Self, WatchSetupError> {
        let (watcher, events) = FileWatcher::start(options.watch.root_dir())?;

        let registry = Arc::new(SessionRegistry::new());
        let cancel = CancellationToken::new();

        // Capacity 1: a signal queued behind a running dispatch absorbs later ones
        let (signal_tx, signal_rx) = mpsc::channel::<ReloadSignal>(1);

        tokio::spawn(run_debounce_loop(
            events,
            ChangeFilter::new(options.watch.extensions().clone()),
            EventDebouncer::new(options.watch.debounce()),
            signal_tx,
            cancel.clone(),
        ));

        let dispatcher = PushDispatcher::new(Arc::clone(&registry), options.delivery_timeout);
        tokio::spawn(run_dispatch_loop(signal_rx, dispatcher, cancel.clone()));

        tracing::info!(
            root = %watcher.root().display(),
            extensions = ?options.watch.extensions(),
            debounce_ms = options.watch.debounce().as_millis(),
            "Live reload started"
        );

        Ok(Self {
            registry,
            watcher: Mutex::new(Some(watcher)),
            cancel,
            handshake_timeout: options.handshake_timeout,
        })
    }

    /// Register a session whose handshake completed.
    ///
    /// Returns `None` once shutdown has begun.
    pub(crate) fn open_session(&self, handle: SessionHandle) -> Option<SessionId> {
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(self.registry.register(handle))
    }

    /// Unregister a session whose channel ended.
    pub(crate) fn close_session(&self, id: SessionId) {
        if !self.registry.unregister(id) {
            // Dropped by a failed delivery or by shutdown
            tracing::debug!(session = %id, state = ?self.registry.state(id), "Session already closed");
        }
    }

    pub(crate) fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Resolves once shutdown has begun.
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Stop watching, drop any pending reload and close every session.
    ///
    /// Idempotent.
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let closed = self.registry.close_all();
        tracing::info!(closed_sessions = closed, "Live reload stopped");
    }
}

impl Drop for LiveReloadManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Dispatch one reload per received signal until cancelled.
async fn run_dispatch_loop(
    mut signals: mpsc::Receiver<ReloadSignal>,
    dispatcher: PushDispatcher,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            signal = signals.recv() => {
                let Some(ReloadSignal) = signal else { break };

                let start = Instant::now();
                let report = dispatcher.dispatch().await;
                tracing::info!(
                    delivered = report.delivered,
                    failed = report.failed.len(),
                    elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Reload dispatched"
                );
            }
        }
    }

    tracing::debug!("Dispatch loop stopped");
}
