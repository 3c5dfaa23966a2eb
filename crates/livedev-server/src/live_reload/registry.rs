//! Registry of connected browser sessions.
//!
//! Sessions are registered once their WebSocket handshake completes and
//! removed when the socket closes or a delivery fails. Iteration always works
//! on a snapshot so callbacks never run under the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::protocol::ServerMessage;
use crate::error::DeliveryError;

/// Opaque session identifier. Allocated monotonically, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-{}", self.0)
    }
}

/// Lifecycle state of a session, as seen by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Registered and receiving reloads.
    Active,
    /// Unregistered. Terminal.
    Closed,
}

/// Sending side of a session's delivery channel.
#[derive(Clone, Debug)]
pub(crate) struct SessionHandle {
    tx: mpsc::Sender<ServerMessage>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { tx }
    }

    /// Queue `message` for the session, waiting at most `timeout`.
    pub(crate) async fn deliver(
        &self,
        message: ServerMessage,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        match tokio::time::timeout(timeout, self.tx.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        }
    }
}

/// A registered browser session.
#[derive(Clone, Debug)]
pub(crate) struct Session {
    pub id: SessionId,
    pub connected_at: DateTime<Utc>,
    pub handle: SessionHandle,
}

/// Thread-safe session registry.
pub(crate) struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Session>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a session and return its fresh identifier.
    pub(crate) fn register(&self, handle: SessionHandle) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Session {
            id,
            connected_at: Utc::now(),
            handle,
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id, session);
        tracing::debug!(session = %id, active = sessions.len(), "Session registered");

        id
    }

    /// Remove a session. Returns `false` if it was already gone.
    ///
    /// Dropping the stored handle closes the session's channel.
    pub(crate) fn unregister(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = sessions.remove(&id) else {
            return false;
        };

        let connected_for = Utc::now() - session.connected_at;
        tracing::debug!(
            session = %id,
            connected_secs = connected_for.num_seconds(),
            active = sessions.len(),
            "Session unregistered"
        );
        true
    }

    /// Point-in-time copy of the active sessions, ordered by id.
    pub(crate) fn snapshot(&self) -> Vec<Session> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<Session> = sessions.values().cloned().collect();
        snapshot.sort_by_key(|s| s.id);
        snapshot
    }

    /// Call `f` for every session active at the time of the call.
    ///
    /// `f` runs without the lock held, so it may register or unregister.
    /// Sessions registered meanwhile are not visited.
    pub(crate) fn for_each_active(&self, mut f: impl FnMut(&Session)) {
        for session in &self.snapshot() {
            f(session);
        }
    }

    /// State of `id`, or `None` if it was never allocated.
    pub(crate) fn state(&self, id: SessionId) -> Option<SessionState> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            Some(SessionState::Active)
        } else if id.0 < self.next_id.load(Ordering::Relaxed) {
            Some(SessionState::Closed)
        } else {
            None
        }
    }

    /// Unregister everything. Returns how many sessions were closed.
    pub(crate) fn close_all(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let closed = sessions.len();
        sessions.clear();
        closed
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
