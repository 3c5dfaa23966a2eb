//! WebSocket handler for live reload.
//!
//! A connection is `Connecting` until the client's hello arrives, then
//! `Active` in the registry until either side closes it.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;

use super::manager::LiveReloadManager;
use super::protocol::{HandshakeError, ServerMessage, parse_handshake};
use super::registry::{SessionHandle, SessionId};
use crate::state::AppState;

/// Queue depth between the dispatcher and one socket.
const SESSION_QUEUE_CAPACITY: usize = 1;

/// Why the server ended a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The registry dropped the session after a failed delivery.
    Dropped,
    /// The server is shutting down.
    ShuttingDown,
}

impl SessionEnd {
    /// Close frame telling the client whether to reconnect.
    fn close_frame(self) -> CloseFrame {
        match self {
            Self::Dropped => CloseFrame {
                code: livedev_assets::SESSION_DROPPED_CLOSE_CODE,
                reason: "session dropped".into(),
            },
            Self::ShuttingDown => CloseFrame {
                code: close_code::AWAY,
                reason: "server shutting down".into(),
            },
        }
    }
}

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(live_reload) = state.live_reload.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, live_reload))
}

/// Wait for the client's hello frame.
async fn await_handshake(socket: &mut WebSocket, timeout: Duration) -> Result<(), HandshakeError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let frame = tokio::time::timeout_at(deadline, socket.recv())
            .await
            .map_err(|_| HandshakeError::Timeout(timeout))?;

        match frame {
            Some(Ok(Message::Text(text))) => return parse_handshake(text.as_str()).map(|_| ()),
            // Control frames may arrive before the hello
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Binary(_))) => return Err(HandshakeError::UnexpectedFrame),
            Some(Ok(Message::Close(_)) | Err(_)) | None => {
                return Err(HandshakeError::Disconnected);
            }
        }
    }
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, manager: Arc<LiveReloadManager>) {
    if let Err(e) = await_handshake(&mut socket, manager.handshake_timeout()).await {
        tracing::debug!(error = %e, "Live reload handshake failed");
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
    let Some(id) = manager.open_session(SessionHandle::new(tx)) else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    tracing::debug!(session = %id, active = manager.session_count(), "Live reload channel open");

    run_session(socket, rx, &manager, id).await;
    manager.close_session(id);
}

/// Forward queued messages to the socket until either side goes away.
async fn run_session(
    mut socket: WebSocket,
    mut rx: mpsc::Receiver<ServerMessage>,
    manager: &LiveReloadManager,
    id: SessionId,
) {
    loop {
        tokio::select! {
            // Shutdown closes every session before its queue is looked at
            biased;

            () = manager.cancelled() => {
                close(&mut socket, id, SessionEnd::ShuttingDown).await;
                break;
            }
            message = rx.recv() => {
                // `None`: the registry dropped this session after a failed delivery
                let Some(message) = message else {
                    close(&mut socket, id, SessionEnd::Dropped).await;
                    break;
                };

                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(session = %id, error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            // Client frames after the hello are keep-alives
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(session = %id, "Live reload channel closed");
}

/// Send the close frame for `end`; the peer may already be gone.
async fn close(socket: &mut WebSocket, id: SessionId, end: SessionEnd) {
    tracing::debug!(session = %id, reason = ?end, "Closing live reload channel");
    let _ = socket.send(Message::Close(Some(end.close_frame()))).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_session_close_code_stops_client() {
        let frame = SessionEnd::Dropped.close_frame();
        assert_eq!(frame.code, livedev_assets::SESSION_DROPPED_CLOSE_CODE);
    }

    #[test]
    fn test_shutdown_close_code_lets_client_reconnect() {
        let frame = SessionEnd::ShuttingDown.close_frame();
        assert_eq!(frame.code, close_code::AWAY);
        assert_ne!(frame.code, livedev_assets::SESSION_DROPPED_CLOSE_CODE);
    }
}
