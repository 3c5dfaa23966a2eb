//! Wire messages exchanged over the live reload channel.
//!
//! The client opens the channel with `{"type":"hello"}`. The server only
//! ever answers with `{"type":"reload"}`.

use serde::{Deserialize, Serialize};

/// Message pushed from the server to a browser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ServerMessage {
    /// Reload the page.
    Reload,
}

impl ServerMessage {
    /// Serialize to the JSON text frame payload.
    pub(crate) fn to_json(self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self)
    }
}

/// Message sent from a browser to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ClientMessage {
    /// Opening handshake.
    Hello,
}

/// The opening handshake did not complete.
#[derive(Debug, thiserror::Error)]
pub(crate) enum HandshakeError {
    #[error("no handshake within {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection closed before handshake")]
    Disconnected,

    #[error("expected a text handshake frame")]
    UnexpectedFrame,

    #[error("malformed handshake: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse the first text frame a client sends.
pub(crate) fn parse_handshake(text: &str) -> Result<ClientMessage, HandshakeError> {
    Ok(serde_json::from_str(text)?)
}
