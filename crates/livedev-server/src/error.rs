//! Error types for the server.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// The watched root could not be set up. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum WatchSetupError {
    /// Root directory does not exist.
    #[error("Root directory does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    /// Root path exists but is a file.
    #[error("Root path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Root directory cannot be read.
    #[error("Root directory is not accessible: {}: {source}", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The OS file watcher could not be installed.
    #[error("Failed to watch {}: {source}", .path.display())]
    Watcher {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Debounce window of zero length.
    #[error("Debounce window must be greater than zero")]
    ZeroDebounce,
}

/// Server startup or runtime error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Watch setup failed before any port was bound.
    #[error(transparent)]
    WatchSetup(#[from] WatchSetupError),

    /// Listener could not be bound.
    #[error("Failed to bind {addr}: {reason}")]
    Bind {
        addr: String,
        reason: String,
        #[source]
        source: io::Error,
    },

    /// The server loop failed after startup.
    #[error("Server error: {0}")]
    Serve(#[source] io::Error),
}

impl ServerError {
    /// Build a bind error with an actionable reason.
    pub(crate) fn bind(addr: &str, source: io::Error) -> Self {
        let reason = match source.kind() {
            io::ErrorKind::AddrInUse => {
                "address already in use; pick another port with --port or stop the process using it"
                    .to_owned()
            }
            io::ErrorKind::PermissionDenied => {
                "permission denied; ports below 1024 usually need elevated privileges".to_owned()
            }
            _ => source.to_string(),
        };

        Self::Bind {
            addr: addr.to_owned(),
            reason,
            source,
        }
    }
}

/// Delivering a reload message to one session failed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum DeliveryError {
    /// The session's channel is gone.
    #[error("session channel closed")]
    Closed,

    /// The session did not accept the message in time.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_addr_in_use_is_actionable() {
        let err = ServerError::bind(
            "localhost:8000",
            io::Error::from(io::ErrorKind::AddrInUse),
        );
        let msg = err.to_string();
        assert!(msg.contains("localhost:8000"));
        assert!(msg.contains("already in use"));
        assert!(msg.contains("--port"));
    }

    #[test]
    fn test_bind_error_permission_denied() {
        let err = ServerError::bind("0.0.0.0:80", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_watch_setup_error_is_transparent() {
        let err = ServerError::from(WatchSetupError::RootMissing(PathBuf::from("/nope")));
        assert_eq!(err.to_string(), "Root directory does not exist: /nope");
    }
}
