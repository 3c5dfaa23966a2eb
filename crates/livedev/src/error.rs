//! CLI error types.

use livedev_config::ConfigError;
use livedev_server::ServerError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Server(#[from] ServerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_server_error_message_is_kept() {
        let err = CliError::from(ServerError::from(
            livedev_server::WatchSetupError::RootMissing(PathBuf::from("/srv/site")),
        ));
        assert_eq!(err.to_string(), "Root directory does not exist: /srv/site");
    }

    #[test]
    fn test_config_error_message_is_kept() {
        let err = CliError::from(ConfigError::NotFound(PathBuf::from("livedev.toml")));
        assert!(err.to_string().contains("livedev.toml"));
    }
}
