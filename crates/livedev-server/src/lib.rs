//! HTTP server with live reload for livedev.
//!
//! Serves a directory of static files and pushes a `reload` message to every
//! open page whenever a watched file changes:
//! - Static files from the root directory, HTML augmented with the client script
//! - `/__livereload.js` client script
//! - `/__livereload` WebSocket endpoint for reload delivery
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use livedev_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         root_dir: PathBuf::from("site"),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (livedev-server)
//!                        │
//!                        ├─► Static files (root directory, script injected)
//!                        │
//!                        └─► WebSocket (LiveReloadManager)
//!                                │
//!                                └─► notify ──► debouncer ──► dispatcher
//! ```

mod app;
mod error;
mod live_reload;
mod middleware;
mod state;
mod static_files;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use state::AppState;
use tokio::net::TcpListener;

pub use error::{ServerError, WatchSetupError};
pub use live_reload::{LiveReloadOptions, WatchConfig};

use live_reload::LiveReloadManager;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on (`0` picks a free port).
    pub port: u16,
    /// Directory to serve and watch.
    pub root_dir: PathBuf,
    /// Extensions that trigger a reload.
    pub extensions: Vec<String>,
    /// Quiet period before a reload fires.
    pub debounce: Duration,
    /// Enable live reload.
    pub live_reload_enabled: bool,
    /// Per-session delivery bound.
    pub delivery_timeout: Duration,
    /// Time a new channel has to send its handshake.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8000,
            root_dir: PathBuf::from("."),
            extensions: vec![".html".to_owned(), ".css".to_owned(), ".js".to_owned()],
            debounce: Duration::from_millis(1000),
            live_reload_enabled: true,
            delivery_timeout: Duration::from_millis(2000),
            handshake_timeout: Duration::from_millis(5000),
        }
    }
}

impl ServerConfig {
    fn live_reload_options(&self, root_dir: PathBuf) -> Result<LiveReloadOptions, WatchSetupError> {
        let watch = WatchConfig::new(root_dir, &self.extensions, self.debounce)?;
        Ok(LiveReloadOptions {
            watch,
            delivery_timeout: self.delivery_timeout,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

/// A server bound to its port, ready to serve.
pub struct Server {
    listener: TcpListener,
    router: axum::Router,
    live_reload: Option<Arc<LiveReloadManager>>,
}

impl Server {
    /// Validate the root, start live reload and bind the listener.
    ///
    /// The root directory is checked and the watcher installed before the
    /// port is bound, so a bad root never occupies a port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::WatchSetup`] for an unusable root and
    /// [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let root_dir = live_reload::check_root(&config.root_dir)?;

        let live_reload = if config.live_reload_enabled {
            let options = config.live_reload_options(root_dir.clone())?;
            Some(Arc::new(LiveReloadManager::start(&options)?))
        } else {
            None
        };

        let state = Arc::new(AppState {
            root_dir,
            live_reload: live_reload.clone(),
        });
        let router = app::create_router(state);

        let addr = format!("{}:{}", config.host, config.port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                if let Some(manager) = &live_reload {
                    manager.shutdown();
                }
                return Err(ServerError::bind(&addr, e));
            }
        };

        Ok(Self {
            listener,
            router,
            live_reload,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves, then stop live reload.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Serve`] if the accept loop fails.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            listener,
            router,
            live_reload,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, live_reload = live_reload.is_some(), "Starting server");
        }

        // Open WebSocket sessions hold connections; close them as soon as
        // shutdown starts so graceful shutdown does not wait on them
        let manager = live_reload.clone();
        let signal = async move {
            shutdown.await;
            if let Some(manager) = manager {
                manager.shutdown();
            }
        };

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(ServerError::Serve);

        if let Some(manager) = &live_reload {
            manager.shutdown();
        }
        tracing::info!("Server stopped");
        result
    }
}

/// Run the server until Ctrl-C.
///
/// # Arguments
///
/// * `config` - Server configuration
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    Server::bind(&config).await?.serve_until(shutdown_signal()).await
}

/// Wait for shutdown signal (Ctrl-C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from livedev config.
///
/// # Arguments
///
/// * `config` - Loaded and validated livedev configuration
#[must_use]
pub fn server_config_from_livedev_config(config: &livedev_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root_dir: config.watch_resolved.root_dir.clone(),
        extensions: config.watch_resolved.extensions.clone(),
        debounce: Duration::from_millis(config.watch_resolved.debounce_ms),
        live_reload_enabled: config.live_reload.enabled,
        delivery_timeout: Duration::from_millis(config.live_reload.delivery_timeout_ms),
        handshake_timeout: Duration::from_millis(config.live_reload.handshake_timeout_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(root: &std::path::Path) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 0,
            root_dir: root.to_path_buf(),
            debounce: Duration::from_millis(50),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8000);
        assert_eq!(config.extensions, vec![".html", ".css", ".js"]);
        assert_eq!(config.debounce, Duration::from_secs(1));
        assert!(config.live_reload_enabled);
    }

    #[test]
    fn test_server_config_from_livedev_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("livedev.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "0.0.0.0"
port = 9000

[watch]
extensions = [".html", ".md"]
debounce_ms = 250

[live_reload]
delivery_timeout_ms = 500
"#,
        )
        .unwrap();
        let loaded = livedev_config::Config::load(Some(&config_path), None).unwrap();

        let config = server_config_from_livedev_config(&loaded);

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.root_dir, dir.path());
        assert_eq!(config.extensions, vec![".html", ".md"]);
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert!(config.live_reload_enabled);
        assert_eq!(config.delivery_timeout, Duration::from_millis(500));
        assert_eq!(config.handshake_timeout, Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_bind_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = Server::bind(&config(&dir.path().join("missing"))).await;
        assert!(matches!(
            result,
            Err(ServerError::WatchSetup(WatchSetupError::RootMissing(_)))
        ));
    }

    #[tokio::test]
    async fn test_bind_rejects_missing_root_without_live_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir.path().join("missing"));
        config.live_reload_enabled = false;

        let result = Server::bind(&config).await;

        assert!(matches!(result, Err(ServerError::WatchSetup(_))));
    }

    #[tokio::test]
    async fn test_bind_rejects_zero_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.debounce = Duration::ZERO;

        let result = Server::bind(&config).await;

        assert!(matches!(
            result,
            Err(ServerError::WatchSetup(WatchSetupError::ZeroDebounce))
        ));
    }

    #[tokio::test]
    async fn test_bind_port_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = config(dir.path());
        config.port = taken.local_addr().unwrap().port();

        let result = Server::bind(&config).await;

        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_serve_until_stops_on_signal() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::bind(&config(dir.path())).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_until(async {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
