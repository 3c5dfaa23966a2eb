//! `livedev serve` command implementation.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;
use livedev_config::{CliSettings, Config};
use livedev_server::{Server, server_config_from_livedev_config, shutdown_signal};

use super::browser;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover livedev.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to serve and watch (overrides config).
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Extension that triggers a reload; repeat or comma-separate (overrides config).
    #[arg(short, long = "ext", value_name = "EXT", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Quiet period in milliseconds before a reload fires (overrides config).
    #[arg(long, value_name = "MS")]
    debounce_ms: Option<u64>,

    /// Disable live reload.
    #[arg(long)]
    no_live_reload: bool,

    /// Open the served URL in the default browser.
    #[arg(long)]
    open: bool,

    /// Enable verbose output (info-level logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let open = self.open;
        let (config_path, cli_settings) = self.into_settings();

        let config = Config::load(config_path.as_deref(), Some(&cli_settings))?;
        let server_config = server_config_from_livedev_config(&config);

        let server = Server::bind(&server_config).await?;
        let addr = server.local_addr()?;
        let url = server_url(&config.server.host, addr);

        output.highlight(&format!("Serving {url}"));
        output.info(&format!(
            "Root directory: {}",
            config.watch_resolved.root_dir.display()
        ));
        if config.live_reload.enabled {
            output.info(&format!(
                "Live reload: watching {} (debounce {} ms)",
                config.watch_resolved.extensions.join(", "),
                config.watch_resolved.debounce_ms
            ));
        } else {
            output.warning("Live reload: disabled");
        }
        output.info("Press Ctrl-C to stop");

        if open {
            browser::open(&url);
        }

        server.serve_until(shutdown_signal()).await?;
        output.success("Server stopped");

        Ok(())
    }

    /// Split the arguments into the config path and the overrides.
    fn into_settings(self) -> (Option<PathBuf>, CliSettings) {
        let settings = CliSettings {
            host: self.host,
            port: self.port,
            root_dir: self.root,
            extensions: (!self.extensions.is_empty()).then_some(self.extensions),
            debounce_ms: self.debounce_ms,
            live_reload_enabled: self.no_live_reload.then_some(false),
        };
        (self.config, settings)
    }
}

/// URL a browser can open for the bound address.
///
/// Wildcard binds are reached through `localhost`; the configured host is
/// kept otherwise so the URL matches what the user asked for.
fn server_url(host: &str, addr: SocketAddr) -> String {
    let host = if addr.ip().is_unspecified() {
        "localhost".to_owned()
    } else if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    };
    format!("http://{host}:{}/", addr.port())
}
