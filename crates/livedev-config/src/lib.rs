//! Configuration management for livedev.
//!
//! Parses `livedev.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `watch.root_dir`

use serde::Deserialize;
use std::env::VarError;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the served and watched directory.
    pub root_dir: Option<PathBuf>,
    /// Override the reload-triggering extensions.
    pub extensions: Option<Vec<String>>,
    /// Override the debounce window in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "livedev.toml";

/// Extensions that trigger a reload when no list is configured.
const DEFAULT_EXTENSIONS: [&str; 3] = [".html", ".css", ".js"];

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Watch configuration (root path is a relative string from TOML).
    watch: WatchConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved watch configuration (set after loading).
    #[serde(skip)]
    pub watch_resolved: WatchConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    #[allow(clippy::derivable_impls)]
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8000,
        }
    }
}

/// Raw watch configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WatchConfigRaw {
    root_dir: Option<String>,
    extensions: Option<Vec<String>>,
    debounce_ms: Option<u64>,
}

/// Resolved watch configuration with an absolute root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Directory that is served and watched recursively.
    pub root_dir: PathBuf,
    /// File extensions whose changes trigger a reload (e.g. `.html`).
    pub extensions: Vec<String>,
    /// Quiet period after the last change before a reload is sent.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            extensions: default_extensions(),
            debounce_ms: 1000,
        }
    }
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|&e| e.to_owned()).collect()
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled.
    pub enabled: bool,
    /// Per-session bound on delivering one reload message.
    pub delivery_timeout_ms: u64,
    /// How long a new channel may take to send its handshake.
    pub handshake_timeout_ms: u64,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delivery_timeout_ms: 2000,
            handshake_timeout_ms: 5000,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`LIVEDEV_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Expand `${VAR}` and `${VAR:-default}` references in one field.
///
/// Unset variables fall back to their default; an unset variable without a
/// default is an error naming the field.
fn expand_field(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    let mut unset = Vec::new();
    let expanded = shellexpand::env_with_context(value, |var| match std::env::var(var) {
        Ok(val) => Ok(Some(val)),
        Err(VarError::NotPresent) => {
            unset.push(var.to_owned());
            Ok(None)
        }
        Err(e) => Err(e),
    })
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} is not valid unicode", e.var_name),
    })?
    .into_owned();

    // Without a default, shellexpand leaves the reference in place
    if let Some(var) = unset.iter().find(|var| expanded.contains(&format!("${{{var}}}"))) {
        return Err(ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{var}}} is not set; use ${{{var}:-default}} for a fallback"),
        });
    }

    Ok(expanded)
}

/// Require a duration field to be strictly positive.
fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `livedev.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The merged result
    /// is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root_dir) = &settings.root_dir {
            self.watch_resolved.root_dir.clone_from(root_dir);
        }
        if let Some(extensions) = &settings.extensions {
            self.watch_resolved.extensions.clone_from(extensions);
        }
        if let Some(debounce_ms) = settings.debounce_ms {
            self.watch_resolved.debounce_ms = debounce_ms;
        }
        if let Some(live_reload_enabled) = settings.live_reload_enabled {
            self.live_reload.enabled = live_reload_enabled;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            watch: WatchConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            watch_resolved: WatchConfig {
                root_dir: base.to_path_buf(),
                ..WatchConfig::default()
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_watch()?;
        self.validate_live_reload()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but the
        // browser has to be pointed at a known address
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate watch configuration.
    fn validate_watch(&self) -> Result<(), ConfigError> {
        let watch = &self.watch_resolved;
        require_non_empty(&watch.root_dir.to_string_lossy(), "watch.root_dir")?;
        require_positive(watch.debounce_ms, "watch.debounce_ms")?;

        if watch.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "watch.extensions must list at least one extension".to_owned(),
            ));
        }
        if let Some(bad) = watch
            .extensions
            .iter()
            .find(|e| e.trim().trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "watch.extensions contains an empty extension: {bad:?}"
            )));
        }

        Ok(())
    }

    /// Validate live reload configuration.
    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        require_positive(
            self.live_reload.delivery_timeout_ms,
            "live_reload.delivery_timeout_ms",
        )?;
        require_positive(
            self.live_reload.handshake_timeout_ms,
            "live_reload.handshake_timeout_ms",
        )?;
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand_field(&self.server.host, "server.host")?;

        if let Some(ref root_dir) = self.watch.root_dir {
            self.watch.root_dir = Some(expand_field(root_dir, "watch.root_dir")?);
        }

        Ok(())
    }

    /// Resolve the root directory relative to the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let defaults = WatchConfig::default();
        self.watch_resolved = WatchConfig {
            root_dir: config_dir.join(self.watch.root_dir.as_deref().unwrap_or(".")),
            extensions: self.watch.extensions.clone().unwrap_or(defaults.extensions),
            debounce_ms: self.watch.debounce_ms.unwrap_or(defaults.debounce_ms),
        };
    }
}
