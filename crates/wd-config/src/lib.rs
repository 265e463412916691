//! Configuration management for wd.
//!
//! Parses `wd.toml` configuration files with serde and provides
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
//! - `live_reload.path`

mod expand;

use serde::Deserialize;
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
    /// Override the directory being served.
    pub source_dir: Option<PathBuf>,
    /// Override the reload endpoint path.
    pub reload_path: Option<String>,
    /// Override the force-reload flag baked into the client script.
    pub force_reload: Option<bool>,
    /// Override the `wss://` flag baked into the client script.
    pub tls: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "wd.toml";

/// Upper bound for `live_reload.debounce_ms`.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Mirror configuration (paths are relative strings from TOML).
    #[serde(default)]
    mirror: MirrorConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved mirror configuration (set after loading).
    #[serde(skip)]
    pub mirror_resolved: MirrorConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
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
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

/// Raw mirror configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct MirrorConfigRaw {
    source_dir: Option<String>,
}

/// Resolved mirror configuration with absolute paths.
#[derive(Debug, Default)]
pub struct MirrorConfig {
    /// Directory whose contents are mirrored and served.
    pub source_dir: PathBuf,
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Path of the WebSocket reload endpoint.
    pub path: String,
    /// Reload on every change event, not only ones matching the open page.
    pub force_reload: bool,
    /// Connect with `wss://` instead of `ws://`.
    pub tls: bool,
    /// Quiet period before a burst of writes to one file is reported.
    pub debounce_ms: u64,
    /// Delay between client reconnection attempts.
    pub retry_ms: u64,
    /// Pending events buffered per connected client before it is dropped.
    pub outbox_capacity: usize,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            path: "/delta-streamer-ws".to_owned(),
            force_reload: false,
            tls: false,
            debounce_ms: 100,
            retry_ms: 1000,
            outbox_capacity: 16,
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
        /// Error message (e.g., "${`WD_HOST`} not set").
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

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `wd.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The merged result
    /// is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the merged configuration is invalid.
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
        if let Some(source_dir) = &settings.source_dir {
            self.mirror_resolved.source_dir.clone_from(source_dir);
        }
        if let Some(reload_path) = &settings.reload_path {
            self.live_reload.path.clone_from(reload_path);
        }
        if let Some(force_reload) = settings.force_reload {
            self.live_reload.force_reload = force_reload;
        }
        if let Some(tls) = settings.tls {
            self.live_reload.tls = tls;
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

    /// Create default config serving the current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config serving the given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            mirror: MirrorConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            mirror_resolved: MirrorConfig {
                source_dir: base.to_path_buf(),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

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
        self.validate_live_reload()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is only for embedding; the printed URL must be reachable
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate live reload configuration.
    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        let live_reload = &self.live_reload;

        require_non_empty(&live_reload.path, "live_reload.path")?;
        if !live_reload.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "live_reload.path must start with '/'".to_owned(),
            ));
        }
        if live_reload.path == "/" {
            return Err(ConfigError::Validation(
                "live_reload.path cannot be '/', it would shadow the site root".to_owned(),
            ));
        }
        if live_reload
            .path
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '?' | '#' | ':' | '{' | '}' | '*'))
        {
            return Err(ConfigError::Validation(
                "live_reload.path must be a plain URL path without route syntax".to_owned(),
            ));
        }

        if live_reload.outbox_capacity == 0 {
            return Err(ConfigError::Validation(
                "live_reload.outbox_capacity must be greater than 0".to_owned(),
            ));
        }
        if live_reload.retry_ms == 0 {
            return Err(ConfigError::Validation(
                "live_reload.retry_ms must be greater than 0".to_owned(),
            ));
        }
        if live_reload.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "live_reload.debounce_ms cannot exceed {MAX_DEBOUNCE_MS}"
            )));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        self.live_reload.path = expand::expand_env(&self.live_reload.path, "live_reload.path")?;
        Ok(())
    }

    /// Resolve relative paths against the config file's directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.mirror_resolved = MirrorConfig {
            source_dir: config_dir.join(self.mirror.source_dir.as_deref().unwrap_or(".")),
        };
    }
}
