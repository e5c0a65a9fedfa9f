//! Configuration management for lanbrowse.
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML
//! file (default `~/.config/lanbrowse/config.toml`), `LANBROWSE_*`
//! environment variables and command-line flags.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("username and password must be set together")]
    IncompleteCredentials,

    #[error("root_dir is not an existing directory: {0}")]
    InvalidRootDir(PathBuf),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Optional basic authentication.
    pub auth: AuthConfig,

    /// Thumbnail cache settings.
    pub thumbnails: ThumbnailConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory tree exposed to clients.
    pub root_dir: PathBuf,

    /// TCP port to listen on.
    pub port: u16,

    /// Address to bind.
    pub bind_address: IpAddr,

    /// Log every handled request.
    pub log_requests: bool,

    /// Directory served under `/icons/`.
    pub icons_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Basic authentication credentials. Both or neither must be set.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Thumbnail cache settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Scratch directory for generated thumbnails. Removed on shutdown.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./public"),
            port: 8080,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            log_requests: false,
            icons_dir: PathBuf::from("./icons"),
            log_level: "info".to_string(),
        }
    }
}

impl AuthConfig {
    /// The configured username and password, if both are present and
    /// non-empty. Empty strings count as unset.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let user = self.username.as_deref().filter(|u| !u.is_empty())?;
        let pass = self.password.as_deref().filter(|p| !p.is_empty())?;
        Some((user, pass))
    }
}

impl ThumbnailConfig {
    /// The cache directory to use, defaulting to a per-process directory
    /// under the system temp dir.
    pub fn cache_dir_or_default(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("lanbrowse-thumbnails-{}", std::process::id()))
        })
    }
}

/// Values given on the command line. `None` leaves the config untouched.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub log_requests: bool,
    pub cache_dir: Option<PathBuf>,
    pub icons_dir: Option<PathBuf>,
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lanbrowse")
        .join("config.toml")
}

/// Treat empty strings as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - LANBROWSE_LOG_LEVEL: Override log level
    /// - LANBROWSE_USER: Basic auth username
    /// - LANBROWSE_PASS: Basic auth password
    pub fn apply_env_overrides(&mut self) {
        if let Some(level) = non_empty(std::env::var("LANBROWSE_LOG_LEVEL").ok()) {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.server.log_level = level;
        }

        if let Some(user) = non_empty(std::env::var("LANBROWSE_USER").ok()) {
            tracing::info!("Overriding auth username from environment");
            self.auth.username = Some(user);
        }

        if let Some(pass) = non_empty(std::env::var("LANBROWSE_PASS").ok()) {
            tracing::info!("Overriding auth password from environment");
            self.auth.password = Some(pass);
        }
    }

    /// Apply command-line overrides, which take precedence over everything.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(root_dir) = overrides.root_dir {
            self.server.root_dir = root_dir;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(user) = non_empty(overrides.username) {
            self.auth.username = Some(user);
        }
        if let Some(pass) = non_empty(overrides.password) {
            self.auth.password = Some(pass);
        }
        if overrides.log_requests {
            self.server.log_requests = true;
        }
        if let Some(cache_dir) = overrides.cache_dir {
            self.thumbnails.cache_dir = Some(cache_dir);
        }
        if let Some(icons_dir) = overrides.icons_dir {
            self.server.icons_dir = icons_dir;
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        let has_user = self.auth.username.as_deref().is_some_and(|u| !u.is_empty());
        let has_pass = self.auth.password.as_deref().is_some_and(|p| !p.is_empty());
        if has_user != has_pass {
            return Err(ConfigError::IncompleteCredentials);
        }

        if !self.server.root_dir.is_dir() {
            return Err(ConfigError::InvalidRootDir(self.server.root_dir.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
