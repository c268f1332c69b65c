//! Server configuration: TOML file + CLI overrides.

use serde::Deserialize;
use shuttler_core::{ShuttlerError, ShuttlerResult};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub identity: IdentitySection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub allow_cross_origin: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            allow_cross_origin: false,
        }
    }
}

/// `[identity]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySection {
    #[serde(default = "default_identity_url")]
    pub base_url: String,
    #[serde(default = "default_identity_timeout")]
    pub timeout_secs: u64,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            base_url: default_identity_url(),
            timeout_secs: default_identity_timeout(),
        }
    }
}

/// `[rate_limit]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    /// Failed authentication attempts tolerated per peer address within the
    /// window before further attempts are refused; 0 disables the limit.
    #[serde(default = "default_max_failures")]
    pub max_failures: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:9002".to_string()
}
fn default_path() -> String {
    "/ws".to_string()
}
fn default_identity_url() -> String {
    "http://annotatron-service".to_string()
}
fn default_identity_timeout() -> u64 {
    10
}
fn default_max_failures() -> usize {
    5
}
fn default_window_secs() -> u64 {
    60
}

/// Values given on the command line; `None` keeps the file's value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub listen: Option<String>,
    pub path: Option<String>,
    pub identity_url: Option<String>,
    pub identity_timeout: Option<u64>,
    pub allow_cross_origin: bool,
}

/// Resolved, validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub path: String,
    pub allow_cross_origin: bool,
    pub identity_url: String,
    pub identity_timeout: Duration,
    pub auth_max_failures: usize,
    pub auth_window: Duration,
}

impl ServerConfig {
    /// Load config from a TOML file (if it exists), then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, cli: CliOverrides) -> ShuttlerResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse_config_file(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Self::resolve(file_config, cli)
    }

    /// Merge CLI overrides into a parsed file and validate the result.
    pub fn resolve(file: ConfigFile, cli: CliOverrides) -> ShuttlerResult<Self> {
        let listen_str = cli.listen.unwrap_or(file.server.listen);
        let listen: SocketAddr = listen_str
            .parse()
            .map_err(|e| ShuttlerError::Config(format!("invalid listen address {listen_str:?}: {e}")))?;

        let path = cli.path.unwrap_or(file.server.path);
        if !path.starts_with('/') {
            return Err(ShuttlerError::Config(format!(
                "WebSocket path must start with '/': {path:?}"
            )));
        }

        let identity_url = cli.identity_url.unwrap_or(file.identity.base_url);
        if !(identity_url.starts_with("http://") || identity_url.starts_with("https://")) {
            return Err(ShuttlerError::Config(format!(
                "identity service URL must be http(s): {identity_url:?}"
            )));
        }

        let timeout_secs = cli.identity_timeout.unwrap_or(file.identity.timeout_secs);
        if timeout_secs == 0 {
            return Err(ShuttlerError::Config(
                "identity timeout must be at least 1 second".into(),
            ));
        }

        Ok(Self {
            listen,
            path,
            allow_cross_origin: cli.allow_cross_origin || file.server.allow_cross_origin,
            identity_url,
            identity_timeout: Duration::from_secs(timeout_secs),
            auth_max_failures: file.rate_limit.max_failures,
            auth_window: Duration::from_secs(file.rate_limit.window_secs),
        })
    }
}

fn parse_config_file(content: &str) -> ShuttlerResult<ConfigFile> {
    toml::from_str(content).map_err(|e| ShuttlerError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
