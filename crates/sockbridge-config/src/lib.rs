#![deny(unsafe_code)]

//! Configuration loading and validation for sockbridge.
//!
//! Configuration comes from an optional TOML file, then the well-known
//! environment variables (`PROXY_SOCK`, `BRIDGE_SOCK`) are overlaid on top.
//! [`BridgeConfig`] is the central structure shared by the relay and the shim.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable naming the Unix socket the relay dials.
pub const PROXY_SOCK_ENV: &str = "PROXY_SOCK";

/// Environment variable naming the Unix socket the shim sends requests to.
pub const BRIDGE_SOCK_ENV: &str = "BRIDGE_SOCK";

/// Environment variable pointing the shim at a TOML config file.
pub const CONFIG_PATH_ENV: &str = "SOCKBRIDGE_CONFIG";

/// Log filter for the shim. `RUST_LOG` is deliberately not consulted there,
/// since it usually belongs to whatever program is calling the tool.
pub const SHIM_LOG_ENV: &str = "SOCKBRIDGE_LOG";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// TCP → Unix relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Command shim configuration.
    #[serde(default)]
    pub shim: ShimConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the TCP relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the relay listens on. Must be a loopback address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// TCP port the relay listens on. `0` binds an ephemeral port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Unix socket every accepted connection is bridged to.
    #[serde(default)]
    pub socket_path: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            socket_path: None,
        }
    }
}

impl RelayConfig {
    /// The configured Unix socket path, if any.
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.socket_path.as_deref().map(PathBuf::from)
    }

    /// The socket address to bind, combining `listen_addr` and `listen_port`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.listen_addr.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "relay.listen_addr must be an IP address, got {:?}",
                self.listen_addr
            ))
        })?;
        if !ip.is_loopback() {
            return Err(ConfigError::Validation(format!(
                "relay.listen_addr must be a loopback address, got {ip}"
            )));
        }
        Ok(SocketAddr::new(ip, self.listen_port))
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    9999
}

/// Configuration for the command shim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShimConfig {
    /// Unix socket of the broker. Unset means every invocation runs locally.
    #[serde(default)]
    pub socket_path: Option<String>,

    /// Command name to forward. Defaults to the shim's own executable name.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments that force local execution when present anywhere in argv.
    #[serde(default = "default_local_only_flags")]
    pub local_only_flags: Vec<String>,

    /// Program (plus leading args) used to run the real tool locally.
    /// The command name and the original arguments are appended.
    #[serde(default = "default_local_runner")]
    pub local_runner: Vec<String>,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            command: None,
            local_only_flags: default_local_only_flags(),
            local_runner: default_local_runner(),
        }
    }
}

impl ShimConfig {
    /// The configured broker socket path, if any.
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.socket_path.as_deref().map(PathBuf::from)
    }
}

fn default_local_only_flags() -> Vec<String> {
    ["--help", "-h", "--version", "-v"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_local_runner() -> Vec<String> {
    vec!["pkgx".to_string()]
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BridgeConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load the file if it exists, otherwise start from defaults.
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if tokio::fs::try_exists(path).await? {
            Self::load(path).await
        } else {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables on top of the file configuration.
    ///
    /// `lookup` resolves a variable name; empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(path) = get(PROXY_SOCK_ENV) {
            self.relay.socket_path = Some(path);
        }
        if let Some(path) = get(BRIDGE_SOCK_ENV) {
            self.shim.socket_path = Some(path);
        }
    }

    /// Overlay the current process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.relay.bind_addr()?;

        if self.relay.socket_path.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "relay.socket_path must not be empty".to_string(),
            ));
        }
        if self.shim.socket_path.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "shim.socket_path must not be empty".to_string(),
            ));
        }
        if self.shim.command.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "shim.command must not be empty".to_string(),
            ));
        }

        for (i, flag) in self.shim.local_only_flags.iter().enumerate() {
            if flag.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "shim.local_only_flags[{i}] must not be empty"
                )));
            }
        }
        for (i, part) in self.shim.local_runner.iter().enumerate() {
            if part.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "shim.local_runner[{i}] must not be empty"
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}
