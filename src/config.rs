//! Configuration management for fling
//!
//! Defaults can be stored in ~/.config/fling/config.toml; command-line flags
//! take precedence over the file, which takes precedence over built-in
//! defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::firewall::Firewalld;
use crate::server::ServerConfig;

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Application name for config directory
const APP_NAME: &str = "fling";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ZONE: &str = "public";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {path}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Invalid port 0, expected 1-65535")]
    InvalidPort,

    #[error("Firewall zone must not be empty")]
    EmptyZone,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// How the URL in the announcement is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnounceMode {
    /// Resolve the outward-facing local IP.
    #[default]
    Outbound,
    /// Announce `localhost`; no resolution is attempted.
    Localhost,
}

/// Contents of the config file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Port to serve on and open in the firewall
    #[serde(default)]
    pub port: Option<u16>,

    /// firewalld zone to open the port in
    #[serde(default)]
    pub zone: Option<String>,

    /// Whether to open a firewall rule at all
    #[serde(default)]
    pub firewall: Option<bool>,

    /// Announcement address mode
    #[serde(default)]
    pub announce: Option<AnnounceMode>,

    /// Address to bind the server to
    #[serde(default)]
    pub bind: Option<IpAddr>,

    /// firewall-cmd compatible executable
    #[serde(default)]
    pub firewall_cmd: Option<String>,

    /// Write debug logs to this file
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Config {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the config file path
    ///
    /// Returns ~/.config/fling/config.toml on Linux
    pub fn config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Load configuration from the default location
    ///
    /// Returns default config if the file doesn't exist or no config
    /// directory is known
    pub fn load() -> ConfigResult<Self> {
        let path = match Self::config_path() {
            Ok(path) => path,
            Err(ConfigError::NoConfigDir) => return Ok(Self::default()),
            Err(e) => return Err(e),
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check if any configuration is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub zone: Option<String>,
    pub no_firewall: bool,
    pub localhost: bool,
    pub bind: Option<IpAddr>,
    pub firewall_cmd: Option<String>,
    pub log_file: Option<String>,
}

/// Effective settings after layering flags over the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub zone: String,
    pub firewall: bool,
    pub announce: AnnounceMode,
    pub bind: IpAddr,
    pub firewall_cmd: String,
    pub log_file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            zone: DEFAULT_ZONE.to_string(),
            firewall: true,
            announce: AnnounceMode::Outbound,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            firewall_cmd: Firewalld::new().binary().to_string(),
            log_file: None,
        }
    }
}

impl Settings {
    /// Merge flags over `config` over defaults, and validate the result.
    pub fn resolve(config: &Config, overrides: Overrides) -> ConfigResult<Self> {
        let defaults = Self::default();

        let firewall = if overrides.no_firewall {
            false
        } else {
            config.firewall.unwrap_or(defaults.firewall)
        };

        let announce = if overrides.localhost {
            AnnounceMode::Localhost
        } else {
            config.announce.unwrap_or(defaults.announce)
        };

        let settings = Self {
            port: overrides.port.or(config.port).unwrap_or(defaults.port),
            zone: overrides
                .zone
                .or_else(|| config.zone.clone())
                .unwrap_or(defaults.zone),
            firewall,
            announce,
            bind: overrides.bind.or(config.bind).unwrap_or(defaults.bind),
            firewall_cmd: overrides
                .firewall_cmd
                .or_else(|| config.firewall_cmd.clone())
                .unwrap_or(defaults.firewall_cmd),
            log_file: overrides.log_file.or_else(|| config.log_file.clone()),
        };

        if settings.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if settings.firewall && settings.zone.trim().is_empty() {
            return Err(ConfigError::EmptyZone);
        }

        Ok(settings)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_ip: self.bind,
            port: self.port,
        }
    }
}
