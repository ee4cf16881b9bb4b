//! Configuration management for fanstash.
//!
//! Configuration is read from `~/.config/fanstash/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use crate::download::DownloadConfig;
use crate::fetcher::HttpConfig;
use crate::repository::RepositoryConfig;
use crate::session::SessionConfig;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub http: HttpConfig,
    pub repository: RepositoryConfig,
    pub download: DownloadConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating it when missing.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/fanstash/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("fanstash").join("config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.workers == 0 {
            return Err(ConfigError::Invalid(
                "repository.workers must be at least 1".into(),
            ));
        }
        if self.session.ttl_secs == 0 {
            return Err(ConfigError::Invalid("session.ttl_secs must be positive".into()));
        }
        if self.session.session_cookie.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.session_cookie cannot be empty".into(),
            ));
        }
        url::Url::parse(&self.http.base_url)
            .map_err(|e| ConfigError::Invalid(format!("http.base_url: {}", e)))?;
        Ok(())
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# fanstash configuration

[session]
# Keep authenticated cookies on disk between runs
cache_enabled = true

# Cookie cache location (default: <cache dir>/fanstash/cookies.json)
# cache_file = "/home/me/.cache/fanstash/cookies.json"

# How long cached cookies are trusted, in seconds
ttl_secs = 86400

# Probe the platform with cached cookies before trusting them
verify_cached_session = true

# Cookie that must be present for a session to count as authenticated
session_cookie = "_session_id"

# Chrome profile used for the interactive login
# (default: <data dir>/fanstash/chrome_userdata)
# chrome_data_dir = "/home/me/.local/share/fanstash/chrome_userdata"

# The login flow is interactive, so the browser is visible by default
headless = false

# Give up waiting for the login to finish after this many seconds
login_timeout_secs = 600

# How often the browser location is checked during login (milliseconds)
login_poll_ms = 1000

[http]
base_url = "https://fantia.jp/"
timeout_secs = 30
connect_timeout_secs = 10

[repository]
# Maximum posts fetched concurrently
workers = 4

# Pause between fanclub listing pages (milliseconds)
page_delay_ms = 0

[download]
directory = "downloads/fantia"
download_thumbnail = false
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
