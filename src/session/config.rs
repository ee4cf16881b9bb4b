use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::DEFAULT_SESSION_COOKIE;

/// Configuration for session acquisition and the cookie cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Persist cookies between runs (default: true)
    pub cache_enabled: bool,

    /// Cookie cache file (default: `<cache dir>/fanstash/cookies.json`)
    pub cache_file: Option<PathBuf>,

    /// Time-to-live of cached cookies in seconds (default: 86400)
    pub ttl_secs: u64,

    /// Probe the platform before trusting cached cookies (default: true)
    pub verify_cached_session: bool,

    /// Primary session cookie name (default: `_session_id`)
    pub session_cookie: String,

    /// Chrome profile directory (default: `<data dir>/fanstash/chrome_userdata`)
    pub chrome_data_dir: Option<PathBuf>,

    /// Run the login browser without a window (default: false)
    pub headless: bool,

    /// Login flow timeout in seconds (default: 600)
    pub login_timeout_secs: u64,

    /// Browser location polling interval in milliseconds (default: 1000)
    pub login_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_file: None,
            ttl_secs: 86400,
            verify_cached_session: true,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            chrome_data_dir: None,
            headless: false,
            login_timeout_secs: 600,
            login_poll_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn login_poll_interval(&self) -> Duration {
        Duration::from_millis(self.login_poll_ms)
    }

    /// Resolved cookie cache path
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_file.clone().or_else(|| {
            dirs::cache_dir().map(|dir| dir.join("fanstash").join("cookies.json"))
        })
    }

    /// Resolved Chrome profile directory
    pub fn chrome_profile_dir(&self) -> Option<PathBuf> {
        self.chrome_data_dir.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join("fanstash").join("chrome_userdata"))
        })
    }
}
