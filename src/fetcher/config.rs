use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::app::Result;

/// Configuration for outbound HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Platform root, all page paths are relative to it
    pub base_url: String,

    /// Read timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// Connect timeout in seconds (default: 10)
    pub connect_timeout_secs: u64,

    /// User agent string to use
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fantia.jp/".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Base URL with a trailing slash so relative joins keep its path.
    pub fn base(&self) -> Result<url::Url> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(url::Url::parse(&raw)?)
    }
}
