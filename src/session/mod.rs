//! Authenticated session handling.
//!
//! ```text
//! SessionClient → SessionProvider → CookieCache (disk)
//!                                 ↘ LoginDriver (browser)
//! ```
//!
//! The provider hands out a [`CookieSet`] from memory or from the cookie cache
//! when it is still valid, and otherwise drives a real browser through the
//! platform's login flow. Live logins are serialized through the cache lock.

mod cache;
mod chrome;
mod config;
pub(crate) mod provider;

pub use cache::{CacheLockGuard, CachedSession, CookieCache};
pub use chrome::ChromeLoginDriver;
pub use config::SessionConfig;
pub use provider::BrowserSessionProvider;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::Result;

/// Cookie name the platform uses for its primary session.
pub const DEFAULT_SESSION_COOKIE: &str = "_session_id";

/// Cookie name/value pairs captured from one authenticated browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSet {
    pub cookies: BTreeMap<String, String>,
    #[serde(rename = "timestamp")]
    pub captured_at: DateTime<Utc>,
}

impl CookieSet {
    pub fn new(cookies: BTreeMap<String, String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            cookies,
            captured_at,
        }
    }

    pub fn empty() -> Self {
        Self::new(BTreeMap::new(), Utc::now())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// True when the primary session cookie is present with a value.
    pub fn has_session(&self, session_cookie: &str) -> bool {
        self.get(session_cookie).is_some_and(|v| !v.is_empty())
    }

    pub fn names(&self) -> Vec<&str> {
        self.cookies.keys().map(String::as_str).collect()
    }

    /// Render as a `Cookie` request header value.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl<K, V> FromIterator<(K, V)> for CookieSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            Utc::now(),
        )
    }
}

/// Source of authenticated cookies for outbound requests.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current cookies, from memory, the cache, or a live login.
    async fn get_cookies(&self) -> Result<CookieSet>;

    /// Replace `stale` with a freshly authenticated set.
    ///
    /// Called after the platform rejected `stale`. Never serves `stale` back.
    async fn refresh(&self, stale: &CookieSet) -> Result<CookieSet>;

    /// Forget the current session, in memory and on disk.
    async fn invalidate(&self);
}

/// Drives an interactive login and returns the resulting cookie jar.
#[async_trait]
pub trait LoginDriver: Send + Sync {
    async fn drive_login(&self) -> Result<CookieSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value_joins_pairs() {
        let set: CookieSet = [("_session_id", "abc"), ("_f_v_k_1", "xyz")]
            .into_iter()
            .collect();
        // BTreeMap keeps names sorted
        assert_eq!(set.header_value(), "_f_v_k_1=xyz; _session_id=abc");
    }

    #[test]
    fn test_has_session() {
        let set: CookieSet = [("_session_id", "abc")].into_iter().collect();
        assert!(set.has_session(DEFAULT_SESSION_COOKIE));
        assert!(!set.has_session("other"));

        let blank: CookieSet = [("_session_id", "")].into_iter().collect();
        assert!(!blank.has_session(DEFAULT_SESSION_COOKIE));

        assert!(!CookieSet::empty().has_session(DEFAULT_SESSION_COOKIE));
    }

    #[test]
    fn test_serialized_shape() {
        let set: CookieSet = [("_session_id", "abc")].into_iter().collect();
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["cookies"]["_session_id"], "abc");
        assert!(json["timestamp"].is_string());
    }
}
