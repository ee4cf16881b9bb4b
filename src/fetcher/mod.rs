pub mod config;
pub mod parallel;
pub mod session_client;

pub use config::HttpConfig;
pub use parallel::{ParallelFetcher, DEFAULT_WORKERS};
pub use session_client::SessionClient;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::app::{Result, StashError};

/// A page or API request relative to the platform base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl PageRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A successfully fetched (2xx) response body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| StashError::Parse(format!("{}: {}", self.url, e)))
    }
}

/// Authenticated access to platform pages.
///
/// Non-2xx responses are errors: `Status` for ordinary failures,
/// `Authentication` when the session could not be repaired.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_builder() {
        let req = PageRequest::get("fanclubs/1/posts")
            .param("page", "2")
            .header("X-Requested-With", "XMLHttpRequest");

        assert_eq!(req.method, Method::GET);
        assert_eq!(req.params, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn test_fetched_page_json_error_is_parse() {
        let page = FetchedPage {
            url: "https://example.com/api".into(),
            status: 200,
            body: "<html>".into(),
        };
        let err = page.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, StashError::Parse(_)));
    }
}
