//! Data access for posts and creators.
//!
//! Repositories turn ids into domain values. Absent, unsupported and
//! unparseable entities are soft outcomes; authentication, network and
//! unexpected HTTP failures propagate to the caller.

pub mod creator;
pub mod post;

pub use creator::CreatorRepository;
pub use post::PostRepository;

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::Result;
use crate::fetcher::{FetchedPage, DEFAULT_WORKERS};

/// Configuration for repository fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Concurrent post fetches in a batch (default: 4)
    pub workers: usize,

    /// Pause between post listing pages in milliseconds (default: 0)
    pub page_delay_ms: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            page_delay_ms: 0,
        }
    }
}

impl RepositoryConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Result of resolving one id in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    Found(T),
    NotFound,
    Unsupported(String),
    Malformed(String),
}

impl<T> FetchOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            FetchOutcome::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, FetchOutcome::Found(_))
    }
}

/// Trim ids, drop blanks and repeats, keep first-occurrence order.
pub fn dedupe_ids<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(String::from)
        .collect()
}

/// Treat an HTTP 404 as an absent page.
fn found_page(result: Result<FetchedPage>) -> Result<Option<FetchedPage>> {
    match result {
        Ok(page) => Ok(Some(page)),
        Err(e) if e.is_not_found_status() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::app::StashError;
    use crate::fetcher::{Fetcher, PageRequest};

    /// Canned responses keyed by `path[?name=value&...]`; unknown keys are 404.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        routes: HashMap<String, (u16, String)>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<PageRequest>>,
    }

    impl FakeFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn route(mut self, key: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
            self.routes.insert(key.into(), (status, body.into()));
            self
        }

        pub(crate) fn delay(mut self, key: impl Into<String>, delay: Duration) -> Self {
            self.delays.insert(key.into(), delay);
            self
        }

        pub(crate) fn calls(&self) -> Vec<PageRequest> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn call_keys(&self) -> Vec<String> {
            self.calls().iter().map(request_key).collect()
        }
    }

    fn request_key(request: &PageRequest) -> String {
        if request.params.is_empty() {
            return request.path.clone();
        }
        let query: Vec<String> = request
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", request.path, query.join("&"))
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage> {
            let key = request_key(request);
            self.calls.lock().unwrap().push(request.clone());

            if let Some(delay) = self.delays.get(&key) {
                tokio::time::sleep(*delay).await;
            }

            let url = format!("https://fantia.test/{}", key);
            match self.routes.get(&key) {
                Some((200, body)) => Ok(FetchedPage {
                    url,
                    status: 200,
                    body: body.clone(),
                }),
                Some((401, _)) => Err(StashError::Authentication(format!(
                    "{} rejected the refreshed session",
                    url
                ))),
                Some((status, _)) => Err(StashError::Status {
                    status: *status,
                    url,
                }),
                None => Err(StashError::Status { status: 404, url }),
            }
        }
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let ids = ["3", "1", " 3 ", "", "2", "1"];
        assert_eq!(dedupe_ids(&ids), vec!["3", "1", "2"]);
    }

    #[test]
    fn test_outcome_found() {
        assert_eq!(FetchOutcome::Found(5).found(), Some(5));
        assert_eq!(FetchOutcome::<u8>::NotFound.found(), None);
        assert!(!FetchOutcome::<u8>::Unsupported("blog".into()).is_found());
    }

    #[test]
    fn test_found_page_maps_404() {
        let missing = Err(StashError::Status {
            status: 404,
            url: "x".into(),
        });
        assert!(found_page(missing).unwrap().is_none());

        let forbidden = Err(StashError::Status {
            status: 403,
            url: "x".into(),
        });
        assert!(found_page(forbidden).is_err());
    }
}
