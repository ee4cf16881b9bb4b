use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::app::Result;
use crate::domain::Post;
use crate::fetcher::{Fetcher, PageRequest, ParallelFetcher};
use crate::parser::{self, ParseFailure};
use crate::repository::{dedupe_ids, found_page, FetchOutcome, RepositoryConfig};

/// Posts by id, one at a time or as a bounded parallel batch.
pub struct PostRepository {
    fetcher: Arc<dyn Fetcher>,
    base_url: Url,
    parallel: ParallelFetcher,
}

impl PostRepository {
    pub fn new(fetcher: Arc<dyn Fetcher>, base_url: Url, config: &RepositoryConfig) -> Self {
        Self {
            fetcher,
            base_url,
            parallel: ParallelFetcher::with_workers(config.workers),
        }
    }

    /// Fetch one post. `None` when it is missing, unsupported or unreadable.
    pub async fn get(&self, id: &str) -> Result<Option<Post>> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }
        let outcome = fetch_post(self.fetcher.clone(), self.base_url.clone(), id.to_string()).await?;
        Ok(outcome.found())
    }

    /// Fetch many posts, in first-occurrence order of `ids`, skipping soft failures.
    pub async fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Post>> {
        let outcomes = self.fetch_outcomes(ids).await?;
        let requested = outcomes.len();

        let posts: Vec<Post> = outcomes
            .into_iter()
            .filter_map(|(_, outcome)| outcome.found())
            .collect();

        if posts.len() < requested {
            info!("Resolved {} of {} posts", posts.len(), requested);
        }
        Ok(posts)
    }

    /// Per-id outcomes for a batch, one entry per distinct id.
    ///
    /// The first hard error cancels the fetches still in flight.
    pub async fn fetch_outcomes<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<Vec<(String, FetchOutcome<Post>)>> {
        let ids = dedupe_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Fetching {} posts with {} workers",
            ids.len(),
            self.parallel.workers()
        );

        let fetcher = self.fetcher.clone();
        let base_url = self.base_url.clone();
        self.parallel
            .run_ordered(ids, move |id| {
                fetch_post(fetcher.clone(), base_url.clone(), id)
            })
            .await
    }
}

async fn fetch_post(
    fetcher: Arc<dyn Fetcher>,
    base_url: Url,
    id: String,
) -> Result<FetchOutcome<Post>> {
    info!(post_id = %id, "Fetching post");

    // The post API only answers requests carrying the token from the post page
    let request = PageRequest::get(format!("posts/{}", id));
    let Some(page) = found_page(fetcher.fetch(&request).await)? else {
        info!(post_id = %id, "Post not found");
        return Ok(FetchOutcome::NotFound);
    };
    let Some(token) = parser::parse_csrf_token(&page.body) else {
        warn!(post_id = %id, "CSRF token not found on post page");
        return Ok(FetchOutcome::Malformed("missing CSRF token".to_string()));
    };

    let request = PageRequest::get(format!("api/v1/posts/{}", id))
        .header("X-CSRF-Token", token)
        .header("X-Requested-With", "XMLHttpRequest");
    let Some(api) = found_page(fetcher.fetch(&request).await)? else {
        info!(post_id = %id, "Post not found");
        return Ok(FetchOutcome::NotFound);
    };

    match parser::parse_post(&api.body, &base_url) {
        Ok(post) => Ok(FetchOutcome::Found(post)),
        Err(ParseFailure::Unsupported(reason)) => {
            info!(post_id = %id, "Skipping post: {}", reason);
            Ok(FetchOutcome::Unsupported(reason))
        }
        Err(ParseFailure::Malformed(reason)) => {
            warn!(post_id = %id, "Could not parse post: {}", reason);
            Ok(FetchOutcome::Malformed(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::app::StashError;
    use crate::repository::tests::FakeFetcher;

    const POST_PAGE: &str =
        r#"<html><head><meta name="csrf-token" content="abc123"></head><body></body></html>"#;

    fn post_body(id: &str, is_blog: bool) -> String {
        format!(
            r#"{{"post": {{"id": {id}, "title": "Post {id}", "comment": null,
                "posted_at": "Mon, 01 Apr 2024 18:30:00 +0900", "converted_at": null,
                "is_blog": {is_blog}, "thumb": null,
                "fanclub": {{"id": 42, "creator_name": "Alice"}},
                "post_contents": []}}}}"#
        )
    }

    fn with_post(fetcher: FakeFetcher, id: &str) -> FakeFetcher {
        fetcher
            .route(format!("posts/{}", id), 200, POST_PAGE)
            .route(format!("api/v1/posts/{}", id), 200, post_body(id, false))
    }

    fn repo(fetcher: FakeFetcher, workers: usize) -> (PostRepository, Arc<FakeFetcher>) {
        let fetcher = Arc::new(fetcher);
        let config = RepositoryConfig {
            workers,
            ..Default::default()
        };
        let repo = PostRepository::new(
            fetcher.clone(),
            Url::parse("https://fantia.jp/").unwrap(),
            &config,
        );
        (repo, fetcher)
    }

    #[tokio::test]
    async fn test_get_sends_csrf_headers() {
        let (repo, fetcher) = repo(with_post(FakeFetcher::new(), "10"), 4);

        let post = repo.get("10").await.unwrap().unwrap();
        assert_eq!(post.id, "10");
        assert_eq!(post.title, "Post 10");

        let calls = fetcher.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1]
            .headers
            .contains(&("X-CSRF-Token".to_string(), "abc123".to_string())));
        assert!(calls[1]
            .headers
            .contains(&("X-Requested-With".to_string(), "XMLHttpRequest".to_string())));
    }

    #[tokio::test]
    async fn test_get_blank_id_makes_no_request() {
        let (repo, fetcher) = repo(FakeFetcher::new(), 4);
        assert!(repo.get("  ").await.unwrap().is_none());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_not_found_is_none() {
        let (repo, _) = repo(FakeFetcher::new(), 4);
        assert!(repo.get("404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_api_404_is_none() {
        let fetcher = FakeFetcher::new().route("posts/11", 200, POST_PAGE);
        let (repo, _) = repo(fetcher, 4);
        assert!(repo.get("11").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blog_post_is_none() {
        let fetcher = FakeFetcher::new()
            .route("posts/12", 200, POST_PAGE)
            .route("api/v1/posts/12", 200, post_body("12", true));
        let (repo, _) = repo(fetcher, 4);

        assert!(repo.get("12").await.unwrap().is_none());
        let outcomes = repo.fetch_outcomes(&["12"]).await.unwrap();
        assert!(matches!(outcomes[0].1, FetchOutcome::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_missing_csrf_token_is_malformed() {
        let fetcher = FakeFetcher::new().route("posts/13", 200, "<html></html>");
        let (repo, fetcher) = repo(fetcher, 4);

        let outcomes = repo.fetch_outcomes(&["13"]).await.unwrap();
        assert!(matches!(outcomes[0].1, FetchOutcome::Malformed(_)));
        assert_eq!(fetcher.call_keys(), vec!["posts/13"]);
    }

    #[tokio::test]
    async fn test_hard_errors_propagate_from_get() {
        let fetcher = FakeFetcher::new().route("posts/14", 503, "");
        let (repo, _) = repo(fetcher, 4);
        let err = repo.get("14").await.unwrap_err();
        assert!(matches!(err, StashError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_get_many_empty_makes_no_request() {
        let (repo, fetcher) = repo(FakeFetcher::new(), 4);
        let posts = repo.get_many::<String>(&[]).await.unwrap();
        assert!(posts.is_empty());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_many_dedupes_and_keeps_input_order() {
        let mut fetcher = FakeFetcher::new();
        for id in ["1", "2"] {
            fetcher = with_post(fetcher, id);
        }
        // The first id finishes last
        let fetcher = fetcher.delay("api/v1/posts/1", Duration::from_millis(80));
        let (repo, fetcher) = repo(fetcher, 4);

        let posts = repo.get_many(&["1", "1", "2"]).await.unwrap();
        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let keys = fetcher.call_keys();
        assert_eq!(keys.iter().filter(|k| *k == "api/v1/posts/1").count(), 1);
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test]
    async fn test_get_many_skips_soft_failures() {
        let fetcher = with_post(FakeFetcher::new(), "1")
            .route("posts/3", 200, POST_PAGE)
            .route("api/v1/posts/3", 200, post_body("3", true));
        let (repo, _) = repo(fetcher, 2);

        let posts = repo.get_many(&["1", "2", "3"]).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "1");

        let outcomes = repo.fetch_outcomes(&["1", "2", "3"]).await.unwrap();
        let keys: Vec<&str> = outcomes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["1", "2", "3"]);
        assert_eq!(outcomes[1].1, FetchOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_get_many_auth_failure_is_fatal() {
        let fetcher = with_post(FakeFetcher::new(), "1").route("posts/2", 401, "");
        let (repo, _) = repo(fetcher, 2);

        let err = repo.get_many(&["1", "2"]).await.unwrap_err();
        assert!(matches!(err, StashError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_get_many_large_batch() {
        let ids: Vec<String> = (100..160).map(|i| i.to_string()).collect();
        let mut fetcher = FakeFetcher::new();
        for id in &ids {
            fetcher = with_post(fetcher, id);
        }
        let (repo, _) = repo(fetcher, 8);

        let posts = repo.get_many(&ids).await.unwrap();
        let got: Vec<String> = posts.into_iter().map(|p| p.id).collect();
        assert_eq!(got, ids);
    }
}
