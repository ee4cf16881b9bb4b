use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::Result;
use crate::domain::Creator;
use crate::fetcher::{Fetcher, PageRequest};
use crate::parser;
use crate::repository::{found_page, RepositoryConfig};

/// Creators (fanclubs) with the full list of their post ids.
pub struct CreatorRepository {
    fetcher: Arc<dyn Fetcher>,
    page_delay: Duration,
}

impl CreatorRepository {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &RepositoryConfig) -> Self {
        Self {
            fetcher,
            page_delay: config.page_delay(),
        }
    }

    /// Fetch a creator and walk every page of its post listing.
    pub async fn get(&self, id: &str) -> Result<Option<Creator>> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        let request = PageRequest::get(format!("api/v1/fanclubs/{}", id));
        let Some(page) = found_page(self.fetcher.fetch(&request).await)? else {
            info!(fanclub_id = %id, "Fanclub not found");
            return Ok(None);
        };

        let mut creator = match parser::parse_fanclub(&page.body) {
            Ok(creator) => creator,
            Err(e) => {
                warn!(fanclub_id = %id, "Could not parse fanclub: {}", e);
                return Ok(None);
            }
        };

        creator.post_ids = self.post_ids(id).await?;
        info!(
            fanclub_id = %id,
            "Fanclub {} has {} posts",
            creator.name,
            creator.post_ids.len()
        );
        Ok(Some(creator))
    }

    /// Every post id listed for `id`, paging until an empty page.
    pub async fn post_ids(&self, id: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1u32;

        loop {
            debug!(fanclub_id = %id, page, "Fetching post listing page");
            let request =
                PageRequest::get(format!("fanclubs/{}/posts", id)).param("page", page.to_string());
            let listing = self.fetcher.fetch(&request).await?;
            let page_ids = parser::parse_post_listing(&listing.body)?;

            if page_ids.is_empty() {
                break;
            }

            let before = ids.len();
            for post_id in page_ids {
                if seen.insert(post_id.clone()) {
                    ids.push(post_id);
                }
            }
            // A listing that repeats itself instead of ending would never terminate
            if ids.len() == before {
                warn!(fanclub_id = %id, page, "Listing page had no new posts, stopping");
                break;
            }

            page += 1;
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        Ok(ids)
    }
}
