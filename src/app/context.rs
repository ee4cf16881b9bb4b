use std::sync::Arc;

use tracing::debug;

use crate::app::error::{Result, StashError};
use crate::config::Config;
use crate::download::MediaDownloader;
use crate::fetcher::SessionClient;
use crate::repository::{CreatorRepository, PostRepository};
use crate::session::{BrowserSessionProvider, ChromeLoginDriver, CookieCache};

pub struct AppContext {
    pub config: Config,
    pub session: Arc<BrowserSessionProvider>,
    pub client: Arc<SessionClient>,
    pub posts: PostRepository,
    pub creators: CreatorRepository,
    pub downloader: MediaDownloader,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let base_url = config.http.base()?;

        let cache = if config.session.cache_enabled {
            let path = config.session.cache_path().ok_or_else(|| {
                StashError::Other("Could not determine cookie cache location".into())
            })?;
            debug!(path = %path.display(), "Using cookie cache");
            Some(CookieCache::new(path, config.session.ttl()))
        } else {
            None
        };

        let driver = Arc::new(ChromeLoginDriver::new(&base_url, &config.session)?);
        let mut provider = BrowserSessionProvider::new(driver, cache)
            .with_session_cookie(config.session.session_cookie.clone())
            .with_ttl(config.session.ttl());
        if config.session.verify_cached_session {
            provider = provider.with_liveness_check(base_url.join("api/v1/me")?, config.http.timeout())?;
        }
        let session = Arc::new(provider);

        let client = Arc::new(SessionClient::new(&config.http, session.clone())?);
        let posts = PostRepository::new(client.clone(), base_url.clone(), &config.repository);
        let creators = CreatorRepository::new(client.clone(), &config.repository);
        let downloader = MediaDownloader::new(client.clone(), &config.download);

        Ok(Self {
            config,
            session,
            client,
            posts,
            creators,
            downloader,
        })
    }
}
