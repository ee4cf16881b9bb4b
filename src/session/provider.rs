use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{Result, StashError};
use crate::session::{CacheLockGuard, CookieCache, CookieSet, LoginDriver, SessionProvider, DEFAULT_SESSION_COOKIE};

/// Session provider backed by the cookie cache and a browser login.
pub struct BrowserSessionProvider {
    driver: Arc<dyn LoginDriver>,
    cache: Option<CookieCache>,
    session_cookie: String,
    probe: Option<LivenessProbe>,
    ttl: Duration,
    current: RwLock<Option<CookieSet>>,
    // Serializes browser logins within this process, cache or not
    login_gate: Mutex<()>,
}

const DEFAULT_TTL: Duration = Duration::from_secs(86400);

/// Cheap authenticated request used to confirm cached cookies still work.
struct LivenessProbe {
    client: Client,
    url: Url,
}

impl LivenessProbe {
    async fn is_alive(&self, cookies: &CookieSet) -> bool {
        let result = self
            .client
            .get(self.url.clone())
            .header(COOKIE, cookies.header_value())
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                debug!(url = %self.url, status = status.as_u16(), "Session liveness probe");
                status.is_success() || status == StatusCode::NOT_MODIFIED
            }
            Err(e) => {
                debug!(url = %self.url, "Session liveness probe failed: {}", e);
                false
            }
        }
    }
}

impl BrowserSessionProvider {
    /// Create a provider. `cache` is `None` when caching is disabled.
    pub fn new(driver: Arc<dyn LoginDriver>, cache: Option<CookieCache>) -> Self {
        let ttl = cache.as_ref().map(CookieCache::ttl).unwrap_or(DEFAULT_TTL);
        Self {
            driver,
            cache,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            probe: None,
            ttl,
            current: RwLock::new(None),
            login_gate: Mutex::new(()),
        }
    }

    /// Lifetime of a session held in memory. Defaults to the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }

    /// Check cached cookies against `url` before trusting them.
    pub fn with_liveness_check(mut self, url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        self.probe = Some(LivenessProbe { client, url });
        Ok(self)
    }

    pub fn cache(&self) -> Option<&CookieCache> {
        self.cache.as_ref()
    }

    /// Drive a login regardless of any cached state.
    pub async fn login(&self) -> Result<CookieSet> {
        let _gate = self.login_gate.lock().await;
        let _guard = self.lock_cache().await;
        self.login_and_store().await
    }

    async fn lock_cache(&self) -> Option<CacheLockGuard> {
        match &self.cache {
            Some(cache) => Some(cache.lock().await),
            None => None,
        }
    }

    fn is_fresh(&self, cookies: &CookieSet, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(cookies.captured_at) < ttl
    }

    /// The in-memory set, unless it has outlived the TTL.
    async fn current_fresh(&self) -> Option<CookieSet> {
        let cookies = self.current.read().await.clone()?;
        if self.is_fresh(&cookies, Utc::now()) {
            Some(cookies)
        } else {
            debug!("In-memory session expired (ttl {:?})", self.ttl);
            None
        }
    }

    /// Cached cookies that are unexpired, carry the session cookie and pass the probe.
    async fn usable_cached(&self) -> Option<CookieSet> {
        let cache = self.cache.as_ref()?;
        let cached = cache.load()?;

        if !cache.is_valid(&cached, Utc::now()) {
            info!("Cached cookies expired (ttl {:?})", cached.ttl);
            return None;
        }
        if !cached.cookies.has_session(&self.session_cookie) {
            warn!(
                "Cached cookies lack {}, ignoring cache",
                self.session_cookie
            );
            return None;
        }
        if let Some(probe) = &self.probe {
            if !probe.is_alive(&cached.cookies).await {
                info!("Cached cookies rejected by the platform");
                return None;
            }
        }
        Some(cached.cookies)
    }

    /// Run the browser login, persist and adopt the result. Caller holds the lock.
    async fn login_and_store(&self) -> Result<CookieSet> {
        info!("Starting browser login");
        let cookies = self.driver.drive_login().await?;

        if !cookies.has_session(&self.session_cookie) {
            return Err(StashError::Authentication(format!(
                "login finished without a {} cookie (got: {})",
                self.session_cookie,
                cookies.names().join(", ")
            )));
        }

        info!("Obtained {} cookies via browser: {:?}", cookies.len(), cookies.names());
        if let Some(cache) = &self.cache {
            cache.save(&cookies);
        }
        self.adopt(cookies.clone()).await;
        Ok(cookies)
    }

    async fn adopt(&self, cookies: CookieSet) {
        *self.current.write().await = Some(cookies);
    }
}

#[async_trait]
impl SessionProvider for BrowserSessionProvider {
    async fn get_cookies(&self) -> Result<CookieSet> {
        if let Some(cookies) = self.current_fresh().await {
            return Ok(cookies);
        }

        let _gate = self.login_gate.lock().await;
        let _guard = self.lock_cache().await;

        // Another task may have finished a login while we waited for the lock
        if let Some(cookies) = self.current_fresh().await {
            return Ok(cookies);
        }
        *self.current.write().await = None;

        if let Some(cookies) = self.usable_cached().await {
            info!("Using cached cookies: {:?}", cookies.names());
            self.adopt(cookies.clone()).await;
            return Ok(cookies);
        }

        if self.cache.is_none() {
            info!("Cookie cache disabled, performing fresh login");
        }
        self.login_and_store().await
    }

    async fn refresh(&self, stale: &CookieSet) -> Result<CookieSet> {
        let _gate = self.login_gate.lock().await;
        let _guard = self.lock_cache().await;

        // A concurrent caller may already have replaced the rejected session
        if let Some(current) = self.current_fresh().await {
            if current != *stale {
                debug!("Session already refreshed by another request");
                return Ok(current);
            }
        }

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.load() {
                if cached.cookies != *stale
                    && cached.is_valid(Utc::now())
                    && cached.cookies.has_session(&self.session_cookie)
                {
                    info!("Adopting session written by another process");
                    self.adopt(cached.cookies.clone()).await;
                    return Ok(cached.cookies);
                }
            }
        }

        *self.current.write().await = None;
        self.login_and_store().await
    }

    async fn invalidate(&self) {
        *self.current.write().await = None;
        if let Some(cache) = &self.cache {
            let _gate = self.login_gate.lock().await;
            let _guard = cache.lock().await;
            cache.clear();
        }
    }
}
