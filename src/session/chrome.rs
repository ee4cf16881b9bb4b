use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{Result, StashError};
use crate::session::{CookieSet, LoginDriver, SessionConfig};

/// Logs in through a real Chrome window and captures the resulting cookies.
///
/// The user completes the sign-in (including any third-party identity
/// provider) in the browser; the driver only watches the page location until
/// it lands back on the platform's top page, then reads the cookie jar.
pub struct ChromeLoginDriver {
    signin_url: Url,
    host: String,
    profile_dir: Option<PathBuf>,
    headless: bool,
    timeout: Duration,
    poll_interval: Duration,
}

impl ChromeLoginDriver {
    pub fn new(base_url: &Url, config: &SessionConfig) -> Result<Self> {
        let signin_url = base_url.join("sessions/signin")?;
        let host = base_url
            .host_str()
            .ok_or_else(|| StashError::Other(format!("Base URL has no host: {}", base_url)))?
            .to_string();

        Ok(Self {
            signin_url,
            host,
            profile_dir: config.chrome_profile_dir(),
            headless: config.headless,
            timeout: config.login_timeout(),
            poll_interval: config.login_poll_interval(),
        })
    }

    async fn launch(&self) -> Result<Browser> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-first-run")
            .arg("--disable-extensions");

        if !self.headless {
            builder = builder.with_head();
        }

        // A persistent profile keeps the identity provider's own session alive
        if let Some(ref dir) = self.profile_dir {
            std::fs::create_dir_all(dir)?;
            builder = builder.user_data_dir(dir);
        }

        let browser_config = builder.build().map_err(|e| {
            StashError::Authentication(format!("Failed to build browser config: {}", e))
        })?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            StashError::Authentication(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("Browser handler stopped");
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Poll the page location until the login flow returns to the top page.
    async fn wait_for_login(&self, page: &Page) -> Result<()> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match page.url().await {
                Ok(Some(current)) => {
                    if is_logged_in_location(&current, &self.host) {
                        return Ok(());
                    }
                    debug!(location = %current, "Waiting for login to complete");
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(StashError::Authentication(format!(
                        "Lost the login page: {}",
                        e
                    )))
                }
            }

            if Instant::now() >= deadline {
                return Err(StashError::Authentication(format!(
                    "Login did not complete within {}s",
                    self.timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn capture_cookies(&self, page: &Page) -> Result<CookieSet> {
        let cookies = page
            .get_cookies()
            .await
            .map_err(|e| StashError::Authentication(format!("Failed to read cookies: {}", e)))?;

        let jar = cookies
            .into_iter()
            .filter(|c| domain_matches(&c.domain, &self.host))
            .map(|c| (c.name, c.value))
            .collect();

        Ok(CookieSet::new(jar, Utc::now()))
    }
}

#[async_trait]
impl LoginDriver for ChromeLoginDriver {
    async fn drive_login(&self) -> Result<CookieSet> {
        info!(url = %self.signin_url, "Opening browser for login");
        let mut browser = self.launch().await?;

        let result = async {
            let page = browser
                .new_page(self.signin_url.as_str())
                .await
                .map_err(|e| StashError::Authentication(format!("Failed to open page: {}", e)))?;

            self.wait_for_login(&page).await?;
            self.capture_cookies(&page).await
        }
        .await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        let _ = browser.wait().await;

        result
    }
}

/// True once the browser is back on the platform's top page.
fn is_logged_in_location(location: &str, host: &str) -> bool {
    match Url::parse(location) {
        Ok(url) => url.host_str() == Some(host) && url.path() == "/",
        Err(_) => false,
    }
}

/// Cookie domains may carry a leading dot or name a parent domain.
fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{}", domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logged_in_location() {
        assert!(is_logged_in_location("https://fantia.jp/", "fantia.jp"));
        assert!(!is_logged_in_location(
            "https://fantia.jp/sessions/signin",
            "fantia.jp"
        ));
        assert!(!is_logged_in_location(
            "https://accounts.example.com/",
            "fantia.jp"
        ));
        assert!(!is_logged_in_location("about:blank", "fantia.jp"));
    }

    #[test]
    fn test_domain_matches() {
        assert!(domain_matches("fantia.jp", "fantia.jp"));
        assert!(domain_matches(".fantia.jp", "fantia.jp"));
        assert!(domain_matches("fantia.jp", "www.fantia.jp"));
        assert!(!domain_matches("evilfantia.jp", "fantia.jp"));
        assert!(!domain_matches("example.com", "fantia.jp"));
    }

    #[test]
    fn test_new_derives_signin_url() {
        let base = Url::parse("https://fantia.jp/").unwrap();
        let driver = ChromeLoginDriver::new(&base, &SessionConfig::default()).unwrap();
        assert_eq!(driver.signin_url.as_str(), "https://fantia.jp/sessions/signin");
        assert_eq!(driver.host, "fantia.jp");
        assert_eq!(driver.timeout, Duration::from_secs(600));
    }
}
