use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{COOKIE, WWW_AUTHENTICATE};
use reqwest::{Client, Method, Response, StatusCode};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{Result, StashError};
use crate::fetcher::{FetchedPage, Fetcher, HttpConfig, PageRequest};
use crate::session::{CookieSet, SessionProvider};

/// HTTP client that attaches session cookies and repairs expired sessions.
///
/// A 401 response triggers exactly one session refresh and one retry. Every
/// other failure is returned unchanged.
pub struct SessionClient {
    client: Client,
    base_url: Url,
    session: Arc<dyn SessionProvider>,
}

impl SessionClient {
    pub fn new(config: &HttpConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base()?,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<dyn SessionProvider> {
        &self.session
    }

    /// Send `method` to `path` (relative to the base URL) with query `params`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<FetchedPage> {
        let mut request = PageRequest::new(method, path);
        for (name, value) in params {
            request = request.param(*name, *value);
        }
        self.fetch(&request).await
    }

    /// Stream `url` into `dest`. Returns `None` when the server answers 404.
    ///
    /// The body is written to `<dest>.part` and renamed once complete, so an
    /// interrupted download never leaves a truncated file under the final name.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<Option<u64>> {
        let url = self.base_url.join(url)?;
        let mut response = self.send(Method::GET, url.clone(), &[]).await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(url = %url, "Download returned 404, skipping");
            return Ok(None);
        }
        check_status(&response)?;

        let expected = response.content_length();
        if let (Some(expected), Ok(existing)) = (expected, tokio::fs::metadata(dest).await) {
            if existing.is_file() && existing.len() == expected {
                info!(path = %dest.display(), "File already complete, skipping");
                return Ok(Some(expected));
            }
        }

        let part_file = part_path(dest);
        let mut file = tokio::fs::File::create(&part_file).await?;
        // Removed on drop, including when this future is cancelled
        let part = TempPath::from_path(part_file);

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = expected {
            if expected != written {
                return Err(StashError::Other(format!(
                    "Downloaded size mismatch for {}: expected {}, got {}",
                    url, expected, written
                )));
            }
        }

        part.persist(dest).map_err(|e| StashError::Io(e.error))?;
        debug!(path = %dest.display(), "Downloaded {} bytes", written);
        Ok(Some(written))
    }

    fn resolve(&self, request: &PageRequest) -> Result<Url> {
        let mut url = self.base_url.join(&request.path)?;
        if !request.params.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.params);
        }
        Ok(url)
    }

    /// Send with session repair. Returns any response other than a final 401.
    async fn send(&self, method: Method, url: Url, headers: &[(String, String)]) -> Result<Response> {
        let cookies = self.session.get_cookies().await?;
        let response = self.send_once(&method, &url, headers, &cookies).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // A 401 can also mean the resource wants other credentials
        warn!(
            url = %url,
            www_authenticate = ?response.headers().get(WWW_AUTHENTICATE),
            "Received 401 Unauthorized, refreshing session"
        );
        let fresh = self.session.refresh(&cookies).await?;

        let retried = self.send_once(&method, &url, headers, &fresh).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(
                url = %url,
                www_authenticate = ?retried.headers().get(WWW_AUTHENTICATE),
                "Request still unauthorized after session refresh"
            );
            return Err(StashError::Authentication(format!(
                "{} rejected the refreshed session",
                url
            )));
        }

        info!(url = %url, "Request succeeded after session refresh");
        Ok(retried)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        headers: &[(String, String)],
        cookies: &CookieSet,
    ) -> Result<Response> {
        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !cookies.is_empty() {
            builder = builder.header(COOKIE, cookies.header_value());
        }

        debug!(method = %method, url = %url, "Sending request");
        Ok(builder.send().await?)
    }
}

#[async_trait]
impl Fetcher for SessionClient {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage> {
        let url = self.resolve(request)?;
        let response = self
            .send(request.method.clone(), url, &request.headers)
            .await?;
        check_status(&response)?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await?;

        Ok(FetchedPage { url, status, body })
    }
}

fn check_status(response: &Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(StashError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
