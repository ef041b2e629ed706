use crate::config::HttpConfig;
use crate::error::{Result, ScraperError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};
use reqwest::{redirect, StatusCode};
use std::time::Duration;
use tracing::debug;

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Browser-looking HTTP client shared by the source adapters.
#[derive(Clone)]
pub struct SourceClient {
    client: reqwest::Client,
    request_delay: Duration,
}

impl SourceClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect::Policy::limited(config.max_redirects))
            .gzip(true)
            .build()?;

        Ok(Self { client, request_delay: Duration::from_millis(config.request_delay_ms) })
    }

    /// GET a page and return its body; non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScraperError::Api { message: format!("GET {} returned {}", url, status) });
        }
        Ok(resp.text().await?)
    }

    /// HEAD request; only a plain 200 counts as reachable.
    pub async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }

    /// Pause between requests to the same site.
    pub async fn polite_delay(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }
}

impl std::fmt::Debug for SourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceClient").field("request_delay", &self.request_delay).finish()
    }
}
