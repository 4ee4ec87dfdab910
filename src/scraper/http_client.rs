use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;
use tracing::debug;

use super::parsers::detect_challenge;
use super::PageFetcher;

/// Plain HTTP fetcher. Pages are taken as served; nothing is rendered, so
/// `wait_for` is ignored.
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-AU,en;q=0.9"));

        let timeout = Duration::from_secs(config.timeout_secs);
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner, timeout })
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> ScrapeError {
        if e.is_timeout() {
            ScrapeError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ScrapeError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str, _wait_for: Option<&str>) -> Result<String> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            // Rate limited or upstream trouble: worth another attempt
            return Err(ScrapeError::Network {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            }
            .into());
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            // Bot walls answer with a challenge page and an error status
            let body = resp.text().await.unwrap_or_default();
            if let Some(phrase) = detect_challenge(&body) {
                return Err(ScrapeError::Blocked(format!("{} (HTTP {}, {:?})", url, status.as_u16(), phrase)).into());
            }
            return Err(ScrapeError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let body = resp.text().await.map_err(|e| self.classify(url, e))?;
        Ok(body)
    }
}
