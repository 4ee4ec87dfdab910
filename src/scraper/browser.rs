//! Headless Chrome fetcher for pages that only render their results with
//! JavaScript. Built with `--features browser`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::PageFetcher;
use crate::config::ScraperConfig;
use crate::error::ScrapeError;

/// One browser process shared by every page load of a run.
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    timeout: Duration,
    user_agent: String,
}

/// Closes the tab on every exit path.
struct TabGuard(Arc<Tab>);

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close(true) {
            debug!("Tab close failed: {:#}", e);
        }
    }
}

impl BrowserFetcher {
    pub fn launch(config: &ScraperConfig) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(config.timeout_secs * 10))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser: Arc::new(browser),
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
        })
    }
}

fn load_blocking(
    browser: &Browser,
    url: &str,
    wait_for: Option<&str>,
    timeout: Duration,
    user_agent: &str,
) -> Result<String> {
    let tab = TabGuard(browser.new_tab().context("Failed to open tab")?);
    tab.0.set_default_timeout(timeout);
    tab.0
        .set_user_agent(user_agent, Some("en-AU,en;q=0.9"), None)
        .context("Failed to set user agent")?;

    tab.0
        .navigate_to(url)
        .and_then(|t| t.wait_until_navigated())
        .map_err(|e| ScrapeError::Network {
            url: url.to_string(),
            reason: format!("{:#}", e),
        })?;

    if let Some(selector) = wait_for {
        tab.0
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|_| ScrapeError::ElementNotFound {
                url: url.to_string(),
                selector: selector.to_string(),
            })?;
    }

    tab.0.get_content().context("Failed to read page content")
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, wait_for: Option<&str>) -> Result<String> {
        debug!("Rendering {}", url);

        let browser = Arc::clone(&self.browser);
        let target = url.to_string();
        let wait_for = wait_for.map(str::to_string);
        let timeout = self.timeout;
        let user_agent = self.user_agent.clone();

        let task = tokio::task::spawn_blocking(move || {
            load_blocking(&browser, &target, wait_for.as_deref(), timeout, &user_agent)
        });

        // Navigation and the selector wait each get `timeout`
        match tokio::time::timeout(timeout * 2, task).await {
            Err(_) => Err(ScrapeError::Timeout {
                url: url.to_string(),
                timeout_ms: (timeout * 2).as_millis() as u64,
            }
            .into()),
            Ok(joined) => joined.context("Browser page task panicked")?,
        }
    }
}
