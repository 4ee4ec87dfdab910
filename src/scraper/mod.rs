#[cfg(feature = "browser")]
pub mod browser;
pub mod cleaner;
pub mod extractor;
pub mod http_client;
pub mod locator;
pub mod parsers;
pub mod patterns;
pub mod retry;
pub mod sites;

use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::models::{AuctionRecord, Source, SuburbContext};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use self::parsers::{
    context_from_url, detect_challenge, parse_region_page, parse_results_page, ResultsPage, SuburbLink,
};
use self::retry::{with_retry, RetryPolicy};
use self::sites::{Region, SiteProfile};

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Loads one page and returns its HTML. Implementations that render
/// JavaScript wait for `wait_for` to appear before returning.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, wait_for: Option<&str>) -> Result<String>;
}

/// A site that can produce one day's auction results.
#[async_trait]
pub trait AuctionSource: Send + Sync {
    fn source(&self) -> Source;
    async fn scrape(&self, auction_date: NaiveDate) -> Result<ScrapeOutcome>;
}

/// HTTP by default, headless Chrome with `--features browser`.
pub fn default_fetcher(config: &ScraperConfig) -> Result<Arc<dyn PageFetcher>> {
    #[cfg(feature = "browser")]
    {
        Ok(Arc::new(browser::BrowserFetcher::launch(config)?))
    }
    #[cfg(not(feature = "browser"))]
    {
        Ok(Arc::new(http_client::HttpClient::new(config)?))
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub records: Vec<AuctionRecord>,
    pub regions: usize,
    pub failed_regions: usize,
    pub suburbs: usize,
    pub pages: usize,
    /// Suburbs or regions given up on after an error.
    pub errors: usize,
}

impl ScrapeOutcome {
    fn merge(&mut self, other: ScrapeOutcome) {
        self.records.extend(other.records);
        self.regions += other.regions;
        self.failed_regions += other.failed_regions;
        self.suburbs += other.suburbs;
        self.pages += other.pages;
        self.errors += other.errors;
    }
}

// ── Site scraper ──────────────────────────────────────────────────────────────

enum Fetched {
    Page(String),
    Challenge(String),
}

/// Region → suburb → result pages for one site profile.
#[derive(Clone)]
pub struct SiteScraper {
    profile: Arc<SiteProfile>,
    fetcher: Arc<dyn PageFetcher>,
    config: ScraperConfig,
    retry: RetryPolicy,
    concurrency: usize,
}

impl SiteScraper {
    pub fn new(
        profile: SiteProfile,
        fetcher: Arc<dyn PageFetcher>,
        config: &ScraperConfig,
        concurrency: usize,
    ) -> Self {
        Self {
            profile: Arc::new(profile),
            fetcher,
            config: config.clone(),
            retry: RetryPolicy::from_config(config),
            concurrency: concurrency.max(1),
        }
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter = if self.config.jitter_ms > 0 {
            rand::random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let total = self.config.request_delay_ms + jitter;
        if total > 0 {
            sleep(Duration::from_millis(total)).await;
        }
    }

    async fn fetch_with_retry(&self, url: &str, wait_for: &str) -> Result<String> {
        with_retry(self.retry, &format!("load {}", url), || async move {
            self.polite_delay().await;
            self.fetcher.fetch(url, Some(wait_for)).await
        })
        .await
    }

    /// Load a page, backing off once when a challenge page comes back.
    /// `None` means the site kept blocking us; the page is skipped.
    pub async fn load(&self, url: &str, wait_for: &str) -> Result<Option<String>> {
        let reason = match self.fetch_checked(url, wait_for).await? {
            Fetched::Page(html) => return Ok(Some(html)),
            Fetched::Challenge(reason) => reason,
        };

        warn!(
            "{}: challenge page ({}), backing off {}ms",
            url, reason, self.config.blocked_backoff_ms
        );
        sleep(Duration::from_millis(self.config.blocked_backoff_ms)).await;

        match self.fetch_checked(url, wait_for).await? {
            Fetched::Page(html) => Ok(Some(html)),
            Fetched::Challenge(reason) => {
                warn!("{}: still challenged ({}), skipping page", url, reason);
                Ok(None)
            }
        }
    }

    /// A challenge can arrive as a normal page or as a `Blocked` error
    /// raised for a 401/403 status.
    async fn fetch_checked(&self, url: &str, wait_for: &str) -> Result<Fetched> {
        match self.fetch_with_retry(url, wait_for).await {
            Ok(html) => Ok(match detect_challenge(&html) {
                Some(phrase) => Fetched::Challenge(format!("{:?}", phrase)),
                None => Fetched::Page(html),
            }),
            Err(e) => match e.downcast_ref::<ScrapeError>() {
                Some(ScrapeError::Blocked(detail)) => Ok(Fetched::Challenge(detail.clone())),
                _ => Err(e),
            },
        }
    }

    /// Every suburb linked from one region page, up to the configured limit.
    /// A failing suburb is logged and skipped.
    pub async fn scrape_region(&self, region: &Region, auction_date: NaiveDate) -> Result<ScrapeOutcome> {
        let mut outcome = ScrapeOutcome {
            regions: 1,
            ..Default::default()
        };

        let html = self
            .load(&region.url, &self.profile.region_ready)
            .await
            .with_context(|| format!("region page {}", region.name))?;
        let Some(html) = html else {
            return Ok(outcome);
        };

        let mut links = parse_region_page(&self.profile, &html, region);
        if links.len() > self.config.max_suburbs_per_region {
            debug!(
                "{}: keeping {} of {} suburbs",
                region.name,
                self.config.max_suburbs_per_region,
                links.len()
            );
            links.truncate(self.config.max_suburbs_per_region);
        }
        info!("{} {}: {} suburbs", self.profile.source, region.name, links.len());

        for link in &links {
            match self.scrape_suburb(link, auction_date).await {
                Ok((records, pages)) => {
                    outcome.suburbs += 1;
                    outcome.pages += pages;
                    outcome.records.extend(records);
                }
                Err(e) => {
                    warn!("{} {}: {:#}", region.name, link.name, e);
                    outcome.errors += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Result pages of one suburb, following "next" links. Returns the
    /// records and the number of pages read.
    pub async fn scrape_suburb(
        &self,
        link: &SuburbLink,
        auction_date: NaiveDate,
    ) -> Result<(Vec<AuctionRecord>, usize)> {
        let mut url = link.url.clone();
        let mut visited = HashSet::new();
        let mut records = Vec::new();
        let mut pages = 0usize;

        while visited.insert(url.clone()) {
            let html = match self.load(&url, &self.profile.results_ready).await {
                Ok(Some(html)) => html,
                Ok(None) => break,
                Err(e) if pages == 0 => return Err(e.context(format!("suburb {}", link.name))),
                Err(e) => {
                    warn!("{} page {}: {:#}", link.name, pages + 1, e);
                    break;
                }
            };
            pages += 1;

            let page = parse_results_page(&self.profile, &html, &url, &link.ctx, auction_date);
            debug!("{} page {}: {} records", link.name, pages, page.records.len());
            records.extend(page.records);

            match page.next_url {
                Some(next) if pages < self.config.max_pages_per_suburb as usize => url = next,
                _ => break,
            }
        }

        Ok((records, pages))
    }
}

#[async_trait]
impl AuctionSource for SiteScraper {
    fn source(&self) -> Source {
        self.profile.source
    }

    /// Fan out over regions, `concurrency` at a time. Errors stay inside
    /// their region unless every region fails.
    async fn scrape(&self, auction_date: NaiveDate) -> Result<ScrapeOutcome> {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for region in self.profile.regions.iter().cloned() {
            let this = self.clone();
            let sem = Arc::clone(&sem);
            let name = region.name.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;
                this.scrape_region(&region, auction_date).await
            });
            handles.push((name, handle));
        }

        let total = handles.len();
        let mut outcome = ScrapeOutcome::default();
        let mut last_err = None;

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(region)) => outcome.merge(region),
                Ok(Err(e)) => {
                    warn!("{} {}: {:#}", self.profile.source, name, e);
                    outcome.regions += 1;
                    outcome.failed_regions += 1;
                    outcome.errors += 1;
                    last_err = Some(e);
                }
                Err(e) => {
                    error!("Task panic for {}: {}", name, e);
                    return Err(anyhow!("region task {} panicked: {}", name, e));
                }
            }
        }

        if total > 0 && outcome.failed_regions == total {
            if let Some(e) = last_err {
                return Err(e.context(format!("all {} regions failed", total)));
            }
        }

        info!(
            "{}: {} records from {} suburbs ({} pages, {} errors)",
            self.profile.source,
            outcome.records.len(),
            outcome.suburbs,
            outcome.pages,
            outcome.errors
        );
        Ok(outcome)
    }
}

// ── Saved page ────────────────────────────────────────────────────────────────

/// One results page saved to disk, read without touching the network.
pub struct SavedPage {
    profile: SiteProfile,
    html: String,
    url: String,
    ctx: SuburbContext,
}

impl SavedPage {
    /// Suburb, state and postcode come from `url` when it has the site's
    /// suburb shape.
    pub fn new(profile: SiteProfile, html: String, url: &str) -> Self {
        let ctx = context_from_url(&profile, url).unwrap_or_default();
        Self {
            profile,
            html,
            url: url.to_string(),
            ctx,
        }
    }

    /// Fill in whatever the URL did not provide.
    pub fn with_context(mut self, ctx: SuburbContext) -> Self {
        self.ctx = SuburbContext {
            suburb: self.ctx.suburb.or(ctx.suburb),
            state: self.ctx.state.or(ctx.state),
            postcode: self.ctx.postcode.or(ctx.postcode),
        };
        self
    }

    pub fn parse(&self, auction_date: NaiveDate) -> ResultsPage {
        parse_results_page(&self.profile, &self.html, &self.url, &self.ctx, auction_date)
    }
}

#[async_trait]
impl AuctionSource for SavedPage {
    fn source(&self) -> Source {
        self.profile.source
    }

    async fn scrape(&self, auction_date: NaiveDate) -> Result<ScrapeOutcome> {
        if let Some(phrase) = detect_challenge(&self.html) {
            return Err(ScrapeError::Blocked(format!("{} ({:?})", self.url, phrase)).into());
        }
        let page = self.parse(auction_date);
        Ok(ScrapeOutcome {
            records: page.records,
            pages: 1,
            ..Default::default()
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
