//! Scrape run orchestration: source → records → store → run log.
//!
//! Each run walks `idle → navigating → extracting → persisting → logged`
//! and always ends with exactly one `RunLog` row, success or failed.
//! Sources run as separate tasks; one source failing does not stop the
//! other.

pub mod upsert;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::models::{AuctionRecord, RunLog, RunStatus, Source};
use crate::scraper::sites::SiteProfile;
use crate::scraper::{AuctionSource, PageFetcher, SiteScraper};
use crate::storage::AuctionStore;

use self::upsert::{persist_records, PersistSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Navigating,
    Extracting,
    Persisting,
    Logged,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Idle => "idle",
            RunPhase::Navigating => "navigating",
            RunPhase::Extracting => "extracting",
            RunPhase::Persisting => "persisting",
            RunPhase::Logged => "logged",
        })
    }
}

/// Which sources a `scrape` covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceSelection {
    One(Source),
    #[default]
    All,
}

impl SourceSelection {
    pub fn sources(&self) -> Vec<Source> {
        match self {
            SourceSelection::One(s) => vec![*s],
            SourceSelection::All => Source::ALL.to_vec(),
        }
    }
}

impl FromStr for SourceSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(SourceSelection::All);
        }
        s.parse::<Source>()
            .map(SourceSelection::One)
            .map_err(|_| anyhow!("source must be domain, rea or all, got {:?}", s))
    }
}

/// Phase of one run, logged on every change.
struct RunState {
    source: Source,
    phase: RunPhase,
}

impl RunState {
    fn new(source: Source) -> Self {
        Self {
            source,
            phase: RunPhase::Idle,
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!("{}: {} → {}", self.source, self.phase, phase);
        self.phase = phase;
    }
}

#[derive(Clone)]
pub struct Pipeline {
    config: AppConfig,
    store: Arc<dyn AuctionStore>,
}

impl Pipeline {
    pub fn new(config: AppConfig, store: Arc<dyn AuctionStore>) -> Self {
        Self { config, store }
    }

    /// Scrape every selected source for `auction_date`. Returns one log per
    /// source, in source order.
    pub async fn run(
        &self,
        selection: SourceSelection,
        auction_date: NaiveDate,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Vec<RunLog> {
        let mut handles = Vec::new();
        for source in selection.sources() {
            let pipeline = self.clone();
            let fetcher = Arc::clone(&fetcher);
            let started_at = Utc::now().naive_utc();
            let handle =
                tokio::spawn(async move { pipeline.run_source(source, auction_date, fetcher).await });
            handles.push((source, started_at, handle));
        }

        let mut logs = Vec::new();
        for (source, started_at, handle) in handles {
            match handle.await {
                Ok(log) => logs.push(log),
                Err(e) => {
                    error!("Task panic for {}: {}", source, e);
                    let log = failed_log(source, started_at, &anyhow!("task panicked: {}", e));
                    self.record(&log);
                    logs.push(log);
                }
            }
        }
        logs
    }

    /// One source with the configured site profile.
    pub async fn run_source(
        &self,
        source: Source,
        auction_date: NaiveDate,
        fetcher: Arc<dyn PageFetcher>,
    ) -> RunLog {
        let started_at = Utc::now().naive_utc();
        match SiteProfile::for_source(source) {
            Ok(profile) => {
                let scraper = SiteScraper::new(
                    profile,
                    fetcher,
                    &self.config.scraper,
                    self.config.pipeline.concurrency,
                );
                self.run_with(&scraper, auction_date).await
            }
            Err(e) => {
                error!("{}: {:#}", source, e);
                let log = failed_log(source, started_at, &e);
                self.record(&log);
                log
            }
        }
    }

    /// Run any `AuctionSource` through extraction, persistence and logging.
    pub async fn run_with(&self, source: &dyn AuctionSource, auction_date: NaiveDate) -> RunLog {
        let started_at = Utc::now().naive_utc();
        let mut state = RunState::new(source.source());

        let log = match self.execute(source, auction_date, &mut state).await {
            Ok(summary) => {
                info!(
                    "=== {}: {} inserted | {} updated | {} failed | {} statistics ===",
                    source.source(),
                    summary.inserted,
                    summary.updated,
                    summary.failed,
                    summary.stats_refreshed
                );
                RunLog {
                    source: source.source(),
                    status: RunStatus::Success,
                    started_at,
                    finished_at: Utc::now().naive_utc(),
                    record_count: summary.stored(),
                    error: None,
                }
            }
            Err(e) => {
                error!("{} run failed: {:#}", source.source(), e);
                failed_log(source.source(), started_at, &e)
            }
        };

        self.record(&log);
        state.enter(RunPhase::Logged);
        state.enter(RunPhase::Idle);
        log
    }

    async fn execute(
        &self,
        source: &dyn AuctionSource,
        auction_date: NaiveDate,
        state: &mut RunState,
    ) -> Result<PersistSummary> {
        state.enter(RunPhase::Navigating);
        let outcome = source
            .scrape(auction_date)
            .await
            .with_context(|| format!("{} scrape", source.source()))?;
        info!(
            "{}: {} records from {} pages ({} suburbs, {} errors)",
            source.source(),
            outcome.records.len(),
            outcome.pages,
            outcome.suburbs,
            outcome.errors
        );

        state.enter(RunPhase::Extracting);
        let scraped = outcome.records.len();
        let records = dedupe(outcome.records);
        if records.len() < scraped {
            warn!("{}: {} duplicate records dropped", source.source(), scraped - records.len());
        }

        state.enter(RunPhase::Persisting);
        let summary = persist_records(self.store.as_ref(), &records, self.config.pipeline.batch_size);
        if !records.is_empty() && summary.stored() == 0 {
            bail!("none of {} records could be stored", records.len());
        }
        Ok(summary)
    }

    fn record(&self, log: &RunLog) {
        if let Err(e) = self.store.append_run_log(log) {
            error!("Could not write run log for {}: {:#}", log.source, e);
        }
    }
}

fn failed_log(source: Source, started_at: chrono::NaiveDateTime, e: &anyhow::Error) -> RunLog {
    RunLog {
        source,
        status: RunStatus::Failed,
        started_at,
        finished_at: Utc::now().naive_utc(),
        record_count: 0,
        error: Some(format!("{:#}", e)),
    }
}

/// One record per identity key; a later page wins over an earlier one.
fn dedupe(records: Vec<AuctionRecord>) -> Vec<AuctionRecord> {
    let mut index = HashMap::new();
    let mut out: Vec<AuctionRecord> = Vec::with_capacity(records.len());
    for record in records {
        match index.get(&record.identity()) {
            Some(&i) => out[i] = record,
            None => {
                index.insert(record.identity(), out.len());
                out.push(record);
            }
        }
    }
    out
}
