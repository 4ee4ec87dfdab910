mod config;
mod error;
mod export;
mod models;
mod pipeline;
mod scraper;
mod stats;
mod storage;
mod utils;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::models::{AuctionRecord, AuctionResult, AustralianState, RunLog, RunStatus, Source, SuburbContext};
use crate::pipeline::{Pipeline, SourceSelection};
use crate::scraper::sites::SiteProfile;
use crate::scraper::SavedPage;
use crate::stats::{overall_stats, weekly_trends, TrendPeriod};
use crate::storage::query::{AuctionQuery, AuctionSort, SortOrder, StatQuery, StatSort};
use crate::storage::Repository;
use crate::utils::{fmt_number, fmt_percent, fmt_price};

#[derive(Parser)]
#[command(name = "auction-results", about = "Australian auction results scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape auction results and store them
    Scrape {
        /// domain, rea or all
        #[arg(short, long, default_value = "all")]
        source: SourceSelection,

        /// Auction date to record (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Parse a saved results page without touching the network
    Extract {
        file: PathBuf,

        #[arg(short, long, default_value = "domain")]
        source: Source,

        /// URL the page was saved from; suburb, state and postcode are read from it
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        suburb: Option<String>,

        #[arg(long)]
        state: Option<AustralianState>,

        #[arg(long)]
        postcode: Option<String>,

        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Store the records and write a run log
        #[arg(long)]
        persist: bool,

        #[arg(long)]
        json: bool,
    },

    /// List stored auctions
    Auctions {
        #[command(flatten)]
        filter: AuctionFilter,

        #[arg(long, default_value = "auction_date")]
        sort: AuctionSort,

        #[arg(long, default_value = "desc")]
        order: SortOrder,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long)]
        json: bool,
    },

    /// List suburb statistics
    Suburbs {
        #[arg(long)]
        state: Option<AustralianState>,

        #[arg(long)]
        date: Option<NaiveDate>,

        /// Partial suburb name
        #[arg(long)]
        suburb: Option<String>,

        #[arg(long, default_value = "suburb")]
        sort: StatSort,

        #[arg(long, default_value = "asc")]
        order: SortOrder,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long)]
        json: bool,
    },

    /// Latest statistic, recent auctions and history of one suburb
    Suburb {
        name: String,

        #[arg(long)]
        state: Option<AustralianState>,

        #[arg(long)]
        json: bool,
    },

    /// Weekly clearance rate and price trends
    Trends {
        /// Exact suburb name
        #[arg(long)]
        suburb: Option<String>,

        #[arg(long)]
        state: Option<AustralianState>,

        /// 4weeks, 12weeks, 6months or 1year
        #[arg(long, default_value = "12weeks")]
        period: TrendPeriod,

        /// Last day of the period (default: today)
        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Write filtered auctions to a CSV file
    Export {
        #[arg(short, long, default_value = "data/auctions.csv")]
        out: PathBuf,

        #[command(flatten)]
        filter: AuctionFilter,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations
    Migrate,
}

#[derive(Args)]
struct AuctionFilter {
    /// Address, suburb, agent or agency contains this text
    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    state: Option<AustralianState>,

    #[arg(long)]
    result: Option<AuctionResult>,

    #[arg(long = "type")]
    property_type: Option<String>,

    #[arg(long)]
    suburb: Option<String>,

    #[arg(long)]
    from: Option<NaiveDate>,

    #[arg(long)]
    to: Option<NaiveDate>,

    #[arg(long)]
    min_price: Option<i64>,

    #[arg(long)]
    max_price: Option<i64>,
}

impl AuctionFilter {
    fn into_query(self) -> AuctionQuery {
        AuctionQuery {
            search: self.search,
            state: self.state,
            result: self.result,
            property_type: self.property_type,
            suburb: self.suburb,
            date_from: self.from,
            date_to: self.to,
            min_price: self.min_price,
            max_price: self.max_price,
            ..Default::default()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "auction_results=info,warn",
        1 => "auction_results=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape { source, date } => {
            let _t = utils::Timer::start("Scrape");
            let date = date.unwrap_or_else(today);
            let repo = open_for_writing(&config)?;
            let fetcher = scraper::default_fetcher(&config.scraper).context("Failed to build page fetcher")?;

            let logs = Pipeline::new(config, repo).run(source, date, fetcher).await;
            print_runs(&logs);
            if logs.iter().any(|l| l.status == RunStatus::Failed) {
                std::process::exit(1);
            }
        }

        Command::Extract {
            file,
            source,
            url,
            suburb,
            state,
            postcode,
            date,
            persist,
            json,
        } => {
            let html = std::fs::read_to_string(&file).with_context(|| format!("Cannot read {:?}", file))?;
            let profile = SiteProfile::for_source(source)?;
            let url = url.unwrap_or_else(|| profile.base_url.to_string());
            let page = SavedPage::new(profile, html, &url).with_context(SuburbContext { suburb, state, postcode });
            let date = date.unwrap_or_else(today);

            if persist {
                let repo = open_for_writing(&config)?;
                let log = Pipeline::new(config, repo).run_with(&page, date).await;
                print_runs(std::slice::from_ref(&log));
                if log.status == RunStatus::Failed {
                    std::process::exit(1);
                }
            } else {
                let parsed = page.parse(date);
                info!(
                    "{} candidates via {}, {} records, {} dropped",
                    parsed.candidates,
                    parsed.strategy.as_deref().unwrap_or("none"),
                    parsed.records.len(),
                    parsed.dropped
                );
                if json {
                    println!("{}", serde_json::to_string_pretty(&parsed.records)?);
                } else {
                    print_auctions(&parsed.records);
                }
            }
        }

        Command::Auctions {
            filter,
            sort,
            order,
            page,
            limit,
            json,
        } => {
            let repo = open_repo(&config)?;
            let query = AuctionQuery {
                sort,
                order,
                page,
                limit,
                ..filter.into_query()
            };
            let result = repo.list_auctions(&query)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_auctions(&result.items);
                println!(
                    "Page {} of {} ({} auctions)",
                    result.page,
                    result.total_pages(),
                    fmt_number(result.total as i64)
                );
            }
        }

        Command::Suburbs {
            state,
            date,
            suburb,
            sort,
            order,
            page,
            limit,
            json,
        } => {
            let repo = open_repo(&config)?;
            let query = StatQuery {
                state,
                date,
                suburb,
                sort,
                order,
                page,
                limit,
            };
            let result = repo.list_suburb_stats(&query)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{:<24} {:<5} {:<10} {:>5} {:>5} {:>9} {:>14} {:>14}",
                    "Suburb", "State", "Date", "Total", "Sold", "Clearance", "Average", "Median"
                );
                for s in &result.items {
                    println!(
                        "{:<24} {:<5} {:<10} {:>5} {:>5} {:>9} {:>14} {:>14}",
                        s.suburb,
                        s.state,
                        s.date,
                        s.total_auctions,
                        s.sold_count,
                        fmt_percent(s.clearance_rate),
                        fmt_price(s.average_price),
                        fmt_price(s.median_price)
                    );
                }
                println!("Page {} of {} ({} rows)", result.page, result.total_pages(), result.total);
            }
        }

        Command::Suburb { name, state, json } => {
            let repo = open_repo(&config)?;
            let Some(detail) = repo.suburb_detail(&name, state)? else {
                println!("No statistics for {}.", name);
                return Ok(());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                let c = &detail.current;
                println!("{} {} — {}", c.suburb, c.state, c.date);
                println!(
                    "  {} auctions | {} sold | {} passed in | {} withdrawn",
                    c.total_auctions, c.sold_count, c.passed_in_count, c.withdrawn_count
                );
                println!(
                    "  Clearance {} | Average {} | Median {}",
                    fmt_percent(c.clearance_rate),
                    fmt_price(c.average_price),
                    fmt_price(c.median_price)
                );
                println!("History:");
                for s in &detail.history {
                    println!("  {}  {:>7}  {:>3} auctions", s.date, fmt_percent(s.clearance_rate), s.total_auctions);
                }
                println!("Recent auctions:");
                print_auctions(&detail.recent_auctions);
            }
        }

        Command::Trends {
            suburb,
            state,
            period,
            to,
            json,
        } => {
            let repo = open_repo(&config)?;
            let end = to.unwrap_or_else(today);
            let stats = repo.stats_between(suburb.as_deref(), state, period.start_date(end), end)?;
            let weeks = weekly_trends(&stats);
            let overall = overall_stats(&stats);

            if json {
                let body = serde_json::json!({
                    "period": period.as_str(),
                    "trends": weeks,
                    "overall": overall,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{:<12} {:>6} {:>6} {:>10} {:>14}", "Week of", "Total", "Sold", "Clearance", "Average");
                for w in &weeks {
                    println!(
                        "{:<12} {:>6} {:>6} {:>10} {:>14}",
                        w.week.to_string(),
                        w.total_auctions,
                        w.sold_count,
                        fmt_percent(w.clearance_rate),
                        fmt_price(w.average_price)
                    );
                }
                println!(
                    "{}: {} auctions, {} sold, clearance {}, average {}",
                    period,
                    fmt_number(overall.total_auctions as i64),
                    fmt_number(overall.total_sold as i64),
                    fmt_percent(overall.clearance_rate),
                    fmt_price(overall.average_price)
                );
            }
        }

        Command::Export { out, filter } => {
            let _t = utils::Timer::start("CSV export");
            let repo = open_repo(&config)?;
            let records = repo.all_auctions(&filter.into_query())?;
            let n = export::export_to_path(&records, &out)?;
            println!("Exported {} auctions to {:?}", fmt_number(n as i64), out);
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let summary = repo.summary()?;
            println!("─────────────────────────────────");
            println!("  Auction results — Database Stats");
            println!("─────────────────────────────────");
            println!("  Auctions       : {}", fmt_number(summary.auctions));
            println!("  Suburb stats   : {}", fmt_number(summary.suburb_stats));
            println!("  Run logs       : {}", fmt_number(summary.run_logs));
            println!("  From           : {}", summary.first_date.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  To             : {}", summary.last_date.map(|d| d.to_string()).unwrap_or("—".into()));
            for run in &summary.latest_runs {
                println!(
                    "  Last {:<8} : {} at {} ({} records)",
                    run.source,
                    run.status.as_str(),
                    run.finished_at.format("%Y-%m-%d %H:%M"),
                    run.record_count
                );
            }
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            println!("Migrations applied (schema v{}).", repo.schema_version()?.unwrap_or(0));
        }
    }

    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Opens the database, creating the schema first when migrations are enabled.
fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path).context("Failed to open DuckDB")?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

fn open_for_writing(config: &AppConfig) -> Result<Arc<Repository>> {
    Ok(Arc::new(open_repo(config)?))
}

fn print_runs(logs: &[RunLog]) {
    for log in logs {
        match &log.error {
            None => println!("{:<7} {} ({} records)", log.source, log.status.as_str(), log.record_count),
            Some(e) => println!("{:<7} {}: {}", log.source, log.status.as_str(), e),
        }
    }
}

fn print_auctions(records: &[AuctionRecord]) {
    if records.is_empty() {
        println!("No auctions.");
        return;
    }
    for r in records {
        println!(
            "{}  {:<40} {:<18} {:<4} {:<10} {:>12}  {}",
            r.auction_date,
            r.address,
            r.suburb,
            r.state,
            r.result,
            fmt_price(r.price.map(|p| p as f64)),
            r.property_type
        );
    }
}
