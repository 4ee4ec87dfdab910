#[cfg(test)]
pub mod memory;
pub mod query;

use crate::models::{
    AuctionRecord, AustralianState, RunLog, StatKey, SuburbStatistic,
};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection, Row};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use self::query::{clamp_page, AuctionQuery, Page, StatQuery};

// ── Persistence port ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// `previous` is the statistic key the row was filed under before the
    /// update. It differs from the record's key when the suburb or state
    /// changed.
    Updated { previous: StatKey },
}

/// Everything the scrape pipeline needs from storage.
pub trait AuctionStore: Send + Sync {
    /// Insert, or update the row with the same (address, auction_date,
    /// source). Suburb, state, price, result and property type take the new
    /// values. Postcode, room counts, agent, agency and listing URL keep the
    /// stored value when the new record has none.
    fn upsert_auction(&self, record: &AuctionRecord) -> Result<UpsertOutcome>;

    /// Every stored record of one (suburb, state, date) key.
    fn auctions_for_key(&self, key: &StatKey) -> Result<Vec<AuctionRecord>>;

    fn upsert_suburb_stat(&self, stat: &SuburbStatistic) -> Result<()>;

    /// Drop the statistic of a key that no longer has any auctions.
    fn remove_suburb_stat(&self, key: &StatKey) -> Result<()>;

    fn append_run_log(&self, log: &RunLog) -> Result<()>;
}

// ── Schema ────────────────────────────────────────────────────────────────────

const SCHEMA_VERSION: i32 = 1;

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS auctions (
    address        VARCHAR   NOT NULL,
    auction_date   DATE      NOT NULL,
    source         VARCHAR   NOT NULL,
    suburb         VARCHAR   NOT NULL,
    state          VARCHAR   NOT NULL,
    postcode       VARCHAR   NOT NULL DEFAULT '',
    -- Only set for disclosed sales
    price          BIGINT,
    result         VARCHAR   NOT NULL,
    property_type  VARCHAR   NOT NULL DEFAULT 'House',
    bedrooms       INTEGER,
    bathrooms      INTEGER,
    car_spaces     INTEGER,
    agent_name     VARCHAR,
    agency_name    VARCHAR,
    listing_url    VARCHAR,
    created_at     TIMESTAMP NOT NULL,
    updated_at     TIMESTAMP NOT NULL,
    PRIMARY KEY (address, auction_date, source)
);

CREATE TABLE IF NOT EXISTS suburb_stats (
    suburb           VARCHAR   NOT NULL,
    state            VARCHAR   NOT NULL,
    date             DATE      NOT NULL,
    total_auctions   INTEGER   NOT NULL,
    sold_count       INTEGER   NOT NULL,
    passed_in_count  INTEGER   NOT NULL,
    withdrawn_count  INTEGER   NOT NULL,
    clearance_rate   DOUBLE    NOT NULL,
    -- NULL when no sale in the set disclosed a price
    average_price    DOUBLE,
    median_price     DOUBLE,
    updated_at       TIMESTAMP NOT NULL,
    PRIMARY KEY (suburb, state, date)
);

CREATE SEQUENCE IF NOT EXISTS run_log_seq START 1;

CREATE TABLE IF NOT EXISTS run_logs (
    id            BIGINT    PRIMARY KEY DEFAULT nextval('run_log_seq'),
    source        VARCHAR   NOT NULL,
    status        VARCHAR   NOT NULL,
    started_at    TIMESTAMP NOT NULL,
    finished_at   TIMESTAMP NOT NULL,
    record_count  BIGINT    NOT NULL DEFAULT 0,
    error         VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_auctions_date   ON auctions (auction_date);
CREATE INDEX IF NOT EXISTS idx_stats_date      ON suburb_stats (date);
"#;

const AUCTION_COLUMNS: &str = "address, suburb, state, postcode, price, result, auction_date, source, \
     property_type, bedrooms, bathrooms, car_spaces, agent_name, agency_name, listing_url";

const STAT_COLUMNS: &str = "suburb, state, date, total_auctions, sold_count, passed_in_count, \
     withdrawn_count, clearance_rate, average_price, median_price";

const RUN_COLUMNS: &str = "source, status, started_at, finished_at, record_count, error";

// ── Row mapping ───────────────────────────────────────────────────────────────

fn parse_col<T>(row: &Row<'_>, idx: usize) -> duckdb::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|e: anyhow::Error| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn small(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<u8>> {
    let v: Option<i32> = row.get(idx)?;
    Ok(v.and_then(|n| u8::try_from(n).ok()))
}

fn auction_from_row(row: &Row<'_>) -> duckdb::Result<AuctionRecord> {
    Ok(AuctionRecord {
        address: row.get(0)?,
        suburb: row.get(1)?,
        state: parse_col(row, 2)?,
        postcode: row.get(3)?,
        price: row.get(4)?,
        result: parse_col(row, 5)?,
        auction_date: row.get(6)?,
        source: parse_col(row, 7)?,
        property_type: row.get(8)?,
        bedrooms: small(row, 9)?,
        bathrooms: small(row, 10)?,
        car_spaces: small(row, 11)?,
        agent_name: row.get(12)?,
        agency_name: row.get(13)?,
        listing_url: row.get(14)?,
    })
}

fn stat_from_row(row: &Row<'_>) -> duckdb::Result<SuburbStatistic> {
    Ok(SuburbStatistic {
        suburb: row.get(0)?,
        state: parse_col(row, 1)?,
        date: row.get(2)?,
        total_auctions: row.get::<_, i32>(3)? as u32,
        sold_count: row.get::<_, i32>(4)? as u32,
        passed_in_count: row.get::<_, i32>(5)? as u32,
        withdrawn_count: row.get::<_, i32>(6)? as u32,
        clearance_rate: row.get(7)?,
        average_price: row.get(8)?,
        median_price: row.get(9)?,
    })
}

fn run_from_row(row: &Row<'_>) -> duckdb::Result<RunLog> {
    Ok(RunLog {
        source: parse_col(row, 0)?,
        status: parse_col(row, 1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        record_count: row.get::<_, i64>(4)? as usize,
        error: row.get(5)?,
    })
}

// ── Summaries ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DbSummary {
    pub auctions: i64,
    pub suburb_stats: i64,
    pub run_logs: i64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub latest_runs: Vec<RunLog>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuburbDetail {
    pub current: SuburbStatistic,
    pub recent_auctions: Vec<AuctionRecord>,
    pub history: Vec<SuburbStatistic>,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("DuckDB connection mutex poisoned"))
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn()?;
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![SCHEMA_VERSION, Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    pub fn schema_version(&self) -> Result<Option<i32>> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT MAX(version) FROM schema_version")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Auctions ──────────────────────────────────────────────────────────────

    pub fn list_auctions(&self, q: &AuctionQuery) -> Result<Page<AuctionRecord>> {
        let (page, limit) = clamp_page(q.page, q.limit);
        let filter = q.filter();
        let conn = self.conn()?;

        let total: i64 = conn
            .prepare(&format!("SELECT COUNT(*) FROM auctions{}", filter.sql()))?
            .query_row(filter.param_refs().as_slice(), |r| r.get(0))
            .context("count auctions")?;

        let sql = format!(
            "SELECT {} FROM auctions{}{} LIMIT {} OFFSET {}",
            AUCTION_COLUMNS,
            filter.sql(),
            q.order_by(),
            limit,
            (page as u64 - 1) * limit as u64
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(filter.param_refs().as_slice(), auction_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("list auctions")?;

        Ok(Page {
            items,
            total: total as u64,
            page,
            limit,
        })
    }

    /// Every record matching the filters, in sort order. Paging is ignored.
    pub fn all_auctions(&self, q: &AuctionQuery) -> Result<Vec<AuctionRecord>> {
        let filter = q.filter();
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM auctions{}{}", AUCTION_COLUMNS, filter.sql(), q.order_by());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(filter.param_refs().as_slice(), auction_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("select auctions")?;
        Ok(rows)
    }

    pub fn auction_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM auctions")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT MIN(auction_date), MAX(auction_date) FROM auctions")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Suburb statistics ─────────────────────────────────────────────────────

    pub fn list_suburb_stats(&self, q: &StatQuery) -> Result<Page<SuburbStatistic>> {
        let (page, limit) = clamp_page(q.page, q.limit);
        let filter = q.filter();
        let conn = self.conn()?;

        let total: i64 = conn
            .prepare(&format!("SELECT COUNT(*) FROM suburb_stats{}", filter.sql()))?
            .query_row(filter.param_refs().as_slice(), |r| r.get(0))
            .context("count suburb stats")?;

        let sql = format!(
            "SELECT {} FROM suburb_stats{}{} LIMIT {} OFFSET {}",
            STAT_COLUMNS,
            filter.sql(),
            q.order_by(),
            limit,
            (page as u64 - 1) * limit as u64
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(filter.param_refs().as_slice(), stat_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("list suburb stats")?;

        Ok(Page {
            items,
            total: total as u64,
            page,
            limit,
        })
    }

    /// Statistics between two dates (inclusive), oldest first. `suburb` is an
    /// exact match.
    pub fn stats_between(
        &self,
        suburb: Option<&str>,
        state: Option<AustralianState>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SuburbStatistic>> {
        let mut filter = query::Filter::default();
        filter.push("date >= ?", from);
        filter.push("date <= ?", to);
        if let Some(s) = suburb {
            filter.push("suburb = ?", s.to_string());
        }
        if let Some(st) = state {
            filter.push("state = ?", st.code().to_string());
        }

        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM suburb_stats{} ORDER BY date ASC, suburb ASC", STAT_COLUMNS, filter.sql());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(filter.param_refs().as_slice(), stat_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("select stats for trends")?;
        Ok(rows)
    }

    /// Latest statistic, 20 most recent auctions and 12 most recent
    /// statistics of one suburb. `None` when the suburb has no statistics.
    pub fn suburb_detail(&self, suburb: &str, state: Option<AustralianState>) -> Result<Option<SuburbDetail>> {
        let mut filter = query::Filter::default();
        filter.push("suburb = ?", suburb.to_string());
        if let Some(st) = state {
            filter.push("state = ?", st.code().to_string());
        }

        let conn = self.conn()?;
        let history = conn
            .prepare(&format!(
                "SELECT {} FROM suburb_stats{} ORDER BY date DESC LIMIT 12",
                STAT_COLUMNS,
                filter.sql()
            ))?
            .query_map(filter.param_refs().as_slice(), stat_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("suburb history")?;

        let Some(current) = history.first().cloned() else {
            return Ok(None);
        };

        let recent_auctions = conn
            .prepare(&format!(
                "SELECT {} FROM auctions{} ORDER BY auction_date DESC, address ASC LIMIT 20",
                AUCTION_COLUMNS,
                filter.sql()
            ))?
            .query_map(filter.param_refs().as_slice(), auction_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("suburb auctions")?;

        Ok(Some(SuburbDetail {
            current,
            recent_auctions,
            history,
        }))
    }

    pub fn stat_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM suburb_stats")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Run logs ──────────────────────────────────────────────────────────────

    /// Most recent run of each source.
    pub fn latest_runs(&self) -> Result<Vec<RunLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM run_logs \
             QUALIFY row_number() OVER (PARTITION BY source ORDER BY id DESC) = 1 \
             ORDER BY source",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map([], run_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("latest runs")?;
        Ok(runs)
    }

    pub fn run_log_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM run_logs")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn summary(&self) -> Result<DbSummary> {
        let (first_date, last_date) = self.date_range()?;
        Ok(DbSummary {
            auctions: self.auction_count()?,
            suburb_stats: self.stat_count()?,
            run_logs: self.run_log_count()?,
            first_date,
            last_date,
            latest_runs: self.latest_runs()?,
        })
    }
}

impl AuctionStore for Repository {
    fn upsert_auction(&self, r: &AuctionRecord) -> Result<UpsertOutcome> {
        let conn = self.conn()?;
        let now = Utc::now().naive_utc();

        let previous = conn
            .prepare("SELECT suburb, state FROM auctions WHERE address = ? AND auction_date = ? AND source = ?")?
            .query_map(params![r.address, r.auction_date, r.source.as_str()], |row| {
                Ok(StatKey {
                    suburb: row.get(0)?,
                    state: parse_col(row, 1)?,
                    date: r.auction_date,
                })
            })?
            .next()
            .transpose()
            .context("look up stored auction")?;

        conn.execute(
            r#"INSERT INTO auctions
                   (address, auction_date, source, suburb, state, postcode, price, result,
                    property_type, bedrooms, bathrooms, car_spaces,
                    agent_name, agency_name, listing_url, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (address, auction_date, source) DO UPDATE SET
                   suburb        = excluded.suburb,
                   state         = excluded.state,
                   postcode      = CASE WHEN excluded.postcode = '' THEN auctions.postcode
                                        ELSE excluded.postcode END,
                   price         = excluded.price,
                   result        = excluded.result,
                   property_type = excluded.property_type,
                   bedrooms      = COALESCE(excluded.bedrooms,    auctions.bedrooms),
                   bathrooms     = COALESCE(excluded.bathrooms,   auctions.bathrooms),
                   car_spaces    = COALESCE(excluded.car_spaces,  auctions.car_spaces),
                   agent_name    = COALESCE(excluded.agent_name,  auctions.agent_name),
                   agency_name   = COALESCE(excluded.agency_name, auctions.agency_name),
                   listing_url   = COALESCE(excluded.listing_url, auctions.listing_url),
                   updated_at    = excluded.updated_at"#,
            params![
                r.address,
                r.auction_date,
                r.source.as_str(),
                r.suburb,
                r.state.code(),
                r.postcode,
                r.price,
                r.result.as_str(),
                r.property_type,
                r.bedrooms.map(i32::from),
                r.bathrooms.map(i32::from),
                r.car_spaces.map(i32::from),
                r.agent_name,
                r.agency_name,
                r.listing_url,
                now,
                now,
            ],
        )
        .with_context(|| format!("upsert auction {} {}", r.address, r.auction_date))?;

        Ok(match previous {
            Some(previous) => UpsertOutcome::Updated { previous },
            None => UpsertOutcome::Inserted,
        })
    }

    fn auctions_for_key(&self, key: &StatKey) -> Result<Vec<AuctionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM auctions WHERE suburb = ? AND state = ? AND auction_date = ?",
            AUCTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![key.suburb, key.state.code(), key.date], auction_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()
            .with_context(|| format!("auctions for {} {} {}", key.suburb, key.state, key.date))?;
        Ok(rows)
    }

    fn upsert_suburb_stat(&self, s: &SuburbStatistic) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO suburb_stats
                   (suburb, state, date, total_auctions, sold_count, passed_in_count,
                    withdrawn_count, clearance_rate, average_price, median_price, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (suburb, state, date) DO UPDATE SET
                   total_auctions  = excluded.total_auctions,
                   sold_count      = excluded.sold_count,
                   passed_in_count = excluded.passed_in_count,
                   withdrawn_count = excluded.withdrawn_count,
                   clearance_rate  = excluded.clearance_rate,
                   average_price   = excluded.average_price,
                   median_price    = excluded.median_price,
                   updated_at      = excluded.updated_at"#,
            params![
                s.suburb,
                s.state.code(),
                s.date,
                s.total_auctions as i32,
                s.sold_count as i32,
                s.passed_in_count as i32,
                s.withdrawn_count as i32,
                s.clearance_rate,
                s.average_price,
                s.median_price,
                Utc::now().naive_utc(),
            ],
        )
        .with_context(|| format!("upsert suburb stat {} {} {}", s.suburb, s.state, s.date))?;
        Ok(())
    }

    fn remove_suburb_stat(&self, key: &StatKey) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM suburb_stats WHERE suburb = ? AND state = ? AND date = ?",
            params![key.suburb, key.state.code(), key.date],
        )
        .with_context(|| format!("remove suburb stat {} {} {}", key.suburb, key.state, key.date))?;
        Ok(())
    }

    fn append_run_log(&self, log: &RunLog) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO run_logs (source, status, started_at, finished_at, record_count, error)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                log.source.as_str(),
                log.status.as_str(),
                log.started_at,
                log.finished_at,
                log.record_count as i64,
                log.error,
            ],
        )
        .context("append run log")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuctionResult, RunStatus, Source};
    use crate::pipeline::upsert::persist_records;
    use crate::storage::query::{AuctionSort, SortOrder, StatSort};

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn record(address: &str, suburb: &str, result: AuctionResult, price: Option<i64>) -> AuctionRecord {
        AuctionRecord {
            address: address.into(),
            suburb: suburb.into(),
            state: AustralianState::Vic,
            postcode: "3065".into(),
            price,
            result,
            auction_date: d(13),
            source: Source::Domain,
            property_type: "House".into(),
            bedrooms: Some(3),
            bathrooms: None,
            car_spaces: None,
            agent_name: Some("Jane Smith".into()),
            agency_name: None,
            listing_url: None,
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let repo = repo();
        repo.run_migrations().unwrap();
        assert_eq!(repo.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_double_upsert_keeps_one_row() {
        let repo = repo();
        let first = record("12 Brunswick Street", "Fitzroy", AuctionResult::PassedIn, None);
        assert_eq!(repo.upsert_auction(&first).unwrap(), UpsertOutcome::Inserted);

        let mut second = first.clone();
        second.result = AuctionResult::Sold;
        second.price = Some(1_050_000);
        second.bedrooms = None;
        second.agency_name = Some("Nelson Alexander Real Estate".into());
        assert_eq!(
            repo.upsert_auction(&second).unwrap(),
            UpsertOutcome::Updated { previous: first.stat_key() }
        );

        assert_eq!(repo.auction_count().unwrap(), 1);
        let stored = repo.auctions_for_key(&first.stat_key()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].result, AuctionResult::Sold);
        assert_eq!(stored[0].price, Some(1_050_000));
        // Missing on the second scrape: earlier value kept
        assert_eq!(stored[0].bedrooms, Some(3));
        assert_eq!(stored[0].agency_name.as_deref(), Some("Nelson Alexander Real Estate"));
    }

    #[test]
    fn test_suburb_correction_moves_the_statistic() {
        let repo = repo();
        let mut unknown = record("12 Brunswick Street", "Unknown", AuctionResult::Sold, Some(900_000));
        unknown.postcode = String::new();
        persist_records(&repo, std::slice::from_ref(&unknown), 100);

        let fitzroy = record("12 Brunswick Street", "Fitzroy", AuctionResult::Sold, Some(900_000));
        let summary = persist_records(&repo, std::slice::from_ref(&fitzroy), 100);
        assert_eq!(summary.updated, 1);

        let stored = repo.auctions_for_key(&fitzroy.stat_key()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].postcode, "3065");
        assert!(repo.auctions_for_key(&unknown.stat_key()).unwrap().is_empty());

        let stats = repo.list_suburb_stats(&StatQuery::default()).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.items[0].suburb, "Fitzroy");
        assert_eq!(stats.items[0].total_auctions, 1);

        // An empty postcode does not wipe the stored one
        let mut again = fitzroy.clone();
        again.postcode = String::new();
        repo.upsert_auction(&again).unwrap();
        assert_eq!(repo.auctions_for_key(&fitzroy.stat_key()).unwrap()[0].postcode, "3065");
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        let repo = repo();
        repo.upsert_auction(&record("1 George St", "Fitzroy", AuctionResult::Sold, Some(900_000))).unwrap();
        repo.upsert_auction(&record("2 Under_Score Lane", "Fitzroy", AuctionResult::Sold, Some(900_000))).unwrap();

        let search = |term: &str| {
            repo.list_auctions(&AuctionQuery {
                search: Some(term.into()),
                ..Default::default()
            })
            .unwrap()
            .total
        };
        assert_eq!(search("_"), 1);
        assert_eq!(search("%"), 0);
        assert_eq!(search("george"), 1);
    }

    #[test]
    fn test_sort_by_agency() {
        let repo = repo();
        let mut a = record("1 George St", "Fitzroy", AuctionResult::Sold, Some(900_000));
        a.agency_name = Some("Nelson Alexander".into());
        let mut b = record("2 George St", "Fitzroy", AuctionResult::Sold, Some(900_000));
        b.agency_name = Some("Jellis Craig".into());
        repo.upsert_auction(&a).unwrap();
        repo.upsert_auction(&b).unwrap();

        let page = repo
            .list_auctions(&AuctionQuery {
                sort: AuctionSort::AgencyName,
                order: SortOrder::Asc,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.items[0].agency_name.as_deref(), Some("Jellis Craig"));
    }

    #[test]
    fn test_same_address_other_source_is_separate() {
        let repo = repo();
        let domain = record("12 Brunswick Street", "Fitzroy", AuctionResult::Sold, Some(900_000));
        let mut rea = domain.clone();
        rea.source = Source::Rea;
        repo.upsert_auction(&domain).unwrap();
        repo.upsert_auction(&rea).unwrap();
        assert_eq!(repo.auction_count().unwrap(), 2);
    }

    #[test]
    fn test_list_auctions_filters_and_pages() {
        let repo = repo();
        repo.upsert_auction(&record("1 George St", "Fitzroy", AuctionResult::Sold, Some(900_000))).unwrap();
        repo.upsert_auction(&record("2 George St", "Fitzroy", AuctionResult::Sold, Some(1_500_000))).unwrap();
        repo.upsert_auction(&record("3 King St", "Richmond", AuctionResult::PassedIn, None)).unwrap();

        let sold = repo
            .list_auctions(&AuctionQuery {
                result: Some(AuctionResult::Sold),
                sort: AuctionSort::Price,
                order: SortOrder::Desc,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sold.total, 2);
        assert_eq!(sold.items[0].price, Some(1_500_000));

        let search = repo
            .list_auctions(&AuctionQuery {
                search: Some("RICH".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(search.total, 1);
        assert_eq!(search.items[0].address, "3 King St");

        let by_agent = repo
            .list_auctions(&AuctionQuery {
                search: Some("jane".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_agent.total, 3);

        let priced = repo
            .list_auctions(&AuctionQuery {
                min_price: Some(1_000_000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(priced.total, 1);

        let paged = repo
            .list_auctions(&AuctionQuery {
                sort: AuctionSort::Address,
                order: SortOrder::Asc,
                page: 2,
                limit: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.items[0].address, "3 King St");
        assert_eq!(paged.total_pages(), 2);
    }

    #[test]
    fn test_suburb_stats_upsert_and_list() {
        let repo = repo();
        let mut stat = SuburbStatistic {
            suburb: "Fitzroy".into(),
            state: AustralianState::Vic,
            date: d(13),
            total_auctions: 2,
            sold_count: 1,
            passed_in_count: 1,
            withdrawn_count: 0,
            clearance_rate: 50.0,
            average_price: None,
            median_price: None,
        };
        repo.upsert_suburb_stat(&stat).unwrap();
        stat.sold_count = 2;
        stat.passed_in_count = 0;
        stat.clearance_rate = 100.0;
        stat.average_price = Some(1_000_000.0);
        repo.upsert_suburb_stat(&stat).unwrap();

        let page = repo
            .list_suburb_stats(&StatQuery {
                state: Some(AustralianState::Vic),
                sort: StatSort::ClearanceRate,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0], stat);

        let trend = repo.stats_between(Some("Fitzroy"), None, d(1), d(31)).unwrap();
        assert_eq!(trend.len(), 1);
        assert!(repo.stats_between(Some("Fitz"), None, d(1), d(31)).unwrap().is_empty());

        let detail = repo.suburb_detail("Fitzroy", Some(AustralianState::Vic)).unwrap().unwrap();
        assert_eq!(detail.current.clearance_rate, 100.0);
        assert!(repo.suburb_detail("Nowhere", None).unwrap().is_none());
    }

    #[test]
    fn test_run_logs_latest_per_source() {
        let repo = repo();
        let at = |h: u32| d(13).and_hms_opt(h, 0, 0).unwrap();
        let log = |source, status, h, err: Option<&str>| RunLog {
            source,
            status,
            started_at: at(h),
            finished_at: at(h + 1),
            record_count: if err.is_some() { 0 } else { 10 },
            error: err.map(str::to_string),
        };

        repo.append_run_log(&log(Source::Domain, RunStatus::Success, 1, None)).unwrap();
        repo.append_run_log(&log(Source::Domain, RunStatus::Failed, 3, Some("all 6 regions failed"))).unwrap();
        repo.append_run_log(&log(Source::Rea, RunStatus::Success, 2, None)).unwrap();

        let latest = repo.latest_runs().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].source, Source::Domain);
        assert_eq!(latest[0].status, RunStatus::Failed);
        assert_eq!(latest[0].error.as_deref(), Some("all 6 regions failed"));
        assert_eq!(latest[1].record_count, 10);

        let summary = repo.summary().unwrap();
        assert_eq!(summary.run_logs, 3);
        assert_eq!(summary.auctions, 0);
        assert_eq!(summary.first_date, None);
    }
}
