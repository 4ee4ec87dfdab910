//! Listing queries: filters, whitelisted sort columns and pagination.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use duckdb::ToSql;
use serde::Serialize;
use std::str::FromStr;

use crate::models::{AuctionResult, AustralianState};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(anyhow!("sort order must be asc or desc, got {:?}", other)),
        }
    }
}

// ── Auctions ──────────────────────────────────────────────────────────────────

/// Columns an auction listing may be sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuctionSort {
    #[default]
    AuctionDate,
    Price,
    Address,
    Suburb,
    State,
    Result,
    PropertyType,
    Bedrooms,
    Bathrooms,
    CarSpaces,
    Postcode,
    AgentName,
    AgencyName,
    Source,
}

impl AuctionSort {
    pub fn column(&self) -> &'static str {
        match self {
            AuctionSort::AuctionDate => "auction_date",
            AuctionSort::Price => "price",
            AuctionSort::Address => "address",
            AuctionSort::Suburb => "suburb",
            AuctionSort::State => "state",
            AuctionSort::Result => "result",
            AuctionSort::PropertyType => "property_type",
            AuctionSort::Bedrooms => "bedrooms",
            AuctionSort::Bathrooms => "bathrooms",
            AuctionSort::CarSpaces => "car_spaces",
            AuctionSort::Postcode => "postcode",
            AuctionSort::AgentName => "agent_name",
            AuctionSort::AgencyName => "agency_name",
            AuctionSort::Source => "source",
        }
    }
}

impl FromStr for AuctionSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "auction_date" | "date" => Ok(AuctionSort::AuctionDate),
            "price" => Ok(AuctionSort::Price),
            "address" => Ok(AuctionSort::Address),
            "suburb" => Ok(AuctionSort::Suburb),
            "state" => Ok(AuctionSort::State),
            "result" => Ok(AuctionSort::Result),
            "property_type" | "type" => Ok(AuctionSort::PropertyType),
            "bedrooms" | "beds" => Ok(AuctionSort::Bedrooms),
            "bathrooms" | "baths" => Ok(AuctionSort::Bathrooms),
            "car_spaces" | "cars" => Ok(AuctionSort::CarSpaces),
            "postcode" => Ok(AuctionSort::Postcode),
            "agent_name" | "agent" => Ok(AuctionSort::AgentName),
            "agency_name" | "agency" => Ok(AuctionSort::AgencyName),
            "source" => Ok(AuctionSort::Source),
            other => Err(anyhow!("cannot sort auctions by {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuctionQuery {
    /// Case-insensitive substring of address, suburb, agent or agency.
    pub search: Option<String>,
    pub state: Option<AustralianState>,
    pub result: Option<AuctionResult>,
    /// Partial match.
    pub property_type: Option<String>,
    /// Partial match.
    pub suburb: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub sort: AuctionSort,
    pub order: SortOrder,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

/// `WHERE` clause and its bound values, built in step.
#[derive(Default)]
pub struct Filter {
    clauses: Vec<String>,
    pub params: Vec<Box<dyn ToSql>>,
}

impl Filter {
    pub fn push(&mut self, clause: &str, value: impl ToSql + 'static) {
        self.clauses.push(clause.to_string());
        self.params.push(Box::new(value));
    }

    pub fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn param_refs(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

/// `%term%` with LIKE wildcards in `term` matched literally. Pair with
/// `ESCAPE '\'`.
fn like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for ch in term.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("%{}%", escaped)
}

impl AuctionQuery {
    pub fn filter(&self) -> Filter {
        let mut f = Filter::default();

        if let Some(term) = self.search.as_deref().filter(|t| !t.trim().is_empty()) {
            let pattern = like(term);
            f.clauses.push(
                "(address ILIKE ? ESCAPE '\\' OR suburb ILIKE ? ESCAPE '\\' \
                 OR agent_name ILIKE ? ESCAPE '\\' OR agency_name ILIKE ? ESCAPE '\\')".to_string(),
            );
            for _ in 0..4 {
                f.params.push(Box::new(pattern.clone()));
            }
        }
        if let Some(state) = self.state {
            f.push("state = ?", state.code().to_string());
        }
        if let Some(result) = self.result {
            f.push("result = ?", result.as_str().to_string());
        }
        if let Some(t) = self.property_type.as_deref() {
            f.push(r"property_type ILIKE ? ESCAPE '\'", like(t));
        }
        if let Some(s) = self.suburb.as_deref() {
            f.push(r"suburb ILIKE ? ESCAPE '\'", like(s));
        }
        if let Some(d) = self.date_from {
            f.push("auction_date >= ?", d);
        }
        if let Some(d) = self.date_to {
            f.push("auction_date <= ?", d);
        }
        if let Some(p) = self.min_price {
            f.push("price >= ?", p);
        }
        if let Some(p) = self.max_price {
            f.push("price <= ?", p);
        }
        f
    }

    pub fn order_by(&self) -> String {
        format!(
            " ORDER BY {} {} NULLS LAST, address ASC",
            self.sort.column(),
            self.order.sql()
        )
    }
}

// ── Suburb statistics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatSort {
    #[default]
    Suburb,
    State,
    Date,
    TotalAuctions,
    ClearanceRate,
    AveragePrice,
    MedianPrice,
}

impl StatSort {
    pub fn column(&self) -> &'static str {
        match self {
            StatSort::Suburb => "suburb",
            StatSort::State => "state",
            StatSort::Date => "date",
            StatSort::TotalAuctions => "total_auctions",
            StatSort::ClearanceRate => "clearance_rate",
            StatSort::AveragePrice => "average_price",
            StatSort::MedianPrice => "median_price",
        }
    }
}

impl FromStr for StatSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "suburb" => Ok(StatSort::Suburb),
            "state" => Ok(StatSort::State),
            "date" => Ok(StatSort::Date),
            "total_auctions" | "total" => Ok(StatSort::TotalAuctions),
            "clearance_rate" | "clearance" => Ok(StatSort::ClearanceRate),
            "average_price" => Ok(StatSort::AveragePrice),
            "median_price" => Ok(StatSort::MedianPrice),
            other => Err(anyhow!("cannot sort suburb statistics by {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatQuery {
    pub state: Option<AustralianState>,
    pub date: Option<NaiveDate>,
    /// Partial match.
    pub suburb: Option<String>,
    pub sort: StatSort,
    pub order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl StatQuery {
    pub fn filter(&self) -> Filter {
        let mut f = Filter::default();
        if let Some(state) = self.state {
            f.push("state = ?", state.code().to_string());
        }
        if let Some(d) = self.date {
            f.push("date = ?", d);
        }
        if let Some(s) = self.suburb.as_deref() {
            f.push(r"suburb ILIKE ? ESCAPE '\'", like(s));
        }
        f
    }

    pub fn order_by(&self) -> String {
        format!(
            " ORDER BY {} {} NULLS LAST, suburb ASC, date DESC",
            self.sort.column(),
            self.order.sql()
        )
    }
}

// ── Paging ────────────────────────────────────────────────────────────────────

/// (page, limit) clamped to sane values: page ≥ 1, 1 ≤ limit ≤ MAX_PAGE_SIZE.
pub fn clamp_page(page: u32, limit: u32) -> (u32, u32) {
    let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit.min(MAX_PAGE_SIZE) };
    (page.max(1), limit)
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.total.div_ceil(self.limit as u64)
        }
    }
}
