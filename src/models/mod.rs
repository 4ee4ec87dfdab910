use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Domain,
    Rea,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Domain, Source::Rea];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Domain => "domain",
            Source::Rea => "rea",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "domain" => Ok(Source::Domain),
            "rea" | "realestate" => Ok(Source::Rea),
            other => Err(anyhow!("unknown source {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuctionResult {
    Sold,
    PassedIn,
    Withdrawn,
}

impl AuctionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionResult::Sold => "sold",
            AuctionResult::PassedIn => "passed_in",
            AuctionResult::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for AuctionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AuctionResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "sold" => Ok(AuctionResult::Sold),
            "passed_in" | "passed" => Ok(AuctionResult::PassedIn),
            "withdrawn" => Ok(AuctionResult::Withdrawn),
            other => Err(anyhow!("unknown auction result {:?}", other)),
        }
    }
}

/// The eight Australian states and territories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum AustralianState {
    Nsw,
    Vic,
    Qld,
    Wa,
    Sa,
    Tas,
    Act,
    Nt,
}

impl AustralianState {
    pub const ALL: [AustralianState; 8] = [
        AustralianState::Nsw,
        AustralianState::Vic,
        AustralianState::Qld,
        AustralianState::Wa,
        AustralianState::Sa,
        AustralianState::Tas,
        AustralianState::Act,
        AustralianState::Nt,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            AustralianState::Nsw => "NSW",
            AustralianState::Vic => "VIC",
            AustralianState::Qld => "QLD",
            AustralianState::Wa => "WA",
            AustralianState::Sa => "SA",
            AustralianState::Tas => "TAS",
            AustralianState::Act => "ACT",
            AustralianState::Nt => "NT",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            AustralianState::Nsw => "New South Wales",
            AustralianState::Vic => "Victoria",
            AustralianState::Qld => "Queensland",
            AustralianState::Wa => "Western Australia",
            AustralianState::Sa => "South Australia",
            AustralianState::Tas => "Tasmania",
            AustralianState::Act => "Australian Capital Territory",
            AustralianState::Nt => "Northern Territory",
        }
    }
}

impl fmt::Display for AustralianState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

/// Accepts codes ("vic") and full names ("Victoria").
impl FromStr for AustralianState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        AustralianState::ALL
            .into_iter()
            .find(|st| st.code().eq_ignore_ascii_case(s) || st.full_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("unknown state {:?}", s))
    }
}

// ── Auction record ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuctionRecord {
    pub address: String,
    pub suburb: String,
    pub state: AustralianState,
    pub postcode: String,
    pub price: Option<i64>,       // only when sold and disclosed
    pub result: AuctionResult,
    pub auction_date: NaiveDate,
    pub source: Source,
    pub property_type: String,
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<u8>,
    pub car_spaces: Option<u8>,
    pub agent_name: Option<String>,
    pub agency_name: Option<String>,
    pub listing_url: Option<String>,
}

impl AuctionRecord {
    pub fn identity(&self) -> AuctionKey {
        AuctionKey {
            address: self.address.clone(),
            auction_date: self.auction_date,
            source: self.source,
        }
    }

    pub fn stat_key(&self) -> StatKey {
        StatKey {
            suburb: self.suburb.clone(),
            state: self.state,
            date: self.auction_date,
        }
    }
}

/// Identity of an auction record: one row per address, date and source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuctionKey {
    pub address: String,
    pub auction_date: NaiveDate,
    pub source: Source,
}

/// Key of a suburb statistic row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatKey {
    pub suburb: String,
    pub state: AustralianState,
    pub date: NaiveDate,
}

// ── Suburb statistic ──────────────────────────────────────────────────────────

/// Derived per-suburb, per-date figures. Never edited by hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuburbStatistic {
    pub suburb: String,
    pub state: AustralianState,
    pub date: NaiveDate,
    pub total_auctions: u32,
    pub sold_count: u32,
    pub passed_in_count: u32,
    pub withdrawn_count: u32,
    pub clearance_rate: f64,
    pub average_price: Option<f64>,  // None = no sold-with-price data, not zero
    pub median_price: Option<f64>,
}

// ── Run log ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(anyhow!("unknown run status {:?}", other)),
        }
    }
}

/// One row per scrape invocation, written once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLog {
    pub source: Source,
    pub status: RunStatus,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub record_count: usize,
    pub error: Option<String>,
}

// ── Raw extraction output ─────────────────────────────────────────────────────

/// Best-effort fields pulled out of one result container, before
/// normalisation. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    pub address: Option<String>,
    pub price: Option<String>,
    pub result: Option<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<u8>,
    pub bathrooms: Option<u8>,
    pub car_spaces: Option<u8>,
    pub agent_name: Option<String>,
    pub agency_name: Option<String>,
    pub listing_url: Option<String>,
    pub postcode: Option<String>,
    pub state: Option<String>,
    pub price_undisclosed: bool,
}

/// Location a result page belongs to, taken from the suburb link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuburbContext {
    pub suburb: Option<String>,
    pub state: Option<AustralianState>,
    pub postcode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_code_and_name() {
        assert_eq!("vic".parse::<AustralianState>().unwrap(), AustralianState::Vic);
        assert_eq!("New South Wales".parse::<AustralianState>().unwrap(), AustralianState::Nsw);
        assert_eq!(" ACT ".parse::<AustralianState>().unwrap(), AustralianState::Act);
        assert!("XYZ".parse::<AustralianState>().is_err());
    }

    #[test]
    fn test_result_roundtrip_strings() {
        for r in [AuctionResult::Sold, AuctionResult::PassedIn, AuctionResult::Withdrawn] {
            assert_eq!(r.as_str().parse::<AuctionResult>().unwrap(), r);
        }
        assert_eq!("Passed In".parse::<AuctionResult>().unwrap(), AuctionResult::PassedIn);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&AuctionResult::PassedIn).unwrap(), "\"passed_in\"");
        assert_eq!(serde_json::to_string(&AustralianState::Nsw).unwrap(), "\"NSW\"");
        assert_eq!(serde_json::to_string(&Source::Rea).unwrap(), "\"rea\"");
    }
}
