//! Suburb statistics and weekly trends. Pure functions over stored data.

use anyhow::{anyhow, Result};
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::models::{AuctionRecord, AuctionResult, StatKey, SuburbStatistic};

// ── Per-suburb statistic ──────────────────────────────────────────────────────

/// Figures for one (suburb, state, date) key from every record of that key.
pub fn compute_statistic(key: &StatKey, records: &[AuctionRecord]) -> SuburbStatistic {
    let count = |r: AuctionResult| records.iter().filter(|rec| rec.result == r).count() as u32;

    let total_auctions = records.len() as u32;
    let sold_count = count(AuctionResult::Sold);

    let sold_prices: Vec<i64> = records
        .iter()
        .filter(|r| r.result == AuctionResult::Sold)
        .filter_map(|r| r.price)
        .filter(|p| *p > 0)
        .collect();

    SuburbStatistic {
        suburb: key.suburb.clone(),
        state: key.state,
        date: key.date,
        total_auctions,
        sold_count,
        passed_in_count: count(AuctionResult::PassedIn),
        withdrawn_count: count(AuctionResult::Withdrawn),
        clearance_rate: clearance_rate(sold_count as u64, total_auctions as u64),
        average_price: average(&sold_prices),
        median_price: median(&sold_prices),
    }
}

/// sold / total × 100, 0 for an empty set.
pub fn clearance_rate(sold: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        sold as f64 / total as f64 * 100.0
    }
}

pub fn average(prices: &[i64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    Some(prices.iter().sum::<i64>() as f64 / prices.len() as f64)
}

/// Middle value; mean of the two middle values for an even count.
pub fn median(prices: &[i64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}

// ── Trends ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrendPeriod {
    FourWeeks,
    #[default]
    TwelveWeeks,
    SixMonths,
    OneYear,
}

impl TrendPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendPeriod::FourWeeks => "4weeks",
            TrendPeriod::TwelveWeeks => "12weeks",
            TrendPeriod::SixMonths => "6months",
            TrendPeriod::OneYear => "1year",
        }
    }

    /// First day covered when the period ends on `end`.
    pub fn start_date(&self, end: NaiveDate) -> NaiveDate {
        let start = match self {
            TrendPeriod::FourWeeks => end.checked_sub_days(Days::new(28)),
            TrendPeriod::TwelveWeeks => end.checked_sub_days(Days::new(84)),
            TrendPeriod::SixMonths => end.checked_sub_months(Months::new(6)),
            TrendPeriod::OneYear => end.checked_sub_months(Months::new(12)),
        };
        start.unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for TrendPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendPeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "4weeks" => Ok(TrendPeriod::FourWeeks),
            "12weeks" => Ok(TrendPeriod::TwelveWeeks),
            "6months" => Ok(TrendPeriod::SixMonths),
            "1year" => Ok(TrendPeriod::OneYear),
            other => Err(anyhow!("unknown period {:?} (4weeks, 12weeks, 6months, 1year)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyTrend {
    /// Monday of the week.
    pub week: NaiveDate,
    pub total_auctions: u32,
    pub sold_count: u32,
    pub clearance_rate: f64,
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStats {
    pub total_auctions: u64,
    pub total_sold: u64,
    pub clearance_rate: f64,
    pub average_price: Option<f64>,
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_monday() as u64;
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// Running totals behind a sold-weighted average price.
#[derive(Default)]
struct Accumulator {
    total: u64,
    sold: u64,
    value: f64,
    priced_sold: u64,
}

impl Accumulator {
    fn add(&mut self, s: &SuburbStatistic) {
        self.total += s.total_auctions as u64;
        self.sold += s.sold_count as u64;
        if let Some(avg) = s.average_price.filter(|_| s.sold_count > 0) {
            self.value += avg * s.sold_count as f64;
            self.priced_sold += s.sold_count as u64;
        }
    }

    fn average_price(&self) -> Option<f64> {
        (self.priced_sold > 0).then(|| self.value / self.priced_sold as f64)
    }
}

/// Statistics grouped by the Monday of their week, oldest week first.
pub fn weekly_trends(stats: &[SuburbStatistic]) -> Vec<WeeklyTrend> {
    let mut weeks: BTreeMap<NaiveDate, Accumulator> = BTreeMap::new();
    for s in stats {
        weeks.entry(week_start(s.date)).or_default().add(s);
    }

    weeks
        .into_iter()
        .map(|(week, acc)| WeeklyTrend {
            week,
            total_auctions: acc.total as u32,
            sold_count: acc.sold as u32,
            clearance_rate: clearance_rate(acc.sold, acc.total),
            average_price: acc.average_price(),
        })
        .collect()
}

pub fn overall_stats(stats: &[SuburbStatistic]) -> OverallStats {
    let mut acc = Accumulator::default();
    stats.iter().for_each(|s| acc.add(s));

    OverallStats {
        total_auctions: acc.total,
        total_sold: acc.sold,
        clearance_rate: clearance_rate(acc.sold, acc.total),
        average_price: acc.average_price(),
    }
}
