//! In-memory `AuctionStore` for pipeline tests. Merges updates the same way
//! the DuckDB repository does.

use anyhow::{anyhow, Result};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use super::{AuctionStore, UpsertOutcome};
use crate::models::{AuctionKey, AuctionRecord, RunLog, StatKey, SuburbStatistic};

#[derive(Default)]
pub struct MemoryStore {
    pub auctions: Mutex<HashMap<AuctionKey, AuctionRecord>>,
    pub stats: Mutex<BTreeMap<StatKey, SuburbStatistic>>,
    pub runs: Mutex<Vec<RunLog>>,
    /// Addresses whose upsert fails.
    pub reject: HashSet<String>,
}

impl MemoryStore {
    pub fn rejecting(addresses: &[&str]) -> Self {
        Self {
            reject: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn auction_count(&self) -> usize {
        self.auctions.lock().unwrap().len()
    }

    pub fn stat(&self, key: &StatKey) -> Option<SuburbStatistic> {
        self.stats.lock().unwrap().get(key).cloned()
    }

    pub fn runs(&self) -> Vec<RunLog> {
        self.runs.lock().unwrap().clone()
    }
}

impl AuctionStore for MemoryStore {
    fn upsert_auction(&self, record: &AuctionRecord) -> Result<UpsertOutcome> {
        if self.reject.contains(&record.address) {
            return Err(anyhow!("constraint violation for {}", record.address));
        }
        let mut auctions = self.auctions.lock().unwrap();
        let stored = match auctions.entry(record.identity()) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                return Ok(UpsertOutcome::Inserted);
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        let previous = stored.stat_key();
        let mut merged = record.clone();
        if merged.postcode.is_empty() {
            merged.postcode = stored.postcode.clone();
        }
        merged.bedrooms = merged.bedrooms.or(stored.bedrooms);
        merged.bathrooms = merged.bathrooms.or(stored.bathrooms);
        merged.car_spaces = merged.car_spaces.or(stored.car_spaces);
        merged.agent_name = merged.agent_name.or(stored.agent_name.take());
        merged.agency_name = merged.agency_name.or(stored.agency_name.take());
        merged.listing_url = merged.listing_url.or(stored.listing_url.take());
        *stored = merged;
        Ok(UpsertOutcome::Updated { previous })
    }

    fn auctions_for_key(&self, key: &StatKey) -> Result<Vec<AuctionRecord>> {
        Ok(self
            .auctions
            .lock()
            .unwrap()
            .values()
            .filter(|r| &r.stat_key() == key)
            .cloned()
            .collect())
    }

    fn upsert_suburb_stat(&self, stat: &SuburbStatistic) -> Result<()> {
        let key = StatKey {
            suburb: stat.suburb.clone(),
            state: stat.state,
            date: stat.date,
        };
        self.stats.lock().unwrap().insert(key, stat.clone());
        Ok(())
    }

    fn remove_suburb_stat(&self, key: &StatKey) -> Result<()> {
        self.stats.lock().unwrap().remove(key);
        Ok(())
    }

    fn append_run_log(&self, log: &RunLog) -> Result<()> {
        self.runs.lock().unwrap().push(log.clone());
        Ok(())
    }
}
