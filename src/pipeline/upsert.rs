//! Batched upsert with per-record isolation and statistic refresh.

use anyhow::Result;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::models::{AuctionRecord, StatKey, SuburbStatistic};
use crate::stats::compute_statistic;
use crate::storage::{AuctionStore, UpsertOutcome};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistSummary {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub stats_refreshed: usize,
}

impl PersistSummary {
    pub fn stored(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Upsert `records` in batches. A record that fails is logged and skipped;
/// after each batch the statistic of every key the batch touched is
/// rebuilt from all stored records of that key. A row that moved to another
/// suburb touches both its old and new key.
pub fn persist_records(store: &dyn AuctionStore, records: &[AuctionRecord], batch_size: usize) -> PersistSummary {
    let mut summary = PersistSummary::default();

    for (n, batch) in records.chunks(batch_size.max(1)).enumerate() {
        let mut touched = BTreeSet::new();

        for record in batch {
            match store.upsert_auction(record) {
                Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
                Ok(UpsertOutcome::Updated { previous }) => {
                    summary.updated += 1;
                    touched.insert(previous);
                }
                Err(e) => {
                    warn!("Skipping {} ({}): {:#}", record.address, record.suburb, e);
                    summary.failed += 1;
                    continue;
                }
            }
            touched.insert(record.stat_key());
        }

        for key in &touched {
            match refresh_statistic(store, key) {
                Ok(_) => summary.stats_refreshed += 1,
                Err(e) => warn!("Statistic {} {} {}: {:#}", key.suburb, key.state, key.date, e),
            }
        }
        debug!("Batch {}: {} records, {} keys", n + 1, batch.len(), touched.len());
    }

    summary
}

/// Recompute and store one suburb statistic from the stored records. A key
/// with no records left loses its statistic and yields `None`.
pub fn refresh_statistic(store: &dyn AuctionStore, key: &StatKey) -> Result<Option<SuburbStatistic>> {
    let records = store.auctions_for_key(key)?;
    if records.is_empty() {
        store.remove_suburb_stat(key)?;
        return Ok(None);
    }
    let stat = compute_statistic(key, &records);
    store.upsert_suburb_stat(&stat)?;
    Ok(Some(stat))
}
