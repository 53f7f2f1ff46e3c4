//! Dedup-aware merge of scraped dividend records into the dividend store.

use std::collections::BTreeSet;

use divscan_core::{CompanyId, DividendEvent, DividendRecord};
use divscan_storage::{DividendStore, InsertOutcome};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub inserted: usize,
    /// Records whose `(company, date)` key was already stored.
    pub skipped: usize,
    /// Records lost to storage errors; a later sweep retries them.
    pub failed: usize,
}

impl MergeStats {
    pub fn absorb(&mut self, other: MergeStats) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Persist the records of `company_id` that the store does not hold yet.
///
/// The per-key existence check only narrows the batch; the store's uniqueness on
/// `(company_id, date)` decides. A failed batch is retried one event at a time so a
/// single bad row costs only itself. Never returns an error: failures are logged and counted.
pub async fn insert_missing(
    store: &dyn DividendStore,
    company_id: CompanyId,
    records: &[DividendRecord],
) -> MergeStats {
    let mut stats = MergeStats::default();
    let mut seen = BTreeSet::new();
    let mut missing = Vec::new();

    for record in records {
        if !seen.insert(record.date) {
            stats.skipped += 1;
            continue;
        }
        match store.exists_by_company_and_date(company_id, record.date).await {
            Ok(true) => stats.skipped += 1,
            Ok(false) => missing.push(record.for_company(company_id)),
            Err(err) => {
                debug!(%company_id, date = %record.date, error = %err, "existence check failed; deferring to insert");
                missing.push(record.for_company(company_id));
            }
        }
    }

    if missing.is_empty() {
        return stats;
    }

    match store.insert_all(&missing).await {
        Ok(inserted) => {
            stats.inserted += inserted;
            stats.skipped += missing.len().saturating_sub(inserted);
        }
        Err(err) => {
            warn!(%company_id, events = missing.len(), error = %err, "batch insert failed; inserting events one by one");
            stats.absorb(insert_each(store, &missing).await);
        }
    }
    stats
}

async fn insert_each(store: &dyn DividendStore, events: &[DividendEvent]) -> MergeStats {
    let mut stats = MergeStats::default();
    for event in events {
        match store.insert(event).await {
            Ok(InsertOutcome::Inserted) => stats.inserted += 1,
            Ok(InsertOutcome::Duplicate) => stats.skipped += 1,
            Err(err) => {
                warn!(
                    company_id = %event.company_id,
                    date = %event.date,
                    error = %err,
                    "failed to store dividend event; skipping"
                );
                stats.failed += 1;
            }
        }
    }
    stats
}
