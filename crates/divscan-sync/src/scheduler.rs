//! Scheduled ingestion sweeps: evict the finance cache, walk the catalog one company
//! at a time, merge newly scraped dividends, pause between companies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use divscan_adapters::FinanceSource;
use divscan_core::{Company, FINANCE_CACHE_NAMESPACE};
use divscan_storage::{CompanyCatalog, DividendStore, ResultCache};
use serde::Serialize;
use tokio::sync::watch;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::merge::{insert_missing, MergeStats};

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub companies_total: usize,
    pub companies_processed: usize,
    pub companies_failed: usize,
    pub companies_empty: usize,
    /// Deleted from the catalog while the sweep was running.
    pub companies_removed: usize,
    pub events_inserted: usize,
    pub events_skipped: usize,
    pub storage_failures: usize,
    pub cache_evicted: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub enum SweepTrigger {
    Completed(SweepSummary),
    /// Another sweep was still running; this trigger was dropped.
    Skipped,
}

enum CompanyOutcome {
    Merged(MergeStats),
    Empty,
    Removed,
    Failed,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct IngestionScheduler {
    catalog: Arc<dyn CompanyCatalog>,
    dividends: Arc<dyn DividendStore>,
    cache: Arc<dyn ResultCache>,
    source: Arc<dyn FinanceSource>,
    pause: Duration,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl IngestionScheduler {
    pub fn new(
        catalog: Arc<dyn CompanyCatalog>,
        dividends: Arc<dyn DividendStore>,
        cache: Arc<dyn ResultCache>,
        source: Arc<dyn FinanceSource>,
        pause: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            catalog,
            dividends,
            cache,
            source,
            pause,
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop sweeping: interrupts the inter-company pause, lets the current company finish.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Run one sweep unless one is already in flight.
    pub async fn trigger(&self) -> SweepTrigger {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("sweep already running; dropping trigger");
            return SweepTrigger::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        let run_id = Uuid::new_v4();
        let summary = self
            .sweep(run_id)
            .instrument(info_span!("sweep", %run_id))
            .await;
        info!(
            companies_total = summary.companies_total,
            companies_processed = summary.companies_processed,
            companies_failed = summary.companies_failed,
            companies_empty = summary.companies_empty,
            companies_removed = summary.companies_removed,
            events_inserted = summary.events_inserted,
            events_skipped = summary.events_skipped,
            storage_failures = summary.storage_failures,
            cancelled = summary.cancelled,
            "sweep finished"
        );
        SweepTrigger::Completed(summary)
    }

    async fn sweep(&self, run_id: Uuid) -> SweepSummary {
        let mut summary = SweepSummary {
            run_id,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            companies_total: 0,
            companies_processed: 0,
            companies_failed: 0,
            companies_empty: 0,
            companies_removed: 0,
            events_inserted: 0,
            events_skipped: 0,
            storage_failures: 0,
            cache_evicted: 0,
            cancelled: false,
        };

        match self.cache.evict_namespace(FINANCE_CACHE_NAMESPACE).await {
            Ok(evicted) => summary.cache_evicted = evicted,
            Err(err) => error!(error = %err, "failed to evict finance cache"),
        }

        let companies = match self.catalog.list_all().await {
            Ok(companies) => companies,
            Err(err) => {
                error!(error = %err, "failed to list companies; abandoning sweep");
                summary.finished_at = Utc::now();
                return summary;
            }
        };
        summary.companies_total = companies.len();
        info!(companies = companies.len(), "sweep started");

        let mut shutdown = self.shutdown.subscribe();
        for (position, company) in companies.iter().enumerate() {
            if *shutdown.borrow() {
                summary.cancelled = true;
                break;
            }

            match self.ingest_company(company).await {
                CompanyOutcome::Merged(stats) => {
                    summary.companies_processed += 1;
                    summary.events_inserted += stats.inserted;
                    summary.events_skipped += stats.skipped;
                    summary.storage_failures += stats.failed;
                }
                CompanyOutcome::Empty => summary.companies_empty += 1,
                CompanyOutcome::Removed => summary.companies_removed += 1,
                CompanyOutcome::Failed => summary.companies_failed += 1,
            }

            let is_last = position + 1 == companies.len();
            if !is_last && !self.pause_or_shutdown(&mut shutdown).await {
                summary.cancelled = true;
                break;
            }
        }

        summary.finished_at = Utc::now();
        summary
    }

    async fn ingest_company(&self, company: &Company) -> CompanyOutcome {
        let Some(company_id) = company.id else {
            warn!(ticker = %company.ticker, "catalog returned a company without id; skipping");
            return CompanyOutcome::Failed;
        };
        info!(ticker = %company.ticker, name = %company.name, "scraping dividends");

        let scraped = match self.source.scrap(company).await {
            Ok(scraped) => scraped,
            Err(err) => {
                warn!(
                    ticker = %company.ticker,
                    transient = err.is_transient(),
                    error = %err,
                    "scrape failed; skipping company this sweep"
                );
                return CompanyOutcome::Failed;
            }
        };
        if scraped.dividends.is_empty() {
            warn!(ticker = %company.ticker, "source returned no dividends; skipping company");
            return CompanyOutcome::Empty;
        }

        // The catalog snapshot is as old as the sweep; skip companies deleted since.
        match self.catalog.find_by_ticker(&company.ticker).await {
            Ok(Some(current)) if current.id == Some(company_id) => {}
            Ok(_) => {
                info!(ticker = %company.ticker, "company deleted during sweep; discarding scrape");
                return CompanyOutcome::Removed;
            }
            Err(err) => warn!(
                ticker = %company.ticker,
                error = %err,
                "catalog re-check failed; merging anyway"
            ),
        }

        let stats = insert_missing(self.dividends.as_ref(), company_id, &scraped.dividends).await;
        info!(
            ticker = %company.ticker,
            inserted = stats.inserted,
            skipped = stats.skipped,
            failed = stats.failed,
            "dividends merged"
        );
        CompanyOutcome::Merged(stats)
    }

    /// Sleep for the configured pause. Returns false when shutdown cut it short.
    async fn pause_or_shutdown(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if !self.pause.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.pause) => {}
                _ = shutdown.wait_for(|stop| *stop) => return false,
            }
        }
        !*shutdown.borrow()
    }

    /// Register a cron job that triggers a sweep on every firing and start the scheduler.
    pub async fn start_cron(self: &Arc<Self>, cron: &str) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let scheduler = Arc::clone(self);
        let job = Job::new_async(cron, move |_uuid, _lock| {
            let scheduler = Arc::clone(&scheduler);
            Box::pin(async move {
                if scheduler.is_shut_down() {
                    return;
                }
                scheduler.trigger().await;
            })
        })
        .with_context(|| format!("creating sweep job for cron {cron}"))?;
        sched.add(job).await.context("adding sweep job")?;
        sched.start().await.context("starting scheduler")?;
        info!(cron, "sweep scheduler started");
        Ok(sched)
    }
}
