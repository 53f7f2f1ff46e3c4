//! Ingestion pipeline, onboarding flow and autocomplete index for DIVSCAN.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use divscan_adapters::{FinanceSource, FixtureFinanceSource, YahooFinanceSource};
use divscan_storage::{
    connect_pool, run_migrations, CompanyCatalog, DividendStore, HttpClientConfig, HttpFetcher,
    MemoryCompanyCatalog, MemoryDividendStore, MemoryResultCache, PgCompanyCatalog,
    PgDividendStore, ResultCache, StorageError,
};
use thiserror::Error;
use tracing::info;

mod autocomplete;
mod finance;
mod merge;
mod onboarding;
mod scheduler;
#[cfg(test)]
mod test_support;

pub use autocomplete::{AutocompleteIndex, Trie};
pub use finance::FinanceService;
pub use merge::{insert_missing, MergeStats};
pub use onboarding::OnboardingService;
pub use scheduler::{IngestionScheduler, SweepSummary, SweepTrigger};

pub const CRATE_NAME: &str = "divscan-sync";

#[derive(Debug, Error)]
pub enum DividendError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transient source failure: {0}")]
    TransientSource(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub scheduler_enabled: bool,
    pub sweep_cron: String,
    pub sweep_pause: Duration,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub finance_base_url: String,
    pub fixture_path: Option<PathBuf>,
    pub autocomplete_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            scheduler_enabled: false,
            sweep_cron: "0 0 * * *".to_string(),
            sweep_pause: Duration::from_secs(3),
            user_agent: "divscan-bot/0.1".to_string(),
            http_timeout_secs: 20,
            finance_base_url: "https://finance.yahoo.com".to_string(),
            fixture_path: None,
            autocomplete_limit: 10,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            scheduler_enabled: std::env::var("DIVSCAN_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.scheduler_enabled),
            sweep_cron: std::env::var("DIVSCAN_SWEEP_CRON").unwrap_or(defaults.sweep_cron),
            sweep_pause: std::env::var("DIVSCAN_SWEEP_PAUSE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_pause),
            user_agent: std::env::var("DIVSCAN_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("DIVSCAN_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            finance_base_url: std::env::var("DIVSCAN_FINANCE_BASE_URL")
                .unwrap_or(defaults.finance_base_url),
            fixture_path: std::env::var("DIVSCAN_FIXTURE_PATH").ok().map(PathBuf::from),
            autocomplete_limit: std::env::var("DIVSCAN_AUTOCOMPLETE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.autocomplete_limit),
        }
    }
}

/// Fully wired collaborators and services shared by the CLI and the web layer.
#[derive(Clone)]
pub struct Services {
    pub config: SyncConfig,
    pub catalog: Arc<dyn CompanyCatalog>,
    pub dividends: Arc<dyn DividendStore>,
    pub cache: Arc<dyn ResultCache>,
    pub source: Arc<dyn FinanceSource>,
    pub index: Arc<AutocompleteIndex>,
    pub onboarding: Arc<OnboardingService>,
    pub finance: Arc<FinanceService>,
    pub scheduler: Arc<IngestionScheduler>,
}

impl Services {
    pub fn new(
        config: SyncConfig,
        catalog: Arc<dyn CompanyCatalog>,
        dividends: Arc<dyn DividendStore>,
        cache: Arc<dyn ResultCache>,
        source: Arc<dyn FinanceSource>,
    ) -> Self {
        let index = Arc::new(AutocompleteIndex::new());
        let onboarding = Arc::new(OnboardingService::new(
            catalog.clone(),
            dividends.clone(),
            cache.clone(),
            source.clone(),
            index.clone(),
        ));
        let finance = Arc::new(FinanceService::new(catalog.clone(), dividends.clone(), cache.clone()));
        let scheduler = Arc::new(IngestionScheduler::new(
            catalog.clone(),
            dividends.clone(),
            cache.clone(),
            source.clone(),
            config.sweep_pause,
        ));
        Self {
            config,
            catalog,
            dividends,
            cache,
            source,
            index,
            onboarding,
            finance,
            scheduler,
        }
    }

    /// Wire stores and source from `config`, then rebuild the autocomplete index from the catalog.
    pub async fn from_config(config: SyncConfig) -> Result<Self> {
        let (catalog, dividends): (Arc<dyn CompanyCatalog>, Arc<dyn DividendStore>) =
            match &config.database_url {
                Some(url) => {
                    let pool = connect_pool(url).await?;
                    run_migrations(&pool).await?;
                    (
                        Arc::new(PgCompanyCatalog::new(pool.clone())),
                        Arc::new(PgDividendStore::new(pool)),
                    )
                }
                None => {
                    info!("DATABASE_URL not set; using in-memory stores");
                    (
                        Arc::new(MemoryCompanyCatalog::new()),
                        Arc::new(MemoryDividendStore::new()),
                    )
                }
            };

        let source: Arc<dyn FinanceSource> = match &config.fixture_path {
            Some(path) => Arc::new(FixtureFinanceSource::load(path)?),
            None => {
                let http = HttpFetcher::new(HttpClientConfig {
                    timeout: Duration::from_secs(config.http_timeout_secs),
                    user_agent: Some(config.user_agent.clone()),
                    ..Default::default()
                })?;
                Arc::new(YahooFinanceSource::new(http, config.finance_base_url.clone()))
            }
        };
        info!(source = source.source_id(), "finance source configured");

        let services = Self::new(config, catalog, dividends, Arc::new(MemoryResultCache::new()), source);
        let indexed = services
            .onboarding
            .rebuild_index()
            .await
            .context("rebuilding autocomplete index")?;
        info!(indexed, "autocomplete index rebuilt from catalog");
        Ok(services)
    }

    pub async fn from_env() -> Result<Self> {
        Self::from_config(SyncConfig::from_env()).await
    }
}

/// Run a single sweep with services wired from the environment.
pub async fn run_sweep_once_from_env() -> Result<SweepSummary> {
    let services = Services::from_env().await?;
    match services.scheduler.trigger().await {
        SweepTrigger::Completed(summary) => Ok(summary),
        SweepTrigger::Skipped => anyhow::bail!("a sweep is already running"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_paces_three_seconds_between_companies() {
        let config = SyncConfig::default();
        assert_eq!(config.sweep_pause, Duration::from_secs(3));
        assert!(config.database_url.is_none());
        assert!(!config.scheduler_enabled);
    }

    #[tokio::test]
    async fn fixture_backed_services_start_with_an_empty_index() {
        let services = Services::new(
            SyncConfig::default(),
            Arc::new(MemoryCompanyCatalog::new()),
            Arc::new(MemoryDividendStore::new()),
            Arc::new(MemoryResultCache::new()),
            Arc::new(FixtureFinanceSource::new()),
        );
        assert!(services.index.is_empty());
        assert_eq!(services.onboarding.rebuild_index().await.unwrap(), 0);
    }
}
