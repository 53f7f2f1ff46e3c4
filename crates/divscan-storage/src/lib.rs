//! Storage collaborators for DIVSCAN: company catalog, dividend store, result cache,
//! plus the rate-limited HTTP fetcher used by finance sources.

use async_trait::async_trait;
use chrono::NaiveDate;
use divscan_core::{Company, CompanyId, DividendEvent};
use thiserror::Error;

mod http;
mod memory;
mod postgres;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, RetryDisposition, SimpleTokenBucket, TokenBucketConfig,
};
pub use memory::{MemoryCompanyCatalog, MemoryDividendStore, MemoryResultCache};
pub use postgres::{connect_pool, run_migrations, PgCompanyCatalog, PgDividendStore};

pub const CRATE_NAME: &str = "divscan-storage";

#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique_violation {
            StorageError::Duplicate(err.to_string())
        } else {
            StorageError::Backend(err.into())
        }
    }
}

/// Result of a single reject-on-conflict insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Durable store of known companies. Tickers are unique.
#[async_trait]
pub trait CompanyCatalog: Send + Sync {
    async fn exists_by_ticker(&self, ticker: &str) -> Result<bool, StorageError>;

    /// Persist a company and return it with its assigned id.
    /// Fails with [`StorageError::Duplicate`] when the ticker is taken.
    async fn add(&self, company: Company) -> Result<Company, StorageError>;

    /// All companies in catalog (insertion) order.
    async fn list_all(&self) -> Result<Vec<Company>, StorageError>;

    async fn find_by_ticker(&self, ticker: &str) -> Result<Option<Company>, StorageError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Company>, StorageError>;

    /// Substring scan over company names, sorted by name. Keyword and names are compared
    /// after lower-casing and collapsing whitespace runs.
    async fn search_names(&self, keyword: &str, limit: usize) -> Result<Vec<String>, StorageError>;

    async fn remove_by_ticker(&self, ticker: &str) -> Result<Option<Company>, StorageError>;
}

/// Durable store of dividend events, unique on `(company_id, date)`.
#[async_trait]
pub trait DividendStore: Send + Sync {
    async fn exists_by_company_and_date(
        &self,
        company_id: CompanyId,
        date: NaiveDate,
    ) -> Result<bool, StorageError>;

    async fn insert(&self, event: &DividendEvent) -> Result<InsertOutcome, StorageError>;

    /// Insert every event whose key is free; returns how many rows were written.
    async fn insert_all(&self, events: &[DividendEvent]) -> Result<usize, StorageError>;

    /// Events for one company ordered by date.
    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<DividendEvent>, StorageError>;

    async fn delete_by_company(&self, company_id: CompanyId) -> Result<usize, StorageError>;
}

/// Key/value memo for read-side aggregates, grouped into namespaces.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    async fn put(&self, namespace: &str, key: &str, value: serde_json::Value) -> Result<(), StorageError>;

    /// Drop every entry in `namespace`; returns the number of evicted entries.
    async fn evict_namespace(&self, namespace: &str) -> Result<usize, StorageError>;
}
