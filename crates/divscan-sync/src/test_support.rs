//! Shared fixtures and failure-injecting collaborators for unit tests.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use divscan_core::{Company, CompanyId, DividendEvent, DividendRecord};
use divscan_storage::{CompanyCatalog, DividendStore, InsertOutcome, MemoryDividendStore, StorageError};
use rust_decimal::Decimal;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// A $0.46 dividend on the given day.
pub fn record(y: i32, m: u32, d: u32) -> DividendRecord {
    DividendRecord::new(date(y, m, d), Decimal::new(46, 2))
}

/// Memory store whose writes fail for one poisoned date.
pub struct FlakyDividendStore {
    pub inner: MemoryDividendStore,
    poisoned: NaiveDate,
}

impl FlakyDividendStore {
    pub fn failing_on(poisoned: NaiveDate) -> Self {
        Self {
            inner: MemoryDividendStore::new(),
            poisoned,
        }
    }

    fn check(&self, event: &DividendEvent) -> Result<(), StorageError> {
        if event.date == self.poisoned {
            return Err(StorageError::Backend(anyhow!("disk full writing {}", event.date)));
        }
        Ok(())
    }
}

#[async_trait]
impl DividendStore for FlakyDividendStore {
    async fn exists_by_company_and_date(
        &self,
        company_id: CompanyId,
        date: NaiveDate,
    ) -> Result<bool, StorageError> {
        self.inner.exists_by_company_and_date(company_id, date).await
    }

    async fn insert(&self, event: &DividendEvent) -> Result<InsertOutcome, StorageError> {
        self.check(event)?;
        self.inner.insert(event).await
    }

    async fn insert_all(&self, events: &[DividendEvent]) -> Result<usize, StorageError> {
        for event in events {
            self.check(event)?;
        }
        self.inner.insert_all(events).await
    }

    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<DividendEvent>, StorageError> {
        self.inner.list_by_company(company_id).await
    }

    async fn delete_by_company(&self, company_id: CompanyId) -> Result<usize, StorageError> {
        self.inner.delete_by_company(company_id).await
    }
}

/// Catalog that is always unreachable.
pub struct FailingCatalog;

fn unreachable_catalog() -> StorageError {
    StorageError::Backend(anyhow!("catalog unreachable"))
}

#[async_trait]
impl CompanyCatalog for FailingCatalog {
    async fn exists_by_ticker(&self, _ticker: &str) -> Result<bool, StorageError> {
        Err(unreachable_catalog())
    }

    async fn add(&self, _company: Company) -> Result<Company, StorageError> {
        Err(unreachable_catalog())
    }

    async fn list_all(&self) -> Result<Vec<Company>, StorageError> {
        Err(unreachable_catalog())
    }

    async fn find_by_ticker(&self, _ticker: &str) -> Result<Option<Company>, StorageError> {
        Err(unreachable_catalog())
    }

    async fn find_by_name(&self, _name: &str) -> Result<Option<Company>, StorageError> {
        Err(unreachable_catalog())
    }

    async fn search_names(&self, _keyword: &str, _limit: usize) -> Result<Vec<String>, StorageError> {
        Err(unreachable_catalog())
    }

    async fn remove_by_ticker(&self, _ticker: &str) -> Result<Option<Company>, StorageError> {
        Err(unreachable_catalog())
    }
}
