//! In-process implementations of the storage collaborators.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use divscan_core::{normalize_name, Company, CompanyId, DividendEvent};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use crate::{CompanyCatalog, DividendStore, InsertOutcome, ResultCache, StorageError};

#[derive(Debug, Default)]
struct CatalogState {
    next_id: i64,
    companies: Vec<Company>,
}

#[derive(Debug, Default)]
pub struct MemoryCompanyCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCompanyCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompanyCatalog for MemoryCompanyCatalog {
    async fn exists_by_ticker(&self, ticker: &str) -> Result<bool, StorageError> {
        let state = self.state.lock().await;
        Ok(state.companies.iter().any(|c| c.ticker == ticker))
    }

    async fn add(&self, company: Company) -> Result<Company, StorageError> {
        let mut state = self.state.lock().await;
        if state.companies.iter().any(|c| c.ticker == company.ticker) {
            return Err(StorageError::Duplicate(format!("ticker {}", company.ticker)));
        }
        state.next_id += 1;
        let stored = company.with_id(CompanyId(state.next_id));
        state.companies.push(stored.clone());
        Ok(stored)
    }

    async fn list_all(&self) -> Result<Vec<Company>, StorageError> {
        Ok(self.state.lock().await.companies.clone())
    }

    async fn find_by_ticker(&self, ticker: &str) -> Result<Option<Company>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.companies.iter().find(|c| c.ticker == ticker).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Company>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.companies.iter().find(|c| c.name == name).cloned())
    }

    async fn search_names(&self, keyword: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        let needle = normalize_name(keyword);
        let state = self.state.lock().await;
        let mut names = state
            .companies
            .iter()
            .filter(|c| normalize_name(&c.name).contains(&needle))
            .map(|c| c.name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.truncate(limit);
        Ok(names)
    }

    async fn remove_by_ticker(&self, ticker: &str) -> Result<Option<Company>, StorageError> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.companies.iter().position(|c| c.ticker == ticker) else {
            return Ok(None);
        };
        Ok(Some(state.companies.remove(pos)))
    }
}

/// Dividend rows keyed by `(company_id, date)`; the map key is the uniqueness constraint.
#[derive(Debug, Default)]
pub struct MemoryDividendStore {
    rows: Mutex<BTreeMap<(CompanyId, NaiveDate), Decimal>>,
}

impl MemoryDividendStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl DividendStore for MemoryDividendStore {
    async fn exists_by_company_and_date(
        &self,
        company_id: CompanyId,
        date: NaiveDate,
    ) -> Result<bool, StorageError> {
        Ok(self.rows.lock().await.contains_key(&(company_id, date)))
    }

    async fn insert(&self, event: &DividendEvent) -> Result<InsertOutcome, StorageError> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&event.dedup_key()) {
            return Ok(InsertOutcome::Duplicate);
        }
        rows.insert(event.dedup_key(), event.amount);
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_all(&self, events: &[DividendEvent]) -> Result<usize, StorageError> {
        let mut rows = self.rows.lock().await;
        let mut inserted = 0usize;
        for event in events {
            if !rows.contains_key(&event.dedup_key()) {
                rows.insert(event.dedup_key(), event.amount);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<DividendEvent>, StorageError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|((id, _), _)| *id == company_id)
            .map(|((id, date), amount)| DividendEvent {
                company_id: *id,
                date: *date,
                amount: *amount,
            })
            .collect())
    }

    async fn delete_by_company(&self, company_id: CompanyId) -> Result<usize, StorageError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|(id, _), _| *id != company_id);
        Ok(before - rows.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryResultCache {
    namespaces: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn namespace_len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn evict_namespace(&self, namespace: &str) -> Result<usize, StorageError> {
        let mut namespaces = self.namespaces.write().await;
        Ok(namespaces.remove(namespace).map(|ns| ns.len()).unwrap_or(0))
    }
}
