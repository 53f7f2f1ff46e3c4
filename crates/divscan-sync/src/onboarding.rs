//! User-initiated company registration and removal, plus name lookup.

use std::sync::Arc;

use divscan_adapters::{FinanceSource, SourceError};
use divscan_core::{normalize_name, normalize_ticker, Company, FINANCE_CACHE_NAMESPACE};
use divscan_storage::{CompanyCatalog, DividendStore, ResultCache, StorageError};
use tracing::{debug, info, warn};

use crate::autocomplete::AutocompleteIndex;
use crate::merge::insert_missing;
use crate::DividendError;

pub struct OnboardingService {
    catalog: Arc<dyn CompanyCatalog>,
    dividends: Arc<dyn DividendStore>,
    cache: Arc<dyn ResultCache>,
    source: Arc<dyn FinanceSource>,
    index: Arc<AutocompleteIndex>,
}

fn ticker_argument(ticker: &str) -> Result<String, DividendError> {
    let ticker = normalize_ticker(ticker);
    if ticker.is_empty() {
        return Err(DividendError::InvalidArgument("ticker must not be empty".to_string()));
    }
    Ok(ticker)
}

impl OnboardingService {
    pub fn new(
        catalog: Arc<dyn CompanyCatalog>,
        dividends: Arc<dyn DividendStore>,
        cache: Arc<dyn ResultCache>,
        source: Arc<dyn FinanceSource>,
        index: Arc<AutocompleteIndex>,
    ) -> Self {
        Self {
            catalog,
            dividends,
            cache,
            source,
            index,
        }
    }

    /// Register `ticker`: resolve it, persist the company and its dividend history,
    /// and index its name.
    ///
    /// Once the company row is committed, dividend failures are only logged; the next
    /// sweep backfills whatever is missing.
    pub async fn register_company(&self, ticker: &str) -> Result<Company, DividendError> {
        let ticker = ticker_argument(ticker)?;
        if self.catalog.exists_by_ticker(&ticker).await? {
            return Err(DividendError::AlreadyExists(ticker));
        }

        let resolved = match self.source.resolve(&ticker).await {
            Ok(Some(company)) => company,
            Ok(None) => return Err(DividendError::NotFound(format!("ticker {ticker}"))),
            Err(SourceError::Transient(msg)) => return Err(DividendError::TransientSource(msg)),
            Err(SourceError::Permanent(msg)) => {
                return Err(DividendError::NotFound(format!("ticker {ticker}: {msg}")))
            }
        };

        let company = match self.catalog.add(Company::new(ticker.clone(), resolved.name)).await {
            Ok(company) => company,
            Err(StorageError::Duplicate(_)) => return Err(DividendError::AlreadyExists(ticker)),
            Err(err) => return Err(err.into()),
        };
        info!(ticker = %company.ticker, name = %company.name, "company registered");

        self.import_history(&company).await;
        self.index.insert(&company.name);
        Ok(company)
    }

    async fn import_history(&self, company: &Company) {
        let Some(company_id) = company.id else {
            warn!(ticker = %company.ticker, "catalog returned company without id; history left to the next sweep");
            return;
        };
        match self.source.scrap(company).await {
            Ok(scraped) => {
                let stats = insert_missing(self.dividends.as_ref(), company_id, &scraped.dividends).await;
                if stats.failed > 0 {
                    warn!(
                        ticker = %company.ticker,
                        failed = stats.failed,
                        "some dividends were not stored; the next sweep will backfill them"
                    );
                }
                info!(ticker = %company.ticker, inserted = stats.inserted, "dividend history imported");
            }
            Err(err) => warn!(
                ticker = %company.ticker,
                error = %err,
                "dividend history scrape failed; the next sweep will backfill it"
            ),
        }
    }

    /// Remove a company, its dividends and its index entry.
    pub async fn delete_company(&self, ticker: &str) -> Result<Company, DividendError> {
        let ticker = ticker_argument(ticker)?;
        let Some(company) = self.catalog.find_by_ticker(&ticker).await? else {
            return Err(DividendError::NotFound(format!("ticker {ticker}")));
        };
        if let Some(company_id) = company.id {
            let removed = self.dividends.delete_by_company(company_id).await?;
            info!(ticker = %ticker, removed, "dividends deleted");
        }
        let company = self
            .catalog
            .remove_by_ticker(&ticker)
            .await?
            .ok_or_else(|| DividendError::NotFound(format!("ticker {ticker}")))?;

        if self.name_still_listed(&company.name).await {
            debug!(name = %company.name, "another company shares this name; keeping index entry");
        } else {
            self.index.remove(&company.name);
        }
        if let Err(err) = self.cache.evict_namespace(FINANCE_CACHE_NAMESPACE).await {
            warn!(error = %err, "failed to evict finance cache after delete");
        }
        info!(ticker = %company.ticker, name = %company.name, "company deleted");
        Ok(company)
    }

    /// Whether a catalog company still carries `name` once normalized. A failed
    /// lookup keeps the entry; the next rebuild reconciles it.
    async fn name_still_listed(&self, name: &str) -> bool {
        let key = normalize_name(name);
        match self.catalog.list_all().await {
            Ok(companies) => companies.iter().any(|c| normalize_name(&c.name) == key),
            Err(err) => {
                warn!(error = %err, "catalog read failed after delete; keeping index entry");
                true
            }
        }
    }

    pub fn autocomplete(&self, prefix: &str, limit: usize) -> Result<Vec<String>, DividendError> {
        self.index.query(prefix, limit)
    }

    /// Unindexed fallback: substring scan of catalog names.
    pub async fn search_by_keyword(&self, keyword: &str, limit: usize) -> Result<Vec<String>, DividendError> {
        if keyword.trim().is_empty() {
            return Err(DividendError::InvalidArgument("keyword must not be empty".to_string()));
        }
        Ok(self.catalog.search_names(keyword, limit).await?)
    }

    pub async fn list_companies(&self) -> Result<Vec<Company>, DividendError> {
        Ok(self.catalog.list_all().await?)
    }

    /// Reload every catalog name into the index; returns the number of entries.
    pub async fn rebuild_index(&self) -> Result<usize, DividendError> {
        let companies = self.catalog.list_all().await?;
        Ok(self.index.rebuild(companies.iter().map(|c| c.name.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, FlakyDividendStore};
    use divscan_adapters::FixtureFinanceSource;
    use divscan_storage::{MemoryCompanyCatalog, MemoryDividendStore, MemoryResultCache};

    struct Harness {
        catalog: Arc<MemoryCompanyCatalog>,
        store: Arc<MemoryDividendStore>,
        cache: Arc<MemoryResultCache>,
        source: Arc<FixtureFinanceSource>,
        index: Arc<AutocompleteIndex>,
        service: OnboardingService,
    }

    fn harness() -> Harness {
        let catalog = Arc::new(MemoryCompanyCatalog::new());
        let store = Arc::new(MemoryDividendStore::new());
        let cache = Arc::new(MemoryResultCache::new());
        let source = Arc::new(
            FixtureFinanceSource::new()
                .with_company("AAPL", "Apple Inc.", vec![record(2023, 2, 16), record(2023, 5, 12)])
                .with_company("KO", "Coca-Cola", vec![record(2023, 3, 1)]),
        );
        let index = Arc::new(AutocompleteIndex::new());
        let service = OnboardingService::new(
            catalog.clone(),
            store.clone(),
            cache.clone(),
            source.clone(),
            index.clone(),
        );
        Harness {
            catalog,
            store,
            cache,
            source,
            index,
            service,
        }
    }

    #[tokio::test]
    async fn registration_persists_company_history_and_index_entry() {
        let h = harness();
        let company = h.service.register_company(" aapl ").await.unwrap();
        assert_eq!(company.ticker, "AAPL");
        assert_eq!(company.name, "Apple Inc.");
        assert!(company.id.is_some());

        assert!(h.catalog.exists_by_ticker("AAPL").await.unwrap());
        assert_eq!(h.store.list_by_company(company.id.unwrap()).await.unwrap().len(), 2);
        assert_eq!(h.service.autocomplete("app", 10).unwrap(), vec!["Apple Inc."]);
    }

    #[tokio::test]
    async fn blank_and_duplicate_tickers_are_rejected() {
        let h = harness();
        assert!(matches!(
            h.service.register_company("").await,
            Err(DividendError::InvalidArgument(_))
        ));
        assert!(matches!(
            h.service.register_company("   ").await,
            Err(DividendError::InvalidArgument(_))
        ));

        h.service.register_company("AAPL").await.unwrap();
        assert!(matches!(
            h.service.register_company("AAPL").await,
            Err(DividendError::AlreadyExists(_))
        ));
        assert_eq!(h.catalog.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_or_throttled_tickers_surface_synchronously() {
        let h = harness();
        assert!(matches!(
            h.service.register_company("NOPE").await,
            Err(DividendError::NotFound(_))
        ));

        h.source.set_failure("KO", Some(SourceError::Transient("429".into())));
        assert!(matches!(
            h.service.register_company("KO").await,
            Err(DividendError::TransientSource(_))
        ));
        assert!(h.catalog.list_all().await.unwrap().is_empty());
        assert!(h.index.is_empty());
    }

    #[tokio::test]
    async fn failed_history_import_keeps_the_company() {
        let catalog = Arc::new(MemoryCompanyCatalog::new());
        let store = Arc::new(FlakyDividendStore::failing_on(record(2023, 3, 1).date));
        let index = Arc::new(AutocompleteIndex::new());
        let service = OnboardingService::new(
            catalog.clone(),
            store.clone(),
            Arc::new(MemoryResultCache::new()),
            Arc::new(FixtureFinanceSource::new().with_company("KO", "Coca-Cola", vec![record(2023, 3, 1)])),
            index.clone(),
        );

        let company = service.register_company("KO").await.unwrap();
        assert!(store.inner.is_empty().await);
        assert!(catalog.exists_by_ticker("KO").await.unwrap());
        assert_eq!(index.query("coca", 5).unwrap(), vec![company.name]);
    }

    #[tokio::test]
    async fn delete_removes_rows_index_entry_and_cached_reads() {
        let h = harness();
        let company = h.service.register_company("KO").await.unwrap();
        h.cache
            .put(FINANCE_CACHE_NAMESPACE, "Coca-Cola", serde_json::json!({}))
            .await
            .unwrap();

        let deleted = h.service.delete_company("ko").await.unwrap();
        assert_eq!(deleted.id, company.id);
        assert!(h.store.is_empty().await);
        assert!(h.service.autocomplete("coca", 5).unwrap().is_empty());
        assert_eq!(h.cache.namespace_len(FINANCE_CACHE_NAMESPACE).await, 0);
        assert!(matches!(
            h.service.delete_company("KO").await,
            Err(DividendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_one_of_two_same_named_companies_keeps_the_index_entry() {
        let catalog = Arc::new(MemoryCompanyCatalog::new());
        let index = Arc::new(AutocompleteIndex::new());
        let service = OnboardingService::new(
            catalog.clone(),
            Arc::new(MemoryDividendStore::new()),
            Arc::new(MemoryResultCache::new()),
            Arc::new(
                FixtureFinanceSource::new()
                    .with_company("GOOG", "Alphabet Inc.", vec![])
                    .with_company("GOOGL", "Alphabet Inc.", vec![]),
            ),
            index.clone(),
        );
        service.register_company("GOOG").await.unwrap();
        service.register_company("GOOGL").await.unwrap();
        assert_eq!(index.len(), 1);

        service.delete_company("GOOG").await.unwrap();
        assert_eq!(catalog.list_all().await.unwrap().len(), 1);
        assert_eq!(service.autocomplete("alph", 5).unwrap(), vec!["Alphabet Inc."]);

        service.delete_company("GOOGL").await.unwrap();
        assert!(service.autocomplete("alph", 5).unwrap().is_empty());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn keyword_search_and_index_rebuild_follow_the_catalog() {
        let h = harness();
        h.catalog.add(Company::new("CCEP", "Coca-Cola Europacific")).await.unwrap();
        h.catalog.add(Company::new("KO", "Coca-Cola")).await.unwrap();

        assert!(h.service.autocomplete("coca", 5).unwrap().is_empty());
        assert_eq!(h.service.rebuild_index().await.unwrap(), 2);
        assert_eq!(
            h.service.autocomplete("coca", 5).unwrap(),
            vec!["Coca-Cola", "Coca-Cola Europacific"]
        );
        assert_eq!(
            h.service.search_by_keyword("europa", 5).await.unwrap(),
            vec!["Coca-Cola Europacific"]
        );
        assert!(matches!(
            h.service.search_by_keyword(" ", 5).await,
            Err(DividendError::InvalidArgument(_))
        ));
        assert_eq!(h.service.list_companies().await.unwrap().len(), 2);
    }
}
