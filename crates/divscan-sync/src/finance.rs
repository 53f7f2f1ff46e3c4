//! Read side: dividend history by company name, memoized in the finance cache namespace.

use std::sync::Arc;

use divscan_core::{CompanyDividends, FINANCE_CACHE_NAMESPACE};
use divscan_storage::{CompanyCatalog, DividendStore, ResultCache};
use tracing::{debug, warn};

use crate::DividendError;

pub struct FinanceService {
    catalog: Arc<dyn CompanyCatalog>,
    dividends: Arc<dyn DividendStore>,
    cache: Arc<dyn ResultCache>,
}

impl FinanceService {
    pub fn new(
        catalog: Arc<dyn CompanyCatalog>,
        dividends: Arc<dyn DividendStore>,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        Self {
            catalog,
            dividends,
            cache,
        }
    }

    pub async fn dividends_by_company_name(&self, name: &str) -> Result<CompanyDividends, DividendError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DividendError::InvalidArgument("company name must not be empty".to_string()));
        }

        match self.cache.get(FINANCE_CACHE_NAMESPACE, name).await {
            Ok(Some(value)) => match serde_json::from_value::<CompanyDividends>(value) {
                Ok(hit) => {
                    debug!(name, "finance cache hit");
                    return Ok(hit);
                }
                Err(err) => warn!(name, error = %err, "discarding undecodable cache entry"),
            },
            Ok(None) => {}
            Err(err) => warn!(name, error = %err, "finance cache read failed"),
        }

        let company = self
            .catalog
            .find_by_name(name)
            .await?
            .ok_or_else(|| DividendError::NotFound(format!("company {name}")))?;
        let dividends = match company.id {
            Some(id) => self
                .dividends
                .list_by_company(id)
                .await?
                .iter()
                .map(|event| event.record())
                .collect(),
            None => Vec::new(),
        };
        let result = CompanyDividends { company, dividends };

        match serde_json::to_value(&result) {
            Ok(value) => {
                if let Err(err) = self.cache.put(FINANCE_CACHE_NAMESPACE, name, value).await {
                    warn!(name, error = %err, "finance cache write failed");
                }
            }
            Err(err) => warn!(name, error = %err, "failed to serialize finance result"),
        }
        Ok(result)
    }
}
