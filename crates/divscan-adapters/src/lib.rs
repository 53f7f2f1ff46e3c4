//! Finance source contracts + the Yahoo-style HTML source and a fixture-backed source.

use async_trait::async_trait;
use divscan_core::{Company, DividendRecord, ScrapedResult};
use divscan_storage::FetchError;
use thiserror::Error;

mod fixture;
mod yahoo;

pub use fixture::{FixtureCompany, FixtureFile, FixtureFinanceSource};
pub use yahoo::{parse_company_name, parse_dividend_rows, YahooFinanceSource};

pub const CRATE_NAME: &str = "divscan-adapters";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Throttling, timeouts, 5xx: the next sweep may succeed.
    #[error("transient source failure: {0}")]
    Transient(String),
    #[error("permanent source failure: {0}")]
    Permanent(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

impl From<FetchError> for SourceError {
    fn from(err: FetchError) -> Self {
        if err.is_transient() {
            SourceError::Transient(err.to_string())
        } else {
            SourceError::Permanent(err.to_string())
        }
    }
}

/// External provider of company identities and dividend histories.
#[async_trait]
pub trait FinanceSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Look a ticker up. `Ok(None)` means the source does not know it.
    async fn resolve(&self, ticker: &str) -> Result<Option<Company>, SourceError>;

    /// Full dividend history for `company`, oldest first.
    async fn fetch_dividends(&self, company: &Company) -> Result<Vec<DividendRecord>, SourceError>;

    async fn scrap(&self, company: &Company) -> Result<ScrapedResult, SourceError> {
        let dividends = self.fetch_dividends(company).await?;
        Ok(ScrapedResult {
            company: company.clone(),
            dividends,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_map_onto_source_error_kinds() {
        let throttled: SourceError = FetchError::HttpStatus {
            status: 503,
            url: "https://finance.example/quote/KO".into(),
        }
        .into();
        assert!(throttled.is_transient());

        let missing: SourceError = FetchError::NotFound {
            url: "https://finance.example/quote/NOPE".into(),
        }
        .into();
        assert!(matches!(missing, SourceError::Permanent(_)));
    }
}
