use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use divscan_core::{normalize_ticker, Company, DividendRecord};
use serde::{Deserialize, Serialize};

use crate::{FinanceSource, SourceError};

/// On-disk fixture format: a list of companies with their dividend histories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureFile {
    pub companies: Vec<FixtureCompany>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCompany {
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub dividends: Vec<DividendRecord>,
}

#[derive(Debug, Default)]
struct FixtureState {
    companies: HashMap<String, FixtureCompany>,
    failures: HashMap<String, SourceError>,
}

/// Finance source answering from memory; used for offline runs and tests.
///
/// Histories and failures can be changed between calls to script what a sweep sees.
#[derive(Debug, Default)]
pub struct FixtureFinanceSource {
    state: Mutex<FixtureState>,
}

impl FixtureFinanceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(file: FixtureFile) -> Self {
        let source = Self::new();
        for company in file.companies {
            source.upsert(company);
        }
        source
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let file: FixtureFile =
            serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::from_file(file))
    }

    pub fn with_company(self, ticker: &str, name: &str, dividends: Vec<DividendRecord>) -> Self {
        self.upsert(FixtureCompany {
            ticker: ticker.to_string(),
            name: name.to_string(),
            dividends,
        });
        self
    }

    pub fn upsert(&self, mut company: FixtureCompany) {
        company.ticker = normalize_ticker(&company.ticker);
        self.lock().companies.insert(company.ticker.clone(), company);
    }

    pub fn set_dividends(&self, ticker: &str, dividends: Vec<DividendRecord>) {
        if let Some(company) = self.lock().companies.get_mut(&normalize_ticker(ticker)) {
            company.dividends = dividends;
        }
    }

    /// Make every call for `ticker` fail with `error` until cleared with `None`.
    pub fn set_failure(&self, ticker: &str, error: Option<SourceError>) {
        let ticker = normalize_ticker(ticker);
        let mut state = self.lock();
        match error {
            Some(err) => {
                state.failures.insert(ticker, err);
            }
            None => {
                state.failures.remove(&ticker);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FinanceSource for FixtureFinanceSource {
    fn source_id(&self) -> &'static str {
        "fixture"
    }

    async fn resolve(&self, ticker: &str) -> Result<Option<Company>, SourceError> {
        let ticker = normalize_ticker(ticker);
        let state = self.lock();
        if let Some(err) = state.failures.get(&ticker) {
            return Err(err.clone());
        }
        Ok(state
            .companies
            .get(&ticker)
            .map(|c| Company::new(c.ticker.clone(), c.name.clone())))
    }

    async fn fetch_dividends(&self, company: &Company) -> Result<Vec<DividendRecord>, SourceError> {
        let ticker = normalize_ticker(&company.ticker);
        let state = self.lock();
        if let Some(err) = state.failures.get(&ticker) {
            return Err(err.clone());
        }
        let mut dividends = state
            .companies
            .get(&ticker)
            .map(|c| c.dividends.clone())
            .unwrap_or_default();
        dividends.sort();
        Ok(dividends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn loads_fixture_file_and_answers_lookups() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dividends.json");
        fs::write(
            &path,
            r#"{
                "companies": [
                    {
                        "ticker": "ko",
                        "name": "Coca-Cola",
                        "dividends": [
                            { "date": "2023-06-01", "amount": "0.46" },
                            { "date": "2023-03-01", "amount": 0.46 }
                        ]
                    }
                ]
            }"#,
        )
        .expect("write fixture");

        let source = FixtureFinanceSource::load(&path).expect("load fixture");
        let company = source.resolve(" KO ").await.unwrap().expect("known ticker");
        assert_eq!(company.name, "Coca-Cola");
        assert!(source.resolve("PEP").await.unwrap().is_none());

        let scraped = source.scrap(&company).await.unwrap();
        assert_eq!(scraped.dividends.len(), 2);
        assert_eq!(scraped.dividends[0].date, NaiveDate::from_ymd_opt(2023, 3, 1).unwrap());
        assert_eq!(scraped.dividends[1].amount, Decimal::new(46, 2));
    }

    #[tokio::test]
    async fn scripted_failures_apply_until_cleared() {
        let source = FixtureFinanceSource::new().with_company("PEP", "PepsiCo", vec![]);
        source.set_failure("pep", Some(SourceError::Transient("429".into())));
        let company = Company::new("PEP", "PepsiCo");
        assert!(source.fetch_dividends(&company).await.unwrap_err().is_transient());

        source.set_failure("PEP", None);
        assert!(source.fetch_dividends(&company).await.unwrap().is_empty());
    }
}
