//! Core domain model for DIVSCAN: companies, dividend events, scrape results.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "divscan-core";

/// Cache namespace holding memoized read-side finance aggregates.
pub const FINANCE_CACHE_NAMESPACE: &str = "finance";

/// Opaque catalog-assigned handle for a persisted company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub i64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A watched company. `id` stays `None` until the catalog persists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CompanyId>,
    pub ticker: String,
    pub name: String,
}

impl Company {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            ticker: ticker.into(),
            name: name.into(),
        }
    }

    pub fn with_id(mut self, id: CompanyId) -> Self {
        self.id = Some(id);
        self
    }
}

/// One dividend payment as reported by a finance source, before it is tied to a company row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DividendRecord {
    pub date: NaiveDate,
    pub amount: Decimal,
}

impl DividendRecord {
    pub fn new(date: NaiveDate, amount: Decimal) -> Self {
        Self { date, amount }
    }

    pub fn for_company(self, company_id: CompanyId) -> DividendEvent {
        DividendEvent {
            company_id,
            date: self.date,
            amount: self.amount,
        }
    }
}

/// Persisted dividend row. `(company_id, date)` is the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub company_id: CompanyId,
    pub date: NaiveDate,
    pub amount: Decimal,
}

impl DividendEvent {
    pub fn dedup_key(&self) -> (CompanyId, NaiveDate) {
        (self.company_id, self.date)
    }

    pub fn record(&self) -> DividendRecord {
        DividendRecord::new(self.date, self.amount)
    }
}

/// Transient output of a scrape; only its delta against storage is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedResult {
    pub company: Company,
    pub dividends: Vec<DividendRecord>,
}

/// Read-side aggregate served by the finance endpoint and memoized in the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDividends {
    pub company: Company,
    pub dividends: Vec<DividendRecord>,
}

/// Trim and upper-case an exchange symbol.
pub fn normalize_ticker(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Lower-case a company name and collapse whitespace runs into single spaces.
pub fn normalize_name(input: &str) -> String {
    input
        .split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_normalization_folds_case_and_whitespace() {
        assert_eq!(normalize_name("  Coca-Cola   Company "), "coca-cola company");
        assert_eq!(normalize_name("\tAPPLE\ninc"), "apple inc");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn ticker_normalization_trims_and_uppercases() {
        assert_eq!(normalize_ticker(" ko "), "KO");
        assert_eq!(normalize_ticker(""), "");
    }

    #[test]
    fn dividend_record_binds_to_company() {
        let date = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let event = DividendRecord::new(date, Decimal::new(46, 2)).for_company(CompanyId(7));
        assert_eq!(event.dedup_key(), (CompanyId(7), date));
        assert_eq!(event.record().amount, Decimal::new(46, 2));
    }

    #[test]
    fn unpersisted_company_serializes_without_id() {
        let json = serde_json::to_value(Company::new("KO", "Coca-Cola")).unwrap();
        assert!(json.get("id").is_none());
        let json = serde_json::to_value(Company::new("KO", "Coca-Cola").with_id(CompanyId(3))).unwrap();
        assert_eq!(json["id"], 3);
    }
}
