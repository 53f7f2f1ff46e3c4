use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use divscan_core::{normalize_ticker, Company, DividendRecord};
use divscan_storage::{FetchError, HttpFetcher};
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use tracing::debug;

use crate::{FinanceSource, SourceError};

const DIVIDEND_MARKER: &str = "Dividend";

/// Scrapes the quote summary and dividend history pages of a Yahoo-Finance-shaped site.
#[derive(Debug)]
pub struct YahooFinanceSource {
    http: HttpFetcher,
    base_url: String,
}

impl YahooFinanceSource {
    pub fn new(http: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn summary_url(&self, ticker: &str) -> String {
        format!("{}/quote/{ticker}?p={ticker}", self.base_url)
    }

    fn history_url(&self, ticker: &str) -> String {
        format!(
            "{}/quote/{ticker}/history?period1=0&period2={}&interval=1mo&filter=div",
            self.base_url,
            Utc::now().timestamp()
        )
    }
}

#[async_trait]
impl FinanceSource for YahooFinanceSource {
    fn source_id(&self) -> &'static str {
        "yahoo-finance"
    }

    async fn resolve(&self, ticker: &str) -> Result<Option<Company>, SourceError> {
        let ticker = normalize_ticker(ticker);
        let page = match self.http.fetch_text(&self.summary_url(&ticker)).await {
            Ok(page) => page,
            Err(FetchError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let name = parse_company_name(&page.body)?;
        Ok(name.map(|name| Company::new(ticker, name)))
    }

    async fn fetch_dividends(&self, company: &Company) -> Result<Vec<DividendRecord>, SourceError> {
        let page = self.http.fetch_text(&self.history_url(&company.ticker)).await?;
        parse_dividend_rows(&page.body)
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Permanent(format!("selector {css}: {e}")))
}

fn text_or_none(value: String) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Display name from the quote header, e.g. `Coca-Cola Company (The) (KO)` -> `Coca-Cola Company (The)`.
pub fn parse_company_name(html: &str) -> Result<Option<String>, SourceError> {
    let document = Html::parse_document(html);
    let h1 = selector("h1")?;
    let Some(title) = document
        .select(&h1)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>()))
    else {
        return Ok(None);
    };

    let name = match title.rfind(" (") {
        Some(idx) if title.ends_with(')') => title[..idx].trim().to_string(),
        _ => title,
    };
    Ok(text_or_none(name))
}

/// Dividend rows of the history table, sorted by date with repeated dates dropped.
pub fn parse_dividend_rows(html: &str) -> Result<Vec<DividendRecord>, SourceError> {
    let document = Html::parse_document(html);
    let rows = selector("table tbody tr")?;
    let cells = selector("td")?;

    let mut out = Vec::new();
    for row in document.select(&rows) {
        let texts = row
            .select(&cells)
            .filter_map(|td| text_or_none(td.text().collect::<String>()))
            .collect::<Vec<_>>();
        let [date_text, value_text, ..] = texts.as_slice() else {
            continue;
        };
        if !value_text.contains(DIVIDEND_MARKER) {
            continue;
        }

        let date = NaiveDate::parse_from_str(date_text, "%b %d, %Y");
        let amount = value_text
            .split_whitespace()
            .next()
            .map(Decimal::from_str);
        match (date, amount) {
            (Ok(date), Some(Ok(amount))) => out.push(DividendRecord::new(date, amount)),
            _ => debug!(row = %texts.join(" | "), "skipping unparseable dividend row"),
        }
    }

    out.sort();
    out.dedup_by_key(|r| r.date);
    Ok(out)
}
