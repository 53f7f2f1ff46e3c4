//! Postgres-backed catalog and dividend store (sqlx).

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use divscan_core::{normalize_name, Company, CompanyId, DividendEvent};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use crate::{CompanyCatalog, DividendStore, InsertOutcome, StorageError};

pub async fn connect_pool(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await
        .context("connecting to postgres")
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("running migrations")?;
    info!("database migrations applied");
    Ok(())
}

fn company_from_row(row: &PgRow) -> Result<Company, sqlx::Error> {
    let id: i64 = row.try_get("id")?;
    Ok(Company {
        id: Some(CompanyId(id)),
        ticker: row.try_get("ticker")?,
        name: row.try_get("name")?,
    })
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `LIKE` pattern for a keyword, normalized the same way names are compared.
fn keyword_pattern(keyword: &str) -> String {
    format!("%{}%", escape_like(&normalize_name(keyword)))
}

const SEARCH_NAMES: &str = r#"
    SELECT name FROM companies
    WHERE btrim(regexp_replace(lower(name), '\s+', ' ', 'g')) LIKE $1
    ORDER BY name
    LIMIT $2
"#;

#[derive(Debug, Clone)]
pub struct PgCompanyCatalog {
    pool: PgPool,
}

impl PgCompanyCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompanyCatalog for PgCompanyCatalog {
    async fn exists_by_ticker(&self, ticker: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM companies WHERE ticker = $1) AS found")
            .bind(ticker)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("found")?)
    }

    async fn add(&self, company: Company) -> Result<Company, StorageError> {
        let row = sqlx::query("INSERT INTO companies (ticker, name) VALUES ($1, $2) RETURNING id")
            .bind(&company.ticker)
            .bind(&company.name)
            .fetch_one(&self.pool)
            .await?;
        let id: i64 = row.try_get("id")?;
        Ok(company.with_id(CompanyId(id)))
    }

    async fn list_all(&self) -> Result<Vec<Company>, StorageError> {
        let rows = sqlx::query("SELECT id, ticker, name FROM companies ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(company_from_row).collect::<Result<_, _>>()?)
    }

    async fn find_by_ticker(&self, ticker: &str) -> Result<Option<Company>, StorageError> {
        let row = sqlx::query("SELECT id, ticker, name FROM companies WHERE ticker = $1")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(company_from_row).transpose()?)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Company>, StorageError> {
        let row = sqlx::query("SELECT id, ticker, name FROM companies WHERE name = $1 ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(company_from_row).transpose()?)
    }

    async fn search_names(&self, keyword: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(SEARCH_NAMES)
            .bind(keyword_pattern(keyword))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<_, _>>()?)
    }

    async fn remove_by_ticker(&self, ticker: &str) -> Result<Option<Company>, StorageError> {
        let row = sqlx::query("DELETE FROM companies WHERE ticker = $1 RETURNING id, ticker, name")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(company_from_row).transpose()?)
    }
}

#[derive(Debug, Clone)]
pub struct PgDividendStore {
    pool: PgPool,
}

impl PgDividendStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_DIVIDEND: &str = r#"
    INSERT INTO dividends (company_id, date, amount)
    VALUES ($1, $2, $3)
    ON CONFLICT (company_id, date) DO NOTHING
"#;

#[async_trait]
impl DividendStore for PgDividendStore {
    async fn exists_by_company_and_date(
        &self,
        company_id: CompanyId,
        date: NaiveDate,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM dividends WHERE company_id = $1 AND date = $2) AS found",
        )
        .bind(company_id.0)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("found")?)
    }

    async fn insert(&self, event: &DividendEvent) -> Result<InsertOutcome, StorageError> {
        let result = sqlx::query(INSERT_DIVIDEND)
            .bind(event.company_id.0)
            .bind(event.date)
            .bind(event.amount)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Duplicate)
        }
    }

    async fn insert_all(&self, events: &[DividendEvent]) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for event in events {
            let result = sqlx::query(INSERT_DIVIDEND)
                .bind(event.company_id.0)
                .bind(event.date)
                .bind(event.amount)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<DividendEvent>, StorageError> {
        let rows = sqlx::query(
            "SELECT company_id, date, amount FROM dividends WHERE company_id = $1 ORDER BY date",
        )
        .bind(company_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let amount: Decimal = row.try_get("amount")?;
            out.push(DividendEvent {
                company_id: CompanyId(row.try_get("company_id")?),
                date: row.try_get("date")?,
                amount,
            });
        }
        Ok(out)
    }

    async fn delete_by_company(&self, company_id: CompanyId) -> Result<usize, StorageError> {
        let result = sqlx::query("DELETE FROM dividends WHERE company_id = $1")
            .bind(company_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
