// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL storage gateway.
//!
//! Supports SQLite (embedded) and MySQL (shared deployments) through sqlx's
//! `Any` driver, with dialect-specific upsert SQL. Schema:
//!
//! ```sql
//! CREATE TABLE countries (
//!   code VARCHAR(15) PRIMARY KEY,
//!   name VARCHAR(255) NOT NULL,
//!   has_monthly_source TINYINT NOT NULL DEFAULT 0
//! );
//! CREATE TABLE inflation_observations (
//!   country_code VARCHAR(15) NOT NULL,
//!   period VARCHAR(7) NOT NULL,       -- canonical "YYYY" / "YYYY-MM"
//!   period_key INT NOT NULL,          -- year*100+month, 0 month = annual
//!   value DOUBLE NOT NULL,
//!   PRIMARY KEY (country_code, period)
//! );
//! CREATE TABLE income_observations (
//!   country_code VARCHAR(15) NOT NULL,
//!   period VARCHAR(7) NOT NULL,
//!   period_key INT NOT NULL,
//!   ppp_value DOUBLE,
//!   lcu_value DOUBLE,
//!   growth_rate DOUBLE,
//!   PRIMARY KEY (country_code, period)
//! );
//! ```
//!
//! `period_key` is the period's numeric sort key; every range filter and
//! ordering uses it, so annual and monthly rows in the same table compare
//! correctly. Annual keys are multiples of 100, which is also how the two
//! granularities are told apart for resume-point queries.
//!
//! ## sqlx Any driver quirks
//!
//! The `Any` driver treats MySQL TEXT columns as BLOB, so string columns are
//! read as `String` first with a `Vec<u8>` fallback.

use std::sync::Once;
use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::{any::AnyRow, AnyPool, Row};

use super::StorageError;
use crate::period::{Granularity, Period};
use crate::record::{IncomeObservation, InflationObservation};
use crate::resilience::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Outcome of an income merge-upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No row existed for the key; one was inserted.
    Inserted,
    /// An existing row absorbed the provided fields.
    Merged,
}

pub struct StorageGateway {
    pool: AnyPool,
    is_sqlite: bool,
    retry: RetryConfig,
}

impl StorageGateway {
    /// Connect and initialize the schema, retrying with startup-mode backoff
    /// (fails fast if the connection string is wrong).
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = database_url.starts_with("sqlite:");

        let pool = retry("storage_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(database_url)
                .await
        })
        .await?;

        let gateway = Self { pool, is_sqlite, retry: RetryConfig::storage() };

        if is_sqlite {
            gateway.enable_wal_mode().await?;
        }
        gateway.init_schema().await?;
        Ok(gateway)
    }

    /// WAL mode: concurrent reads during writes, single fsync per commit.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL").execute(&self.pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&self.pool).await?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements: Vec<&str> = if self.is_sqlite {
            vec![
                "CREATE TABLE IF NOT EXISTS countries (
                    code TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    has_monthly_source INTEGER NOT NULL DEFAULT 0
                )",
                "CREATE TABLE IF NOT EXISTS inflation_observations (
                    country_code TEXT NOT NULL,
                    period TEXT NOT NULL,
                    period_key INTEGER NOT NULL,
                    value REAL NOT NULL,
                    PRIMARY KEY (country_code, period)
                )",
                "CREATE TABLE IF NOT EXISTS income_observations (
                    country_code TEXT NOT NULL,
                    period TEXT NOT NULL,
                    period_key INTEGER NOT NULL,
                    ppp_value REAL,
                    lcu_value REAL,
                    growth_rate REAL,
                    PRIMARY KEY (country_code, period)
                )",
                "CREATE INDEX IF NOT EXISTS idx_inflation_period_key
                    ON inflation_observations (period_key)",
                "CREATE INDEX IF NOT EXISTS idx_income_period_key
                    ON income_observations (period_key)",
            ]
        } else {
            vec![
                "CREATE TABLE IF NOT EXISTS countries (
                    code VARCHAR(15) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    has_monthly_source TINYINT NOT NULL DEFAULT 0
                )",
                "CREATE TABLE IF NOT EXISTS inflation_observations (
                    country_code VARCHAR(15) NOT NULL,
                    period VARCHAR(7) NOT NULL,
                    period_key INT NOT NULL,
                    value DOUBLE NOT NULL,
                    PRIMARY KEY (country_code, period),
                    INDEX idx_inflation_period_key (period_key)
                )",
                "CREATE TABLE IF NOT EXISTS income_observations (
                    country_code VARCHAR(15) NOT NULL,
                    period VARCHAR(7) NOT NULL,
                    period_key INT NOT NULL,
                    ppp_value DOUBLE,
                    lcu_value DOUBLE,
                    growth_rate DOUBLE,
                    PRIMARY KEY (country_code, period),
                    INDEX idx_income_period_key (period_key)
                )",
            ]
        };

        for sql in statements {
            retry("storage_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql).execute(&self.pool).await
            })
            .await?;
        }
        Ok(())
    }

    pub(super) fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub(super) fn is_sqlite(&self) -> bool {
        self.is_sqlite
    }

    // ════════════════════════════════════════════════════════════════════
    // Countries
    // ════════════════════════════════════════════════════════════════════

    /// Insert or update a country.
    ///
    /// The monthly-source flag merges greatest-wins at the SQL level: once any
    /// writer has set it, a concurrent or later `false`-carrying upsert cannot
    /// clear it.
    pub async fn upsert_country(
        &self,
        code: &str,
        name: &str,
        has_monthly_source: bool,
    ) -> Result<(), StorageError> {
        let sql = if self.is_sqlite {
            "INSERT INTO countries (code, name, has_monthly_source) VALUES (?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                has_monthly_source = MAX(countries.has_monthly_source, excluded.has_monthly_source)"
        } else {
            "INSERT INTO countries (code, name, has_monthly_source) VALUES (?, ?, ?)
             ON DUPLICATE KEY UPDATE
                name = VALUES(name),
                has_monthly_source = GREATEST(has_monthly_source, VALUES(has_monthly_source))"
        };
        let flag = i64::from(has_monthly_source);

        retry("country_upsert", &self.retry, || async {
            sqlx::query(sql)
                .bind(code)
                .bind(name)
                .bind(flag)
                .execute(&self.pool)
                .await?;
            Ok::<_, sqlx::Error>(())
        })
        .await?;
        Ok(())
    }

    /// Whether a country row exists (feeds the reconciler's local cache).
    pub async fn country_exists(&self, code: &str) -> Result<bool, StorageError> {
        let found = retry("country_exists", &self.retry, || async {
            sqlx::query("SELECT 1 FROM countries WHERE code = ? LIMIT 1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
        })
        .await?;
        Ok(found.is_some())
    }

    pub async fn monthly_source_flag(&self, code: &str) -> Result<Option<bool>, StorageError> {
        let row = retry("country_flag", &self.retry, || async {
            sqlx::query("SELECT has_monthly_source FROM countries WHERE code = ?")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
        })
        .await?;
        Ok(row.map(|r| r.try_get::<i64, _>("has_monthly_source").unwrap_or(0) != 0))
    }

    // ════════════════════════════════════════════════════════════════════
    // Inflation observations
    // ════════════════════════════════════════════════════════════════════

    /// Conflict-ignore upsert. Returns `true` when a row was actually added.
    pub async fn upsert_inflation(
        &self,
        obs: &InflationObservation,
    ) -> Result<bool, StorageError> {
        let sql = if self.is_sqlite {
            "INSERT INTO inflation_observations (country_code, period, period_key, value)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(country_code, period) DO NOTHING"
        } else {
            "INSERT IGNORE INTO inflation_observations (country_code, period, period_key, value)
             VALUES (?, ?, ?, ?)"
        };
        let period = obs.period.to_string();
        let key = i64::from(obs.period.sort_key());

        let added = retry("inflation_upsert", &self.retry, || async {
            let result = sqlx::query(sql)
                .bind(&obs.country)
                .bind(&period)
                .bind(key)
                .bind(obs.value)
                .execute(&self.pool)
                .await?;
            Ok::<_, sqlx::Error>(result.rows_affected() > 0)
        })
        .await?;
        Ok(added)
    }

    /// Remove the annual observation for a country+year, if present.
    /// Returns the number of rows removed (0 or 1).
    pub async fn delete_annual_inflation(
        &self,
        country: &str,
        year: u16,
    ) -> Result<u64, StorageError> {
        let period = Period::Annual(year).to_string();

        let removed = retry("inflation_delete_annual", &self.retry, || async {
            let result = sqlx::query(
                "DELETE FROM inflation_observations WHERE country_code = ? AND period = ?",
            )
            .bind(country)
            .bind(&period)
            .execute(&self.pool)
            .await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })
        .await?;
        Ok(removed)
    }

    /// Does any monthly observation exist for this country within the year?
    pub async fn monthly_exists_in_year(
        &self,
        country: &str,
        year: u16,
    ) -> Result<bool, StorageError> {
        let lo = i64::from(year) * 100 + 1;
        let hi = i64::from(year) * 100 + 12;

        let found = retry("inflation_monthly_probe", &self.retry, || async {
            sqlx::query(
                "SELECT 1 FROM inflation_observations
                 WHERE country_code = ? AND period_key BETWEEN ? AND ? LIMIT 1",
            )
            .bind(country)
            .bind(lo)
            .bind(hi)
            .fetch_optional(&self.pool)
            .await
        })
        .await?;
        Ok(found.is_some())
    }

    pub async fn get_inflation(
        &self,
        country: &str,
        period: Period,
    ) -> Result<Option<f64>, StorageError> {
        let period = period.to_string();
        let row = retry("inflation_get", &self.retry, || async {
            sqlx::query(
                "SELECT value FROM inflation_observations WHERE country_code = ? AND period = ?",
            )
            .bind(country)
            .bind(&period)
            .fetch_optional(&self.pool)
            .await
        })
        .await?;
        Ok(row.map(|r| r.try_get("value").unwrap_or(f64::NAN)))
    }

    /// Most recent stored period at one granularity, or None when the table
    /// holds none. Annual keys are multiples of 100.
    pub async fn max_inflation_period(
        &self,
        granularity: Granularity,
    ) -> Result<Option<Period>, StorageError> {
        let sql = match granularity {
            Granularity::Annual => {
                "SELECT country_code, period FROM inflation_observations
                 WHERE period_key % 100 = 0 ORDER BY period_key DESC LIMIT 1"
            }
            Granularity::Monthly => {
                "SELECT country_code, period FROM inflation_observations
                 WHERE period_key % 100 <> 0 ORDER BY period_key DESC LIMIT 1"
            }
        };

        let row = retry("inflation_max_period", &self.retry, || async {
            sqlx::query(sql).fetch_optional(&self.pool).await
        })
        .await?;

        row.map(|r| parse_period_column(&r)).transpose()
    }

    // ════════════════════════════════════════════════════════════════════
    // Income observations
    // ════════════════════════════════════════════════════════════════════

    /// Insert, or merge the provided fields into an existing row.
    ///
    /// Fields absent from the record never null out stored values: each value
    /// column takes `COALESCE(incoming, stored)`.
    pub async fn merge_income(
        &self,
        rec: &IncomeObservation,
    ) -> Result<MergeOutcome, StorageError> {
        let existed = self.income_exists(&rec.country, rec.year).await?;

        let sql = if self.is_sqlite {
            "INSERT INTO income_observations
                (country_code, period, period_key, ppp_value, lcu_value, growth_rate)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(country_code, period) DO UPDATE SET
                ppp_value = COALESCE(excluded.ppp_value, income_observations.ppp_value),
                lcu_value = COALESCE(excluded.lcu_value, income_observations.lcu_value),
                growth_rate = COALESCE(excluded.growth_rate, income_observations.growth_rate)"
        } else {
            "INSERT INTO income_observations
                (country_code, period, period_key, ppp_value, lcu_value, growth_rate)
             VALUES (?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                ppp_value = COALESCE(VALUES(ppp_value), ppp_value),
                lcu_value = COALESCE(VALUES(lcu_value), lcu_value),
                growth_rate = COALESCE(VALUES(growth_rate), growth_rate)"
        };
        let period = Period::Annual(rec.year);
        let period_str = period.to_string();
        let key = i64::from(period.sort_key());

        retry("income_merge", &self.retry, || async {
            sqlx::query(sql)
                .bind(&rec.country)
                .bind(&period_str)
                .bind(key)
                .bind(rec.ppp)
                .bind(rec.lcu)
                .bind(rec.growth)
                .execute(&self.pool)
                .await?;
            Ok::<_, sqlx::Error>(())
        })
        .await?;

        Ok(if existed { MergeOutcome::Merged } else { MergeOutcome::Inserted })
    }

    pub async fn income_exists(&self, country: &str, year: u16) -> Result<bool, StorageError> {
        let period = Period::Annual(year).to_string();
        let found = retry("income_exists", &self.retry, || async {
            sqlx::query(
                "SELECT 1 FROM income_observations WHERE country_code = ? AND period = ? LIMIT 1",
            )
            .bind(country)
            .bind(&period)
            .fetch_optional(&self.pool)
            .await
        })
        .await?;
        Ok(found.is_some())
    }

    pub async fn get_income(
        &self,
        country: &str,
        year: u16,
    ) -> Result<Option<IncomeObservation>, StorageError> {
        let period = Period::Annual(year).to_string();
        let row = retry("income_get", &self.retry, || async {
            sqlx::query(
                "SELECT ppp_value, lcu_value, growth_rate FROM income_observations
                 WHERE country_code = ? AND period = ?",
            )
            .bind(country)
            .bind(&period)
            .fetch_optional(&self.pool)
            .await
        })
        .await?;

        Ok(row.map(|r| IncomeObservation {
            country: country.to_string(),
            year,
            ppp: r.try_get("ppp_value").ok(),
            lcu: r.try_get("lcu_value").ok(),
            growth: r.try_get("growth_rate").ok(),
        }))
    }

    /// Most recent stored income year.
    pub async fn max_income_year(&self) -> Result<Option<u16>, StorageError> {
        let row = retry("income_max_year", &self.retry, || async {
            sqlx::query(
                "SELECT country_code, period FROM income_observations
                 ORDER BY period_key DESC LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await
        })
        .await?;

        row.map(|r| parse_period_column(&r).map(|p| p.year())).transpose()
    }

    // ════════════════════════════════════════════════════════════════════
    // Wipes (full resync / admin only)
    // ════════════════════════════════════════════════════════════════════

    pub async fn wipe_inflation(&self) -> Result<u64, StorageError> {
        self.wipe("inflation_observations").await
    }

    pub async fn wipe_income(&self) -> Result<u64, StorageError> {
        self.wipe("income_observations").await
    }

    pub async fn wipe_countries(&self) -> Result<u64, StorageError> {
        self.wipe("countries").await
    }

    async fn wipe(&self, table: &'static str) -> Result<u64, StorageError> {
        let sql = format!("DELETE FROM {table}");
        let removed = retry("storage_wipe", &self.retry, || async {
            let result = sqlx::query(&sql).execute(&self.pool).await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })
        .await?;
        Ok(removed)
    }

    // ════════════════════════════════════════════════════════════════════
    // Counts
    // ════════════════════════════════════════════════════════════════════

    pub async fn count_inflation(&self) -> Result<u64, StorageError> {
        self.count("inflation_observations").await
    }

    pub async fn count_income(&self) -> Result<u64, StorageError> {
        self.count("income_observations").await
    }

    pub async fn count_countries(&self) -> Result<u64, StorageError> {
        self.count("countries").await
    }

    async fn count(&self, table: &'static str) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) AS cnt FROM {table}");
        let row = retry("storage_count", &self.retry, || async {
            sqlx::query(&sql).fetch_one(&self.pool).await
        })
        .await?;
        let count: i64 = row.try_get("cnt")?;
        Ok(count as u64)
    }
}

/// Read the `country_code` + `period` columns and parse the period.
fn parse_period_column(row: &AnyRow) -> Result<Period, StorageError> {
    let country = read_string(row, "country_code");
    let period = read_string(row, "period");
    period
        .parse()
        .map_err(|_| StorageError::CorruptPeriod { country, period })
}

/// String column read with the Any-driver BLOB fallback (MySQL TEXT).
pub(super) fn read_string(row: &AnyRow, col: &str) -> String {
    row.try_get::<String, _>(col)
        .ok()
        .or_else(|| {
            row.try_get::<Vec<u8>, _>(col)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
        .unwrap_or_default()
}
