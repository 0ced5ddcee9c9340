// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read-side query surface.
//!
//! Everything the dashboard layer reads comes through here: country lists,
//! per-country series, rankings for a period, the combined inflation+income
//! view, and the set of available periods. Filters translate to parameterized
//! WHERE clauses; period ranges and ordering always go through `period_key`,
//! never through string comparison.

use sqlx::Row;
use tracing::warn;

use super::gateway::read_string;
use super::{StorageError, StorageGateway};
use crate::period::Period;
use crate::record::{IncomeObservation, InflationObservation};

/// Which observation table a dataset-scoped query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Inflation,
    Income,
}

impl Dataset {
    fn table(self) -> &'static str {
        match self {
            Self::Inflation => "inflation_observations",
            Self::Income => "income_observations",
        }
    }
}

/// Sortable columns. A closed set, never caller-supplied SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    Country,
    #[default]
    Period,
    Value,
}

impl SortKey {
    fn column(self) -> &'static str {
        match self {
            Self::Country => "country_code",
            Self::Period => "period_key",
            Self::Value => "value",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Filter for series and combined-view queries.
#[derive(Debug, Clone, Default)]
pub struct ObservationFilter {
    /// Restrict to these country codes (None = all).
    pub countries: Option<Vec<String>>,
    /// Inclusive period range; annual bounds cover their whole year.
    pub from: Option<Period>,
    pub to: Option<Period>,
    pub sort: SortKey,
    pub direction: SortDirection,
    pub offset: u64,
    pub limit: Option<u64>,
}

/// Metric for [`StorageGateway::ranking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMetric {
    Inflation,
    IncomePpp,
    IncomeLcu,
    IncomeGrowth,
}

impl RankingMetric {
    fn table_and_column(self) -> (&'static str, &'static str) {
        match self {
            Self::Inflation => ("inflation_observations", "value"),
            Self::IncomePpp => ("income_observations", "ppp_value"),
            Self::IncomeLcu => ("income_observations", "lcu_value"),
            Self::IncomeGrowth => ("income_observations", "growth_rate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub has_monthly_source: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    pub code: String,
    pub name: String,
    pub value: f64,
}

/// One row of the combined dashboard view: an inflation observation joined
/// with the income record of its year, where one exists.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRow {
    pub code: String,
    pub name: String,
    pub period: Period,
    pub inflation: f64,
    pub ppp: Option<f64>,
    pub lcu: Option<f64>,
    pub growth: Option<f64>,
}

/// A bind parameter for dynamically assembled clauses.
enum Bind {
    Text(String),
    Int(i64),
}

/// WHERE clause + binds for an [`ObservationFilter`], columns qualified with
/// `prefix` when joining.
fn filter_clause(filter: &ObservationFilter, prefix: &str) -> (String, Vec<Bind>) {
    let mut parts: Vec<String> = Vec::new();
    let mut binds: Vec<Bind> = Vec::new();

    if let Some(countries) = &filter.countries {
        let placeholders = vec!["?"; countries.len().max(1)].join(", ");
        parts.push(format!("{prefix}country_code IN ({placeholders})"));
        if countries.is_empty() {
            // An explicitly empty set matches nothing.
            binds.push(Bind::Text(String::new()));
        } else {
            binds.extend(countries.iter().map(|c| Bind::Text(c.clone())));
        }
    }
    if let Some(from) = filter.from {
        parts.push(format!("{prefix}period_key >= ?"));
        binds.push(Bind::Int(i64::from(from.start_key())));
    }
    if let Some(to) = filter.to {
        parts.push(format!("{prefix}period_key <= ?"));
        binds.push(Bind::Int(i64::from(to.end_key())));
    }

    let clause = if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    };
    (clause, binds)
}

fn paging_clause(filter: &ObservationFilter, binds: &mut Vec<Bind>) -> String {
    match (filter.limit, filter.offset) {
        (Some(limit), offset) => {
            binds.push(Bind::Int(limit as i64));
            binds.push(Bind::Int(offset as i64));
            " LIMIT ? OFFSET ?".to_string()
        }
        (None, 0) => String::new(),
        (None, offset) => {
            // OFFSET requires a LIMIT; use an effectively unbounded one.
            binds.push(Bind::Int(i64::MAX));
            binds.push(Bind::Int(offset as i64));
            " LIMIT ? OFFSET ?".to_string()
        }
    }
}

fn apply_binds<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s.as_str()),
            Bind::Int(i) => query.bind(*i),
        };
    }
    query
}

impl StorageGateway {
    /// All known countries, ordered by code.
    pub async fn list_countries(&self) -> Result<Vec<Country>, StorageError> {
        let rows =
            sqlx::query("SELECT code, name, has_monthly_source FROM countries ORDER BY code")
                .fetch_all(self.pool())
                .await?;

        Ok(rows
            .iter()
            .map(|row| Country {
                code: read_string(row, "code"),
                name: read_string(row, "name"),
                has_monthly_source: row.try_get::<i64, _>("has_monthly_source").unwrap_or(0) != 0,
            })
            .collect())
    }

    /// Distinct periods present in a dataset, in chronological order.
    pub async fn available_periods(&self, dataset: Dataset) -> Result<Vec<Period>, StorageError> {
        let sql = format!(
            "SELECT DISTINCT period, period_key FROM {} ORDER BY period_key",
            dataset.table()
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;

        let mut periods = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw = read_string(row, "period");
            match raw.parse() {
                Ok(period) => periods.push(period),
                Err(_) => warn!(period = raw, "skipping unparseable stored period"),
            }
        }
        Ok(periods)
    }

    /// Inflation observations matching a filter.
    pub async fn inflation_series(
        &self,
        filter: &ObservationFilter,
    ) -> Result<Vec<InflationObservation>, StorageError> {
        let (clause, mut binds) = filter_clause(filter, "");
        let mut sql = format!(
            "SELECT country_code, period, value FROM inflation_observations{clause} ORDER BY {} {}",
            filter.sort.column(),
            filter.direction.keyword(),
        );
        sql.push_str(&paging_clause(filter, &mut binds));

        let rows = apply_binds(sqlx::query(&sql), &binds).fetch_all(self.pool()).await?;

        let mut series = Vec::with_capacity(rows.len());
        for row in &rows {
            let country = read_string(row, "country_code");
            let period = read_string(row, "period");
            let period = period.parse().map_err(|_| StorageError::CorruptPeriod {
                country: country.clone(),
                period,
            })?;
            series.push(InflationObservation {
                country,
                period,
                value: row.try_get("value").unwrap_or(f64::NAN),
            });
        }
        Ok(series)
    }

    /// Full income series for one country, chronological.
    pub async fn income_series(
        &self,
        country: &str,
    ) -> Result<Vec<IncomeObservation>, StorageError> {
        let rows = sqlx::query(
            "SELECT period, ppp_value, lcu_value, growth_rate FROM income_observations
             WHERE country_code = ? ORDER BY period_key",
        )
        .bind(country)
        .fetch_all(self.pool())
        .await?;

        let mut series = Vec::with_capacity(rows.len());
        for row in &rows {
            let period = read_string(row, "period");
            let parsed: Period = period.parse().map_err(|_| StorageError::CorruptPeriod {
                country: country.to_string(),
                period,
            })?;
            series.push(IncomeObservation {
                country: country.to_string(),
                year: parsed.year(),
                ppp: row.try_get("ppp_value").ok(),
                lcu: row.try_get("lcu_value").ok(),
                growth: row.try_get("growth_rate").ok(),
            });
        }
        Ok(series)
    }

    /// Country ranking for one metric at one period.
    pub async fn ranking(
        &self,
        metric: RankingMetric,
        period: Period,
        direction: SortDirection,
        limit: u64,
    ) -> Result<Vec<RankingEntry>, StorageError> {
        let (table, column) = metric.table_and_column();
        let sql = format!(
            "SELECT o.country_code, c.name, o.{column} AS metric_value
             FROM {table} o
             JOIN countries c ON c.code = o.country_code
             WHERE o.period = ? AND o.{column} IS NOT NULL
             ORDER BY metric_value {}
             LIMIT ?",
            direction.keyword(),
        );
        let period = period.to_string();

        let rows = sqlx::query(&sql)
            .bind(&period)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await?;

        Ok(rows
            .iter()
            .map(|row| RankingEntry {
                code: read_string(row, "country_code"),
                name: read_string(row, "name"),
                value: row.try_get("metric_value").unwrap_or(f64::NAN),
            })
            .collect())
    }

    /// Combined view: inflation rows joined with the income record of their
    /// year, filtered and sorted like a series query.
    pub async fn combined_view(
        &self,
        filter: &ObservationFilter,
    ) -> Result<Vec<CombinedRow>, StorageError> {
        let (clause, mut binds) = filter_clause(filter, "f.");
        let mut sql = format!(
            "SELECT f.country_code, c.name, f.period, f.value AS inflation,
                    i.ppp_value, i.lcu_value, i.growth_rate
             FROM inflation_observations f
             JOIN countries c ON c.code = f.country_code
             LEFT JOIN income_observations i
               ON i.country_code = f.country_code AND i.period = SUBSTR(f.period, 1, 4)
             {clause} ORDER BY f.{} {}",
            filter.sort.column(),
            filter.direction.keyword(),
        );
        sql.push_str(&paging_clause(filter, &mut binds));

        let rows = apply_binds(sqlx::query(&sql), &binds).fetch_all(self.pool()).await?;

        let mut view = Vec::with_capacity(rows.len());
        for row in &rows {
            let code = read_string(row, "country_code");
            let period = read_string(row, "period");
            let period = period.parse().map_err(|_| StorageError::CorruptPeriod {
                country: code.clone(),
                period,
            })?;
            view.push(CombinedRow {
                code,
                name: read_string(row, "name"),
                period,
                inflation: row.try_get("inflation").unwrap_or(f64::NAN),
                ppp: row.try_get("ppp_value").ok(),
                lcu: row.try_get("lcu_value").ok(),
                growth: row.try_get("growth_rate").ok(),
            });
        }
        Ok(view)
    }
}
