// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation policy.
//!
//! Where both sources hold the same fact, the higher temporal resolution wins:
//! a monthly observation for a country+year supersedes (and deletes) any
//! annual observation for that country+year, and an annual ingest is skipped
//! outright when monthly data for the year is already on file. The country's
//! monthly-source flag only ever moves from `false` to `true`; the storage
//! layer's greatest-wins merge makes that safe under concurrent writers.
//!
//! The reconciler never executes SQL itself; every decision lands through
//! [`StorageGateway`]. The country-existence cache here is a best-effort
//! shortcut to skip redundant upserts; it can be stale or empty without
//! affecting correctness because every upsert is conflict-guarded anyway.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::debug;

use crate::metrics;
use crate::record::{display_name, IncomeObservation, InflationObservation};
use crate::storage::gateway::MergeOutcome;
use crate::storage::{StorageError, StorageGateway};

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new row was written.
    Added,
    /// The row already existed (or better data made the record redundant).
    Duplicate,
}

pub struct Reconciler {
    store: Arc<StorageGateway>,
    /// Codes with a known country row.
    known: DashSet<String>,
    /// Codes whose monthly-source flag is known to be set.
    known_monthly: DashSet<String>,
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<StorageGateway>) -> Self {
        Self { store, known: DashSet::new(), known_monthly: DashSet::new() }
    }

    /// Ingest one monthly inflation observation.
    ///
    /// Upserts the country with the monthly flag set, writes the observation,
    /// then deletes any annual row for the same country+year.
    pub async fn ingest_monthly(
        &self,
        obs: &InflationObservation,
    ) -> Result<IngestOutcome, StorageError> {
        self.ensure_country(&obs.country, true).await?;

        let added = self.store.upsert_inflation(obs).await?;

        let superseded = self.store.delete_annual_inflation(&obs.country, obs.period.year()).await?;
        if superseded > 0 {
            debug!(
                country = %obs.country,
                year = obs.period.year(),
                "annual observation superseded by monthly data"
            );
            metrics::record_supersede(superseded);
        }

        Ok(if added { IngestOutcome::Added } else { IngestOutcome::Duplicate })
    }

    /// Ingest one annual inflation observation.
    ///
    /// Skipped entirely (counted as a duplicate, without touching the
    /// country flag) when any monthly observation already exists in the year.
    pub async fn ingest_annual(
        &self,
        obs: &InflationObservation,
    ) -> Result<IngestOutcome, StorageError> {
        self.ensure_country(&obs.country, false).await?;

        if self.store.monthly_exists_in_year(&obs.country, obs.period.year()).await? {
            debug!(
                country = %obs.country,
                year = obs.period.year(),
                "skipping annual observation, monthly data on file"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        let added = self.store.upsert_inflation(obs).await?;
        Ok(if added { IngestOutcome::Added } else { IngestOutcome::Duplicate })
    }

    /// Ingest one assembled income record, merging into any existing row.
    pub async fn ingest_income(
        &self,
        rec: &IncomeObservation,
    ) -> Result<IngestOutcome, StorageError> {
        self.ensure_country(&rec.country, false).await?;

        let outcome = self.store.merge_income(rec).await?;
        Ok(match outcome {
            MergeOutcome::Inserted => IngestOutcome::Added,
            MergeOutcome::Merged => IngestOutcome::Duplicate,
        })
    }

    /// Create-or-refresh the country row unless the cache proves it redundant.
    ///
    /// A monthly-flagged call must reach storage until the flag is known set;
    /// afterwards both call shapes are skippable.
    async fn ensure_country(&self, code: &str, monthly: bool) -> Result<(), StorageError> {
        if monthly {
            if self.known_monthly.contains(code) {
                return Ok(());
            }
        } else if self.known.contains(code) {
            return Ok(());
        }

        let name = display_name(code).unwrap_or(code);
        self.store.upsert_country(code, name, monthly).await?;

        self.known.insert(code.to_string());
        if monthly {
            self.known_monthly.insert(code.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Period;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        PathBuf::from("temp").join(format!("reconcile_test_{name}.db"))
    }

    fn cleanup_db(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(format!("{}-wal", path.display()));
        let _ = std::fs::remove_file(format!("{}-shm", path.display()));
    }

    async fn open(name: &str) -> (Arc<StorageGateway>, PathBuf) {
        let path = temp_db_path(name);
        cleanup_db(&path);
        let _ = std::fs::create_dir_all("temp");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        (Arc::new(StorageGateway::connect(&url).await.unwrap()), path)
    }

    fn monthly(country: &str, year: u16, month: u8, value: f64) -> InflationObservation {
        InflationObservation {
            country: country.into(),
            period: Period::Monthly { year, month },
            value,
        }
    }

    fn annual(country: &str, year: u16, value: f64) -> InflationObservation {
        InflationObservation { country: country.into(), period: Period::Annual(year), value }
    }

    #[tokio::test]
    async fn test_monthly_supersedes_existing_annual() {
        let (store, path) = open("supersede").await;
        let reconciler = Reconciler::new(store.clone());

        reconciler.ingest_annual(&annual("DEU", 2021, 3.0)).await.unwrap();
        assert_eq!(store.get_inflation("DEU", Period::Annual(2021)).await.unwrap(), Some(3.0));

        let outcome = reconciler.ingest_monthly(&monthly("DEU", 2021, 6, 2.8)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Added);

        // Annual row is gone, monthly row exists
        assert_eq!(store.get_inflation("DEU", Period::Annual(2021)).await.unwrap(), None);
        assert_eq!(
            store.get_inflation("DEU", Period::Monthly { year: 2021, month: 6 }).await.unwrap(),
            Some(2.8)
        );

        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_annual_skipped_when_monthly_on_file() {
        let (store, path) = open("skip_annual").await;
        let reconciler = Reconciler::new(store.clone());

        reconciler.ingest_monthly(&monthly("DEU", 2021, 6, 2.8)).await.unwrap();

        let outcome = reconciler.ingest_annual(&annual("DEU", 2021, 3.0)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Duplicate);
        assert_eq!(store.get_inflation("DEU", Period::Annual(2021)).await.unwrap(), None);

        // A different year is unaffected by the 2021 monthly data
        let outcome = reconciler.ingest_annual(&annual("DEU", 2019, 1.4)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Added);

        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_flag_survives_later_annual_ingest() {
        let (store, path) = open("flag_monotonic").await;
        let reconciler = Reconciler::new(store.clone());

        reconciler.ingest_monthly(&monthly("DEU", 2021, 6, 2.8)).await.unwrap();
        assert_eq!(store.monthly_source_flag("DEU").await.unwrap(), Some(true));

        reconciler.ingest_annual(&annual("DEU", 2019, 1.4)).await.unwrap();
        assert_eq!(store.monthly_source_flag("DEU").await.unwrap(), Some(true));

        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_annual_then_monthly_upgrades_flag() {
        let (store, path) = open("flag_upgrade").await;
        let reconciler = Reconciler::new(store.clone());

        reconciler.ingest_annual(&annual("FRA", 2020, 0.5)).await.unwrap();
        assert_eq!(store.monthly_source_flag("FRA").await.unwrap(), Some(false));

        reconciler.ingest_monthly(&monthly("FRA", 2021, 1, 1.6)).await.unwrap();
        assert_eq!(store.monthly_source_flag("FRA").await.unwrap(), Some(true));

        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_duplicate_monthly_is_a_noop() {
        let (store, path) = open("dup_monthly").await;
        let reconciler = Reconciler::new(store.clone());

        let obs = monthly("JPN", 2022, 3, 0.9);
        assert_eq!(reconciler.ingest_monthly(&obs).await.unwrap(), IngestOutcome::Added);
        assert_eq!(reconciler.ingest_monthly(&obs).await.unwrap(), IngestOutcome::Duplicate);
        assert_eq!(store.count_inflation().await.unwrap(), 1);

        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_income_merge_outcomes() {
        let (store, path) = open("income").await;
        let reconciler = Reconciler::new(store.clone());

        let first = IncomeObservation {
            country: "USA".into(),
            year: 2021,
            ppp: Some(69000.0),
            lcu: None,
            growth: None,
        };
        assert_eq!(reconciler.ingest_income(&first).await.unwrap(), IngestOutcome::Added);

        let second = IncomeObservation {
            country: "USA".into(),
            year: 2021,
            ppp: None,
            lcu: None,
            growth: Some(5.5),
        };
        assert_eq!(reconciler.ingest_income(&second).await.unwrap(), IngestOutcome::Duplicate);

        let merged = store.get_income("USA", 2021).await.unwrap().unwrap();
        assert_eq!(merged.ppp, Some(69000.0));
        assert_eq!(merged.growth, Some(5.5));

        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_stale_cache_is_harmless() {
        let (store, path) = open("stale_cache").await;

        // Two reconcilers over the same store: each has a private cache that
        // never sees the other's writes.
        let a = Reconciler::new(store.clone());
        let b = Reconciler::new(store.clone());

        a.ingest_annual(&annual("DEU", 2020, 0.4)).await.unwrap();
        b.ingest_monthly(&monthly("DEU", 2021, 2, 1.9)).await.unwrap();
        a.ingest_annual(&annual("DEU", 2019, 1.4)).await.unwrap();

        assert_eq!(store.count_countries().await.unwrap(), 1);
        assert_eq!(store.monthly_source_flag("DEU").await.unwrap(), Some(true));
        assert_eq!(store.count_inflation().await.unwrap(), 3);

        cleanup_db(&path);
    }

    #[tokio::test]
    async fn test_unknown_area_named_by_code() {
        let (store, path) = open("unknown_area").await;
        let reconciler = Reconciler::new(store.clone());

        reconciler.ingest_annual(&annual("XKX", 2021, 3.4)).await.unwrap();

        let countries = store.list_countries().await.unwrap();
        assert_eq!(countries.len(), 1);
        assert_eq!(countries[0].code, "XKX");
        assert_eq!(countries[0].name, "XKX");

        cleanup_db(&path);
    }
}
