// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync orchestration.
//!
//! [`SyncPipeline`] drives each dataset from its resume point to "now":
//!
//! ```text
//! resume point → ┌─ fetch window ─ decode ─ validate ─ reconcile ─ upsert ─┐ → summary
//!                └──────────────── next window ◄──────────────────────────┘
//! ```
//!
//! The resume point is always recomputed from storage (the successor of the
//! max stored period per granularity); there is no cursor table, so a run
//! that crashes mid-way restarts cleanly and re-covers only the unfinished
//! tail. Windows advance strictly sequentially; records inside a window are
//! written in fixed-size batches with settled-fan-out semantics, so one bad
//! record costs one error count, never its batch or the run.
//!
//! Fatal failures (source unreachable after backoff, undecodable document)
//! abort the run; whatever was committed stays, and the next run resumes
//! past it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::metrics;
use crate::period::{Granularity, Period};
use crate::reconcile::{IngestOutcome, Reconciler};
use crate::record::{IncomeObservation, InflationObservation};
use crate::source::{
    AnnualTableSource, BulkClient, Indicator, MonthlySeriesSource, SdmxClient, SourceError,
};
use crate::storage::{StorageError, StorageGateway};
use crate::validate::{
    check_income, validate_income_cell, validate_inflation, PeriodPolicy,
};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("source failure: {0}")]
    Source(#[from] SourceError),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// Per-source run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    /// Records decoded from the source.
    pub read: usize,
    /// Rows actually written.
    pub added: usize,
    /// Duplicates and cross-source-superseded records.
    pub skipped: usize,
    /// Validator rejections and per-record write failures.
    pub errors: usize,
}

impl DatasetSummary {
    fn record(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Added => self.added += 1,
            IngestOutcome::Duplicate => self.skipped += 1,
        }
    }

    #[must_use]
    pub fn merged(self, other: Self) -> Self {
        Self {
            read: self.read + other.read,
            added: self.added + other.added,
            skipped: self.skipped + other.skipped,
            errors: self.errors + other.errors,
        }
    }
}

/// Inflation runs both sources; the parts stay visible separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InflationSummary {
    pub monthly: DatasetSummary,
    pub annual: DatasetSummary,
}

impl InflationSummary {
    #[must_use]
    pub fn combined(&self) -> DatasetSummary {
        self.monthly.merged(self.annual)
    }
}

/// Result of an "update all" run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub run_id: String,
    pub inflation: InflationSummary,
    pub income: DatasetSummary,
}

impl SyncSummary {
    #[must_use]
    pub fn combined(&self) -> DatasetSummary {
        self.inflation.combined().merged(self.income)
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    store: Arc<StorageGateway>,
    reconciler: Arc<Reconciler>,
    monthly_source: Arc<dyn MonthlySeriesSource>,
    annual_source: Arc<dyn AnnualTableSource>,
    /// Most recent "update all" summary, for the dashboard's status panel.
    last_summary: RwLock<Option<SyncSummary>>,
}

impl SyncPipeline {
    /// Assemble a pipeline over existing collaborators (tests pass fakes
    /// for the two sources).
    #[must_use]
    pub fn new(
        config: SyncConfig,
        store: Arc<StorageGateway>,
        monthly_source: Arc<dyn MonthlySeriesSource>,
        annual_source: Arc<dyn AnnualTableSource>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(store.clone()));
        Self {
            config,
            store,
            reconciler,
            monthly_source,
            annual_source,
            last_summary: RwLock::new(None),
        }
    }

    /// Connect storage and build HTTP clients from the configuration.
    pub async fn connect(config: SyncConfig) -> Result<Self, StorageError> {
        let store = Arc::new(StorageGateway::connect(&config.database_url).await?);
        let monthly = Arc::new(SdmxClient::new(config.monthly.clone()));
        let bulk = Arc::new(BulkClient::new(config.bulk.clone()));
        Ok(Self::new(config, store, monthly, bulk))
    }

    /// Read-side access for the dashboard layer.
    #[must_use]
    pub fn store(&self) -> &Arc<StorageGateway> {
        &self.store
    }

    #[must_use]
    pub fn last_summary(&self) -> Option<SyncSummary> {
        self.last_summary.read().clone()
    }

    // ════════════════════════════════════════════════════════════════════
    // Dataset runs
    // ════════════════════════════════════════════════════════════════════

    /// Incremental inflation sync: windowed monthly source, then the annual
    /// bulk table.
    pub async fn sync_inflation(&self) -> Result<InflationSummary, SyncError> {
        let start = Instant::now();
        let result = self.run_inflation().await;
        match &result {
            Ok(summary) => {
                info!(?summary, "inflation sync finished");
                metrics::record_run("inflation", "ok", start);
            }
            Err(err) => {
                warn!(error = %err, "inflation sync aborted");
                metrics::record_run("inflation", "failed", start);
            }
        }
        result
    }

    async fn run_inflation(&self) -> Result<InflationSummary, SyncError> {
        let monthly = self.sync_monthly_inflation().await?;
        let annual = self.sync_annual_inflation().await?;
        Ok(InflationSummary { monthly, annual })
    }

    /// Incremental income sync from the three bulk indicators.
    pub async fn sync_income(&self) -> Result<DatasetSummary, SyncError> {
        let start = Instant::now();
        let result = self.run_income().await;
        match &result {
            Ok(summary) => {
                info!(?summary, "income sync finished");
                metrics::record_run("income", "ok", start);
            }
            Err(err) => {
                warn!(error = %err, "income sync aborted");
                metrics::record_run("income", "failed", start);
            }
        }
        result
    }

    /// Update both datasets and retain the summary.
    pub async fn sync_all(&self) -> Result<SyncSummary, SyncError> {
        let summary = SyncSummary {
            run_id: Uuid::new_v4().to_string(),
            inflation: self.sync_inflation().await?,
            income: self.sync_income().await?,
        };
        *self.last_summary.write() = Some(summary.clone());
        Ok(summary)
    }

    // ════════════════════════════════════════════════════════════════════
    // Full resync (destructive)
    // ════════════════════════════════════════════════════════════════════

    /// Wipe inflation observations and re-run from the epoch.
    pub async fn resync_inflation(&self) -> Result<InflationSummary, SyncError> {
        let removed = self.store.wipe_inflation().await?;
        info!(removed, "inflation observations wiped for resync");
        self.sync_inflation().await
    }

    /// Wipe income observations and re-run from the epoch.
    pub async fn resync_income(&self) -> Result<DatasetSummary, SyncError> {
        let removed = self.store.wipe_income().await?;
        info!(removed, "income observations wiped for resync");
        self.sync_income().await
    }

    /// Wipe everything, both observation tables and the countries, then
    /// run a full "update all" from the epochs.
    pub async fn resync_all(&self) -> Result<SyncSummary, SyncError> {
        let inflation = self.store.wipe_inflation().await?;
        let income = self.store.wipe_income().await?;
        let countries = self.store.wipe_countries().await?;
        info!(inflation, income, countries, "all data wiped for full resync");

        let summary = SyncSummary {
            run_id: Uuid::new_v4().to_string(),
            inflation: self.sync_inflation().await?,
            income: self.sync_income().await?,
        };
        *self.last_summary.write() = Some(summary.clone());
        Ok(summary)
    }

    // ════════════════════════════════════════════════════════════════════
    // Monthly windowed loop
    // ════════════════════════════════════════════════════════════════════

    async fn sync_monthly_inflation(&self) -> Result<DatasetSummary, SyncError> {
        let mut summary = DatasetSummary::default();

        let resume = match self.store.max_inflation_period(Granularity::Monthly).await? {
            Some(max) => max.next(),
            None => self.config.monthly.epoch,
        };
        metrics::set_resume_point("inflation", "monthly", resume.sort_key());

        let now = Period::current_monthly();
        if resume > now {
            info!(%resume, "monthly inflation already current");
            return Ok(summary);
        }
        info!(%resume, %now, "monthly inflation sync starting");

        let window = self.config.monthly.window_months.max(1);
        let mut cursor = resume;

        while cursor <= now {
            let end = cursor.advance(window - 1).min(now);

            let fetch_started = Instant::now();
            let raw = self.monthly_source.fetch_window(cursor, end).await?;
            metrics::record_fetch("monthly");
            metrics::record_fetch_seconds("monthly", fetch_started);
            metrics::record_read("inflation", "monthly", raw.len());
            summary.read += raw.len();

            let mut valid = Vec::with_capacity(raw.len());
            for record in &raw {
                match validate_inflation(record, PeriodPolicy::MonthlyOnly) {
                    Ok(obs) => valid.push(obs),
                    Err(rejection) => {
                        summary.errors += 1;
                        metrics::record_rejection("inflation", rejection.reason.to_string());
                    }
                }
            }

            self.write_inflation_batches(valid, true, &mut summary).await;
            cursor = end.next();
        }

        Ok(summary)
    }

    // ════════════════════════════════════════════════════════════════════
    // Annual bulk passes
    // ════════════════════════════════════════════════════════════════════

    async fn sync_annual_inflation(&self) -> Result<DatasetSummary, SyncError> {
        let mut summary = DatasetSummary::default();

        let min_year = match self.store.max_inflation_period(Granularity::Annual).await? {
            Some(max) => max.year() + 1,
            None => self.config.bulk.epoch_year,
        };
        metrics::set_resume_point("inflation", "bulk", u32::from(min_year) * 100);
        info!(min_year, "annual inflation sync starting");

        let fetch_started = Instant::now();
        let raw = self
            .annual_source
            .fetch_indicator(Indicator::InflationAnnual, min_year)
            .await?;
        metrics::record_fetch("bulk");
        metrics::record_fetch_seconds("bulk", fetch_started);
        metrics::record_read("inflation", "bulk", raw.len());
        summary.read += raw.len();

        let mut valid = Vec::with_capacity(raw.len());
        for record in &raw {
            match validate_inflation(record, PeriodPolicy::AnnualOnly) {
                Ok(obs) => valid.push(obs),
                Err(rejection) => {
                    summary.errors += 1;
                    metrics::record_rejection("inflation", rejection.reason.to_string());
                }
            }
        }

        self.write_inflation_batches(valid, false, &mut summary).await;
        Ok(summary)
    }

    async fn run_income(&self) -> Result<DatasetSummary, SyncError> {
        let mut summary = DatasetSummary::default();

        let min_year = match self.store.max_income_year().await? {
            Some(max) => max + 1,
            None => self.config.bulk.epoch_year,
        };
        metrics::set_resume_point("income", "bulk", u32::from(min_year) * 100);
        info!(min_year, "income sync starting");

        // Assemble one record per (country, year) from the three indicators.
        let mut assembled: HashMap<(String, u16), IncomeObservation> = HashMap::new();
        for indicator in Indicator::income() {
            let fetch_started = Instant::now();
            let raw = self.annual_source.fetch_indicator(indicator, min_year).await?;
            metrics::record_fetch("bulk");
            metrics::record_fetch_seconds("bulk", fetch_started);
            metrics::record_read("income", "bulk", raw.len());
            summary.read += raw.len();

            for record in &raw {
                match validate_income_cell(record) {
                    Ok((area, year, value)) => {
                        let entry = assembled
                            .entry((area.clone(), year))
                            .or_insert_with(|| IncomeObservation {
                                country: area,
                                year,
                                ppp: None,
                                lcu: None,
                                growth: None,
                            });
                        match indicator {
                            Indicator::IncomePpp => entry.ppp = Some(value),
                            Indicator::IncomeLcu => entry.lcu = Some(value),
                            Indicator::IncomeGrowth => entry.growth = Some(value),
                            Indicator::InflationAnnual => {}
                        }
                    }
                    Err(rejection) => {
                        summary.errors += 1;
                        metrics::record_rejection("income", rejection.reason.to_string());
                    }
                }
            }
        }

        let mut records: Vec<IncomeObservation> = Vec::with_capacity(assembled.len());
        for (_, record) in assembled {
            match check_income(record) {
                Ok(record) => records.push(record),
                Err(rejection) => {
                    summary.errors += 1;
                    metrics::record_rejection("income", rejection.reason.to_string());
                }
            }
        }
        // HashMap order is arbitrary; keep writes deterministic.
        records.sort_by(|a, b| a.country.cmp(&b.country).then(a.year.cmp(&b.year)));

        self.write_income_batches(records, &mut summary).await;
        Ok(summary)
    }

    // ════════════════════════════════════════════════════════════════════
    // Batched writes (settled fan-out)
    // ════════════════════════════════════════════════════════════════════

    async fn write_inflation_batches(
        &self,
        records: Vec<InflationObservation>,
        monthly: bool,
        summary: &mut DatasetSummary,
    ) {
        let batch_size = self.config.batch_size.max(1);

        for chunk in records.chunks(batch_size) {
            let mut tasks = JoinSet::new();
            for obs in chunk {
                let reconciler = self.reconciler.clone();
                let obs = obs.clone();
                tasks.spawn(async move {
                    let result = if monthly {
                        reconciler.ingest_monthly(&obs).await
                    } else {
                        reconciler.ingest_annual(&obs).await
                    };
                    (obs, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(outcome))) => {
                        summary.record(outcome);
                        metrics::record_outcome(
                            "inflation",
                            if outcome == IngestOutcome::Added { "added" } else { "duplicate" },
                        );
                    }
                    Ok((obs, Err(err))) => {
                        summary.errors += 1;
                        metrics::record_outcome("inflation", "error");
                        warn!(
                            country = %obs.country,
                            period = %obs.period,
                            error = %err,
                            "inflation record write failed"
                        );
                    }
                    Err(join_err) => {
                        summary.errors += 1;
                        metrics::record_outcome("inflation", "error");
                        warn!(error = %join_err, "inflation write task panicked");
                    }
                }
            }
        }
    }

    async fn write_income_batches(
        &self,
        records: Vec<IncomeObservation>,
        summary: &mut DatasetSummary,
    ) {
        let batch_size = self.config.batch_size.max(1);

        for chunk in records.chunks(batch_size) {
            let mut tasks = JoinSet::new();
            for record in chunk {
                let reconciler = self.reconciler.clone();
                let record = record.clone();
                tasks.spawn(async move {
                    let result = reconciler.ingest_income(&record).await;
                    (record, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(outcome))) => {
                        summary.record(outcome);
                        metrics::record_outcome(
                            "income",
                            if outcome == IngestOutcome::Added { "added" } else { "duplicate" },
                        );
                    }
                    Ok((record, Err(err))) => {
                        summary.errors += 1;
                        metrics::record_outcome("income", "error");
                        warn!(
                            country = %record.country,
                            year = record.year,
                            error = %err,
                            "income record write failed"
                        );
                    }
                    Err(join_err) => {
                        summary.errors += 1;
                        metrics::record_outcome("income", "error");
                        warn!(error = %join_err, "income write task panicked");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_merge() {
        let a = DatasetSummary { read: 10, added: 6, skipped: 3, errors: 1 };
        let b = DatasetSummary { read: 4, added: 2, skipped: 2, errors: 0 };
        let merged = a.merged(b);
        assert_eq!(merged, DatasetSummary { read: 14, added: 8, skipped: 5, errors: 1 });
    }

    #[test]
    fn test_inflation_summary_combined() {
        let summary = InflationSummary {
            monthly: DatasetSummary { read: 12, added: 12, skipped: 0, errors: 0 },
            annual: DatasetSummary { read: 5, added: 3, skipped: 2, errors: 0 },
        };
        let combined = summary.combined();
        assert_eq!(combined.read, 17);
        assert_eq!(combined.added, 15);
        assert_eq!(combined.skipped, 2);
    }

    #[test]
    fn test_record_outcomes() {
        let mut summary = DatasetSummary::default();
        summary.record(IngestOutcome::Added);
        summary.record(IngestOutcome::Added);
        summary.record(IngestOutcome::Duplicate);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.skipped, 1);
    }
}
