//! # Indicator Sync
//!
//! An ingestion and reconciliation pipeline for country-level economic
//! indicators (inflation, income), feeding a dashboard's SQL store from two
//! upstream providers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Sync Orchestrator                      │
//! │  • Resume point recomputed from storage every run           │
//! │  • Sequential period windows, batched concurrent writes     │
//! └─────────────────────────────────────────────────────────────┘
//!               │                               │
//!               ▼                               ▼
//! ┌─────────────────────────┐     ┌─────────────────────────────┐
//! │   Monthly SDMX source   │     │    Annual bulk source       │
//! │  • Windowed XML queries │     │  • ZIP → API*.csv table     │
//! │  • 429 backoff          │     │  • 429 backoff              │
//! └─────────────────────────┘     └─────────────────────────────┘
//!               │                               │
//!               ▼                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Decoders → Validator → Reconciler              │
//! │  • Pure format decoding (SDMX XML, bulk CSV)                │
//! │  • Reject malformed records, never abort the batch          │
//! │  • Monthly beats annual per country+year                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Storage Gateway                        │
//! │  • SQLite / MySQL via sqlx Any driver                       │
//! │  • Idempotent conflict-guarded upserts, retry-wrapped       │
//! │  • Read queries for the dashboard layer                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use indicator_sync::{SyncConfig, SyncPipeline};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SyncConfig {
//!         database_url: "sqlite:dashboard.db?mode=rwc".into(),
//!         ..Default::default()
//!     };
//!
//!     let pipeline = SyncPipeline::connect(config).await.expect("storage unavailable");
//!
//!     // Incremental "update all": resumes where the last run stopped
//!     let summary = pipeline.sync_all().await.expect("sync failed");
//!     println!("added {} records", summary.combined().added);
//!
//!     // Read side, as consumed by the dashboard
//!     let countries = pipeline.store().list_countries().await.unwrap();
//!     println!("{} countries on file", countries.len());
//! }
//! ```
//!
//! ## Reconciliation policy
//!
//! Monthly data is strictly more informative than annual data. Where a
//! monthly observation exists for a country+year, the annual observation for
//! that year is deleted (or never inserted), and the country is permanently
//! marked as monthly-sourced. Re-importing coarse data can never undo either.
//!
//! ## Modules
//!
//! - [`sync`]: the [`SyncPipeline`] orchestrating runs end to end
//! - [`source`]: upstream clients with rate-limit backoff
//! - [`decode`]: pure XML/CSV decoders
//! - [`validate`]: record validation ahead of any write
//! - [`reconcile`]: the cross-source priority policy
//! - [`storage`]: the SQL gateway and the read-side query surface
//! - [`period`]: tagged annual/monthly periods with explicit ordering
//! - [`resilience`]: retry plumbing shared by the storage layer
//! - [`admin`]: shared-secret gate for mutating operations

pub mod admin;
pub mod config;
pub mod decode;
pub mod metrics;
pub mod period;
pub mod reconcile;
pub mod record;
pub mod resilience;
pub mod source;
pub mod storage;
pub mod sync;
pub mod validate;

pub use admin::{AdminError, AdminGate};
pub use config::{BackoffConfig, BulkSourceConfig, MonthlySourceConfig, SyncConfig};
pub use decode::{decode_bulk_csv, decode_sdmx, BulkTable, DecodeError};
pub use period::{Granularity, Period, PeriodParseError};
pub use reconcile::{IngestOutcome, Reconciler};
pub use record::{IncomeObservation, InflationObservation, RawObservation};
pub use source::{
    AnnualTableSource, BulkClient, Indicator, MonthlySeriesSource, SdmxClient, SourceError,
};
pub use storage::{
    CombinedRow, Country, Dataset, ObservationFilter, RankingEntry, RankingMetric, SortDirection,
    SortKey, StorageError, StorageGateway,
};
pub use sync::{DatasetSummary, InflationSummary, SyncError, SyncPipeline, SyncSummary};
pub use validate::{PeriodPolicy, RejectReason, Rejection};
