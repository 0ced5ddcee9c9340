//! Persistence layer.
//!
//! [`StorageGateway`] is the only component that touches the database; the
//! reconciler and the read-side query surface both go through it. Every
//! mutation is idempotent at the row level (conflict-guarded upsert or
//! existence-checked merge) so overlapping batches can only no-op, never
//! corrupt.

pub mod gateway;
pub mod queries;

pub use gateway::{MergeOutcome, StorageGateway};
pub use queries::{
    CombinedRow, Country, Dataset, ObservationFilter, RankingEntry, RankingMetric, SortDirection,
    SortKey,
};

use thiserror::Error;

use crate::resilience::RetryError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error(transparent)]
    RetriesExhausted(#[from] RetryError<sqlx::Error>),
    #[error("corrupt period '{period}' stored for '{country}'")]
    CorruptPeriod { country: String, period: String },
}
