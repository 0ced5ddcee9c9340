// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic for transient storage failures.
//!
//! Every storage call goes through [`retry`], which re-runs the operation on
//! any error up to the configured bound and, on exhaustion, returns a
//! structured [`RetryError`] carrying the operation name, the attempt count,
//! and the original cause. The cause chain stays intact for `source()`
//! walkers instead of being flattened into a diagnostic string.
//!
//! # Example
//!
//! ```
//! use indicator_sync::resilience::RetryConfig;
//!
//! // Startup: fail fast on bad connection strings
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_attempts, 5);
//!
//! // Per-operation: fixed short delay, then hand the error to the caller
//! let storage = RetryConfig::storage();
//! assert_eq!(storage.max_attempts, 3);
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

/// An operation that kept failing after its retry budget was spent.
///
/// The final underlying error is preserved as the source; intermediate
/// failures are logged as they happen.
#[derive(Error, Debug)]
#[error("operation '{op}' failed after {attempts} attempts")]
pub struct RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub op: &'static str,
    pub attempts: usize,
    #[source]
    pub source: E,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::storage()
    }
}

impl RetryConfig {
    /// Fast-fail retry for initial pool construction.
    /// Five attempts with exponential backoff, failing after a few seconds so
    /// configuration errors surface at startup rather than mid-run.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Per-operation retry: three attempts with a fixed short delay.
    /// Covers connection hiccups; anything persistent is the caller's problem.
    #[must_use]
    pub fn storage() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(250),
            factor: 1.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

pub async fn retry<F, Fut, T, E>(
    op: &'static str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(op, attempts, "operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(source) => {
                attempts += 1;

                if attempts >= config.max_attempts {
                    return Err(RetryError { op, attempts, source });
                }

                warn!(
                    op,
                    attempt = attempts,
                    max = config.max_attempts,
                    error = %source,
                    "operation failed, retrying in {delay:?}"
                );

                sleep(delay).await;
                delay = delay.mul_f64(config.factor).min(config.max_delay);
            }
        }
    }
}
