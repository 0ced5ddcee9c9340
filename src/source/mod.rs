// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Upstream source clients.
//!
//! Two providers feed the pipeline:
//!
//! - the **monthly series source** ([`SdmxClient`]): an SDMX-style XML API
//!   queried per window over a fixed area list;
//! - the **annual bulk source** ([`BulkClient`]): one ZIP download per
//!   indicator containing an `API*.csv` table.
//!
//! Both honor the same rate-limit contract: HTTP 429 retries with exponential
//! backoff (`base × multiplier^attempt`) up to a fixed attempt budget, then
//! fails hard; any other non-2xx response fails immediately with the status
//! and response headers logged.
//!
//! The orchestrator talks to the [`MonthlySeriesSource`] / [`AnnualTableSource`]
//! traits so tests can substitute in-memory fakes.

pub mod bulk;
pub mod sdmx;

pub use bulk::BulkClient;
pub use sdmx::SdmxClient;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::BackoffConfig;
use crate::decode::DecodeError;
use crate::period::Period;
use crate::record::RawObservation;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate limited: gave up after {attempts} attempts")]
    RateLimited { attempts: usize },
    #[error("unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("no API*.csv entry in archive")]
    MissingEntry,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An upstream indicator series. Closed set: the pipeline ingests exactly
/// these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    /// Consumer price inflation, annual percent.
    InflationAnnual,
    /// Per-capita income, PPP-adjusted.
    IncomePpp,
    /// Per-capita income, local currency units.
    IncomeLcu,
    /// Per-capita income growth, annual percent.
    IncomeGrowth,
}

impl Indicator {
    /// The upstream series code used in download URLs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InflationAnnual => "FP.CPI.TOTL.ZG",
            Self::IncomePpp => "NY.GDP.PCAP.PP.CD",
            Self::IncomeLcu => "NY.GDP.PCAP.CN",
            Self::IncomeGrowth => "NY.GDP.PCAP.KD.ZG",
        }
    }

    /// The three income indicators, in merge order.
    #[must_use]
    pub fn income() -> [Self; 3] {
        [Self::IncomePpp, Self::IncomeLcu, Self::IncomeGrowth]
    }
}

/// The windowed high-frequency source.
#[async_trait]
pub trait MonthlySeriesSource: Send + Sync {
    /// Fetch all observations for the configured area list over an inclusive
    /// period window.
    async fn fetch_window(
        &self,
        start: Period,
        end: Period,
    ) -> Result<Vec<RawObservation>, SourceError>;
}

/// The bulk low-frequency source.
#[async_trait]
pub trait AnnualTableSource: Send + Sync {
    /// Download one indicator table, dropping rows before `min_year`.
    async fn fetch_indicator(
        &self,
        indicator: Indicator,
        min_year: u16,
    ) -> Result<Vec<RawObservation>, SourceError>;
}

/// GET with 429-aware exponential backoff.
///
/// 429 is a scheduling signal, not an error: sleep `base × multiplier^attempt`
/// and retry, failing only once `max_attempts` responses have all been 429.
/// Any other non-2xx response is terminal and logged with its headers.
pub(crate) async fn fetch_with_backoff(
    http: &reqwest::Client,
    url: &str,
    backoff: &BackoffConfig,
) -> Result<Response, SourceError> {
    let mut attempts = 0;

    loop {
        let response = http.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            attempts += 1;
            if attempts >= backoff.max_attempts {
                return Err(SourceError::RateLimited { attempts });
            }
            let delay = backoff.delay_for(attempts - 1);
            warn!(url, attempt = attempts, "rate limited, backing off {delay:?}");
            sleep(delay).await;
            continue;
        }

        error!(
            url,
            status = %status,
            headers = ?response.headers(),
            "upstream returned non-success status"
        );
        return Err(SourceError::Status { status, url: url.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_codes_are_distinct() {
        let codes = [
            Indicator::InflationAnnual.code(),
            Indicator::IncomePpp.code(),
            Indicator::IncomeLcu.code(),
            Indicator::IncomeGrowth.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_income_indicators_exclude_inflation() {
        assert!(!Indicator::income().contains(&Indicator::InflationAnnual));
    }
}
