// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Monthly series client.
//!
//! Queries the statistics-agency API for a fixed coded area list over an
//! inclusive period window. The window size is the caller's concern: the
//! orchestrator bounds it to respect the source's request-volume budget.

use async_trait::async_trait;
use tracing::debug;

use super::{fetch_with_backoff, MonthlySeriesSource, SourceError};
use crate::config::MonthlySourceConfig;
use crate::decode::decode_sdmx;
use crate::period::Period;
use crate::record::RawObservation;

/// HTTP client for the windowed SDMX endpoint.
pub struct SdmxClient {
    http: reqwest::Client,
    config: MonthlySourceConfig,
}

impl SdmxClient {
    #[must_use]
    pub fn new(config: MonthlySourceConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    /// Expand the URL template for one window.
    ///
    /// `{areas}` becomes the `+`-joined area list; `{start}` / `{end}` become
    /// canonical period strings.
    fn window_url(&self, start: Period, end: Period) -> String {
        self.config
            .series_url
            .replace("{areas}", &self.config.areas.join("+"))
            .replace("{start}", &start.to_string())
            .replace("{end}", &end.to_string())
    }
}

#[async_trait]
impl MonthlySeriesSource for SdmxClient {
    async fn fetch_window(
        &self,
        start: Period,
        end: Period,
    ) -> Result<Vec<RawObservation>, SourceError> {
        let url = self.window_url(start, end);
        debug!(%start, %end, "fetching monthly window");

        let response = fetch_with_backoff(&self.http, &url, &self.config.backoff).await?;
        let body = response.bytes().await?;
        let records = decode_sdmx(&body)?;

        debug!(%start, %end, count = records.len(), "monthly window decoded");
        Ok(records)
    }
}
