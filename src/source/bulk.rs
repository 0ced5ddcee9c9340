// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Annual bulk source client.
//!
//! One download per indicator: a ZIP archive whose payload is a single
//! `API*.csv` table (plus metadata CSVs that are ignored). The whole table
//! comes down on every run; rows before the caller's minimum year are dropped
//! here so the reconciler never sees them.

use std::io::{Cursor, Read};

use async_trait::async_trait;
use tracing::debug;
use zip::ZipArchive;

use super::{fetch_with_backoff, AnnualTableSource, Indicator, SourceError};
use crate::config::BulkSourceConfig;
use crate::decode::decode_bulk_csv;
use crate::record::RawObservation;

/// HTTP client for the bulk ZIP endpoint.
pub struct BulkClient {
    http: reqwest::Client,
    config: BulkSourceConfig,
}

impl BulkClient {
    #[must_use]
    pub fn new(config: BulkSourceConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    fn indicator_url(&self, indicator: Indicator) -> String {
        self.config.download_url.replace("{indicator}", indicator.code())
    }
}

/// Locate and read the one `API*.csv` entry of a bulk archive.
///
/// Archives also contain `Metadata_*.csv` entries; only the `API` table holds
/// the observations.
pub(crate) fn extract_bulk_csv(bytes: &[u8]) -> Result<String, SourceError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let entry_name = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|e| e.name().to_string()))
        .find(|name| name.starts_with("API") && name.ends_with(".csv"))
        .ok_or(SourceError::MissingEntry)?;

    let mut entry = archive.by_name(&entry_name)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

#[async_trait]
impl AnnualTableSource for BulkClient {
    async fn fetch_indicator(
        &self,
        indicator: Indicator,
        min_year: u16,
    ) -> Result<Vec<RawObservation>, SourceError> {
        let url = self.indicator_url(indicator);
        debug!(?indicator, min_year, "downloading bulk indicator");

        let response = fetch_with_backoff(&self.http, &url, &self.config.backoff).await?;
        let bytes = response.bytes().await?;
        let text = extract_bulk_csv(&bytes)?;
        let table = decode_bulk_csv(&text)?;

        debug!(
            ?indicator,
            decoded = table.records.len(),
            omitted = table.omitted,
            "bulk indicator decoded"
        );

        // Keep unparseable periods: the validator rejects and counts them.
        let records = table
            .records
            .into_iter()
            .filter(|r| match r.period.parse::<u16>() {
                Ok(year) => year >= min_year,
                Err(_) => true,
            })
            .collect();
        Ok(records)
    }
}
