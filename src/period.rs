// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Observation periods at two granularities.
//!
//! Upstream sources mix annual (`"2021"`) and monthly (`"2021-06"`) periods in
//! the same tables, so the granularity is carried explicitly rather than
//! inferred from the string shape. Ordering and range checks go through a
//! numeric key (`year * 100 + month`, month `0` for annual), never through
//! lexicographic string comparison, which is not meaningful across
//! granularities.
//!
//! # Example
//!
//! ```
//! use indicator_sync::Period;
//!
//! let annual: Period = "2021".parse().unwrap();
//! let monthly: Period = "2021-06".parse().unwrap();
//!
//! assert_eq!(annual.year(), monthly.year());
//! assert!(annual < monthly); // annual sorts at the start of its year
//! assert_eq!(monthly.next().to_string(), "2021-07");
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Granularity marker for resume-point queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Annual,
    Monthly,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid period '{input}': expected YYYY or YYYY-MM")]
pub struct PeriodParseError {
    pub input: String,
}

/// A time period: a whole year or a single month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    Annual(u16),
    Monthly { year: u16, month: u8 },
}

impl Period {
    /// Numeric sort key: `year * 100 + month`, with month `0` for annual.
    ///
    /// Keys are unique per period and totally ordered; an annual period sorts
    /// immediately before the January of its year.
    #[must_use]
    pub fn sort_key(&self) -> u32 {
        match *self {
            Self::Annual(year) => u32::from(year) * 100,
            Self::Monthly { year, month } => u32::from(year) * 100 + u32::from(month),
        }
    }

    /// Inclusive lower bound key when this period opens a range.
    #[must_use]
    pub fn start_key(&self) -> u32 {
        self.sort_key()
    }

    /// Inclusive upper bound key when this period closes a range.
    ///
    /// An annual bound covers the whole year, so `Annual(2021)` as a range end
    /// admits `2021-12`.
    #[must_use]
    pub fn end_key(&self) -> u32 {
        match *self {
            Self::Annual(year) => u32::from(year) * 100 + 12,
            Self::Monthly { .. } => self.sort_key(),
        }
    }

    #[must_use]
    pub fn year(&self) -> u16 {
        match *self {
            Self::Annual(year) | Self::Monthly { year, .. } => year,
        }
    }

    #[must_use]
    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Annual(_) => Granularity::Annual,
            Self::Monthly { .. } => Granularity::Monthly,
        }
    }

    #[must_use]
    pub fn is_monthly(&self) -> bool {
        matches!(self, Self::Monthly { .. })
    }

    /// The next period at the same granularity.
    #[must_use]
    pub fn next(&self) -> Self {
        match *self {
            Self::Annual(year) => Self::Annual(year + 1),
            Self::Monthly { year, month: 12 } => Self::Monthly { year: year + 1, month: 1 },
            Self::Monthly { year, month } => Self::Monthly { year, month: month + 1 },
        }
    }

    /// Advance by `n` periods at the same granularity.
    #[must_use]
    pub fn advance(&self, n: u16) -> Self {
        let mut period = *self;
        for _ in 0..n {
            period = period.next();
        }
        period
    }

    /// The month containing the current wall-clock instant.
    #[must_use]
    pub fn current_monthly() -> Self {
        let today = Utc::now().date_naive();
        Self::Monthly {
            year: today.year() as u16,
            month: today.month() as u8,
        }
    }

    /// The year containing the current wall-clock instant.
    #[must_use]
    pub fn current_annual() -> Self {
        Self::Annual(Utc::now().date_naive().year() as u16)
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Annual(year) => write!(f, "{year:04}"),
            Self::Monthly { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PeriodParseError { input: s.to_string() };

        match s.len() {
            4 => {
                let year = parse_digits(s).ok_or_else(err)?;
                Ok(Self::Annual(year))
            }
            7 => {
                let (year_part, rest) = s.split_at(4);
                let month_part = rest.strip_prefix('-').ok_or_else(err)?;
                let year = parse_digits(year_part).ok_or_else(err)?;
                let month = parse_digits(month_part).ok_or_else(err)? as u8;
                if !(1..=12).contains(&month) {
                    return Err(err());
                }
                Ok(Self::Monthly { year, month })
            }
            _ => Err(err()),
        }
    }
}

fn parse_digits(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl TryFrom<String> for Period {
    type Error = PeriodParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}
