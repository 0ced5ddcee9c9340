// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record validation ahead of any write.
//!
//! Every decoded record passes through here before the reconciler sees it.
//! Rejections carry the raw context (area / period / value) and a closed
//! reason; callers count them into the run summary. A rejection never aborts
//! a batch.

use std::fmt;

use tracing::warn;

use crate::period::Period;
use crate::record::{IncomeObservation, InflationObservation, RawObservation};

/// Which period shapes a dataset accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodPolicy {
    /// The windowed source: `YYYY-MM` only.
    MonthlyOnly,
    /// Bulk sources: `YYYY` only.
    AnnualOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyAreaCode,
    EmptyPeriod,
    MalformedPeriod,
    WrongGranularity,
    NonFiniteValue,
    /// Income record with all three value fields absent.
    EmptyPayload,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EmptyAreaCode => "empty area code",
            Self::EmptyPeriod => "empty period",
            Self::MalformedPeriod => "malformed period",
            Self::WrongGranularity => "wrong granularity for dataset",
            Self::NonFiniteValue => "non-finite value",
            Self::EmptyPayload => "all value fields absent",
        };
        f.write_str(s)
    }
}

/// A rejected record with enough context to diagnose the upstream row.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub area: String,
    pub period: String,
    pub value: Option<f64>,
    pub reason: RejectReason,
}

fn reject(area: &str, period: &str, value: Option<f64>, reason: RejectReason) -> Rejection {
    warn!(area, period, value, %reason, "record rejected");
    Rejection {
        area: area.to_string(),
        period: period.to_string(),
        value,
        reason,
    }
}

/// Validate one decoded inflation record.
pub fn validate_inflation(
    raw: &RawObservation,
    policy: PeriodPolicy,
) -> Result<InflationObservation, Rejection> {
    let period = validate_common(raw, policy)?;
    Ok(InflationObservation {
        country: raw.area.clone(),
        period,
        value: raw.value,
    })
}

/// Validate one decoded income cell; the caller assembles cells from the
/// three indicators into a single record per (country, year).
pub fn validate_income_cell(raw: &RawObservation) -> Result<(String, u16, f64), Rejection> {
    let period = validate_common(raw, PeriodPolicy::AnnualOnly)?;
    Ok((raw.area.clone(), period.year(), raw.value))
}

/// Final shape check on an assembled income record.
pub fn check_income(record: IncomeObservation) -> Result<IncomeObservation, Rejection> {
    if record.is_empty() {
        return Err(reject(
            &record.country,
            &record.year.to_string(),
            None,
            RejectReason::EmptyPayload,
        ));
    }
    for field in [record.ppp, record.lcu, record.growth].into_iter().flatten() {
        if !field.is_finite() {
            return Err(reject(
                &record.country,
                &record.year.to_string(),
                Some(field),
                RejectReason::NonFiniteValue,
            ));
        }
    }
    Ok(record)
}

fn validate_common(raw: &RawObservation, policy: PeriodPolicy) -> Result<Period, Rejection> {
    if raw.area.trim().is_empty() {
        return Err(reject(&raw.area, &raw.period, Some(raw.value), RejectReason::EmptyAreaCode));
    }
    if raw.period.is_empty() {
        return Err(reject(&raw.area, &raw.period, Some(raw.value), RejectReason::EmptyPeriod));
    }

    let period: Period = raw
        .period
        .parse()
        .map_err(|_| reject(&raw.area, &raw.period, Some(raw.value), RejectReason::MalformedPeriod))?;

    let shape_ok = match policy {
        PeriodPolicy::MonthlyOnly => period.is_monthly(),
        PeriodPolicy::AnnualOnly => !period.is_monthly(),
    };
    if !shape_ok {
        return Err(reject(&raw.area, &raw.period, Some(raw.value), RejectReason::WrongGranularity));
    }

    if !raw.value.is_finite() {
        return Err(reject(&raw.area, &raw.period, Some(raw.value), RejectReason::NonFiniteValue));
    }

    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(area: &str, period: &str, value: f64) -> RawObservation {
        RawObservation { area: area.into(), period: period.into(), value }
    }

    #[test]
    fn test_valid_monthly_record() {
        let obs = validate_inflation(&raw("DEU", "2021-06", 2.8), PeriodPolicy::MonthlyOnly).unwrap();
        assert_eq!(obs.country, "DEU");
        assert_eq!(obs.period, Period::Monthly { year: 2021, month: 6 });
        assert_eq!(obs.value, 2.8);
    }

    #[test]
    fn test_empty_area_rejected() {
        let err = validate_inflation(&raw("", "2021-06", 1.0), PeriodPolicy::MonthlyOnly).unwrap_err();
        assert_eq!(err.reason, RejectReason::EmptyAreaCode);
    }

    #[test]
    fn test_empty_period_rejected() {
        let err = validate_inflation(&raw("DEU", "", 1.0), PeriodPolicy::MonthlyOnly).unwrap_err();
        assert_eq!(err.reason, RejectReason::EmptyPeriod);
    }

    #[test]
    fn test_malformed_period_rejected() {
        let err = validate_inflation(&raw("DEU", "June 2021", 1.0), PeriodPolicy::MonthlyOnly).unwrap_err();
        assert_eq!(err.reason, RejectReason::MalformedPeriod);
    }

    #[test]
    fn test_granularity_policy_enforced() {
        let err = validate_inflation(&raw("DEU", "2021", 1.0), PeriodPolicy::MonthlyOnly).unwrap_err();
        assert_eq!(err.reason, RejectReason::WrongGranularity);

        let err = validate_inflation(&raw("DEU", "2021-06", 1.0), PeriodPolicy::AnnualOnly).unwrap_err();
        assert_eq!(err.reason, RejectReason::WrongGranularity);
    }

    #[test]
    fn test_non_finite_value_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = validate_inflation(&raw("DEU", "2021-06", bad), PeriodPolicy::MonthlyOnly).unwrap_err();
            assert_eq!(err.reason, RejectReason::NonFiniteValue);
        }
    }

    #[test]
    fn test_income_cell_returns_year() {
        let (area, year, value) = validate_income_cell(&raw("FRA", "2019", 44000.0)).unwrap();
        assert_eq!(area, "FRA");
        assert_eq!(year, 2019);
        assert_eq!(value, 44000.0);
    }

    #[test]
    fn test_income_empty_payload_rejected() {
        let record = IncomeObservation {
            country: "FRA".into(),
            year: 2019,
            ppp: None,
            lcu: None,
            growth: None,
        };
        let err = check_income(record).unwrap_err();
        assert_eq!(err.reason, RejectReason::EmptyPayload);
    }

    #[test]
    fn test_income_partial_payload_accepted() {
        let record = IncomeObservation {
            country: "FRA".into(),
            year: 2019,
            ppp: None,
            lcu: None,
            growth: Some(1.4),
        };
        assert!(check_income(record).is_ok());
    }

    #[test]
    fn test_income_non_finite_field_rejected() {
        let record = IncomeObservation {
            country: "FRA".into(),
            year: 2019,
            ppp: Some(f64::NAN),
            lcu: None,
            growth: Some(1.4),
        };
        let err = check_income(record).unwrap_err();
        assert_eq!(err.reason, RejectReason::NonFiniteValue);
    }
}
