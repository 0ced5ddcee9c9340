//! Property-based tests (fuzzing) for the pipeline's pure layers.
//!
//! Uses proptest to generate random/malformed inputs and verify the decoders
//! and the period type never panic, only return clean errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;

use indicator_sync::decode::{decode_bulk_csv, decode_sdmx};
use indicator_sync::Period;

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate a valid period at either granularity
fn period_strategy() -> impl Strategy<Value = Period> {
    prop_oneof![
        (1000u16..=9999).prop_map(Period::Annual),
        ((1000u16..=9999), (1u8..=12)).prop_map(|(year, month)| Period::Monthly { year, month }),
    ]
}

// =============================================================================
// Period laws
// =============================================================================

proptest! {
    /// Display then parse is the identity for every valid period
    #[test]
    fn period_display_parse_roundtrip(period in period_strategy()) {
        let rendered = period.to_string();
        let parsed: Period = rendered.parse().unwrap();
        prop_assert_eq!(parsed, period);
    }

    /// Sort keys are unique: equal keys imply equal periods
    #[test]
    fn period_sort_key_injective(a in period_strategy(), b in period_strategy()) {
        if a.sort_key() == b.sort_key() {
            prop_assert_eq!(a, b);
        }
    }

    /// Ordering agrees with the (year, start-of-period) reading: anything in
    /// an earlier year sorts earlier, and within a year the annual period
    /// sorts first
    #[test]
    fn period_order_respects_years(a in period_strategy(), b in period_strategy()) {
        if a.year() < b.year() {
            prop_assert!(a < b);
        }
        if a.year() == b.year() && !a.is_monthly() && b.is_monthly() {
            prop_assert!(a < b);
        }
    }

    /// The successor is strictly later, keeps its granularity, and no valid
    /// period sits between the two
    #[test]
    fn period_next_is_adjacent(period in period_strategy()) {
        let next = period.next();
        prop_assert!(next > period);
        prop_assert_eq!(next.is_monthly(), period.is_monthly());
        if period.is_monthly() {
            // Monthly keys step by 1 except across December, where the gap
            // skips the annual slot (month 0) of the next year
            let gap = next.sort_key() - period.sort_key();
            prop_assert!(gap == 1 || gap == 89);
        } else {
            prop_assert_eq!(next.sort_key() - period.sort_key(), 100);
        }
    }

    /// A range closed by an annual bound admits every month of that year
    #[test]
    fn annual_range_end_covers_year(year in 1000u16..=9999, month in 1u8..=12) {
        let bound = Period::Annual(year);
        let inside = Period::Monthly { year, month };
        prop_assert!(inside.sort_key() <= bound.end_key());
        prop_assert!(inside.sort_key() >= bound.start_key());
    }

    /// Parsing arbitrary strings never panics
    #[test]
    fn period_parse_never_panics(s in ".{0,16}") {
        let _ = s.parse::<Period>();
    }

    /// Malformed fixed-width candidates either parse to something that
    /// round-trips or fail cleanly
    #[test]
    fn period_parse_roundtrips_when_accepted(s in "[0-9\\-]{4,7}") {
        if let Ok(period) = s.parse::<Period>() {
            prop_assert_eq!(period.to_string(), s);
        }
    }
}

// =============================================================================
// Decoder fuzz
// =============================================================================

proptest! {
    /// The CSV decoder never panics on arbitrary text
    #[test]
    fn fuzz_bulk_csv_arbitrary_text(text in ".{0,2000}") {
        let _ = decode_bulk_csv(&text);
    }

    /// Decoded CSV values are always finite; the parse filter guarantees it
    #[test]
    fn bulk_csv_values_always_finite(
        code in "[A-Z]{3}",
        cells in prop::collection::vec("[a-z0-9.\\-]{0,8}", 1..6),
    ) {
        let years: Vec<String> = (0..cells.len()).map(|i| format!("{}", 2000 + i)).collect();
        let csv = format!(
            "\"Country Name\",\"Country Code\",{}\n\"Somewhere\",\"{}\",{}\n",
            years.iter().map(|y| format!("\"{y}\"")).collect::<Vec<_>>().join(","),
            code,
            cells.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(","),
        );

        if let Ok(table) = decode_bulk_csv(&csv) {
            for record in &table.records {
                prop_assert!(record.value.is_finite());
                prop_assert_eq!(record.area.as_str(), code.as_str());
            }
        }
    }

    /// The SDMX decoder never panics on arbitrary bytes
    #[test]
    fn fuzz_sdmx_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = decode_sdmx(&bytes);
    }

    /// Well-formed single-observation documents always decode
    #[test]
    fn sdmx_single_observation_decodes(
        area in "[A-Z]{3}",
        year in 1960u16..=2030,
        month in 1u8..=12,
        value in -50.0f64..50.0,
    ) {
        let xml = format!(
            r#"<DataSet><Series REF_AREA="{area}">
                 <Obs TIME_PERIOD="{year:04}-{month:02}" OBS_VALUE="{value}"/>
               </Series></DataSet>"#
        );

        let records = decode_sdmx(xml.as_bytes()).unwrap();
        prop_assert_eq!(records.len(), 1);
        prop_assert_eq!(records[0].area.as_str(), area.as_str());
        prop_assert!((records[0].value - value).abs() < 1e-9);
    }
}
