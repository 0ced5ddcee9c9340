// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk CSV table decoder.
//!
//! The annual source ships one wide table per indicator: a few metadata
//! preamble rows, then a header row (`"Country Name","Country Code",
//! "Indicator Name","Indicator Code","1960","1961",...`), then one row per
//! country with one value column per year. Cells are frequently empty.
//!
//! The decoder scans the first [`HEADER_SCAN_ROWS`] rows for the row carrying
//! a `Country Code` column, treats every header that is exactly four digits as
//! a year column, and emits one record per (row, year column) whose cell
//! parses to a finite number. Rows that fail to parse or carry an empty code
//! are skipped and counted as omitted, never as errors.

use csv::{ReaderBuilder, StringRecord};

use super::DecodeError;
use crate::record::RawObservation;

/// How many leading rows may precede the real header.
pub const HEADER_SCAN_ROWS: usize = 10;

const CODE_COLUMN: &str = "Country Code";

/// Decoded bulk table: the records plus the count of rows skipped.
#[derive(Debug, Default)]
pub struct BulkTable {
    pub records: Vec<RawObservation>,
    /// Rows dropped for an empty code column or a row-level parse failure.
    pub omitted: usize,
}

/// Decode a bulk CSV export into raw observations.
pub fn decode_bulk_csv(text: &str) -> Result<BulkTable, DecodeError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = reader.records();

    let mut header: Option<StringRecord> = None;
    for _ in 0..HEADER_SCAN_ROWS {
        let Some(row) = rows.next() else { break };
        // Unparseable preamble rows are just more preamble
        let Ok(row) = row else { continue };
        if row.iter().any(|cell| cell.trim() == CODE_COLUMN) {
            header = Some(row);
            break;
        }
    }
    let header = header.ok_or(DecodeError::MissingHeader(HEADER_SCAN_ROWS))?;

    let code_idx = header
        .iter()
        .position(|cell| cell.trim() == CODE_COLUMN)
        .ok_or(DecodeError::MissingHeader(HEADER_SCAN_ROWS))?;

    let year_columns: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(_, cell)| is_year_header(cell.trim()))
        .map(|(idx, cell)| (idx, cell.trim().to_string()))
        .collect();
    if year_columns.is_empty() {
        return Err(DecodeError::NoYearColumns);
    }

    let mut table = BulkTable::default();
    for row in rows {
        let Ok(row) = row else {
            table.omitted += 1;
            continue;
        };

        let code = row.get(code_idx).unwrap_or("").trim();
        if code.is_empty() {
            table.omitted += 1;
            continue;
        }

        for (idx, year) in &year_columns {
            let cell = row.get(*idx).unwrap_or("").trim();
            let Ok(value) = cell.parse::<f64>() else { continue };
            if !value.is_finite() {
                continue;
            }
            table.records.push(RawObservation {
                area: code.to_string(),
                period: year.clone(),
                value,
            });
        }
    }

    Ok(table)
}

fn is_year_header(cell: &str) -> bool {
    cell.len() == 4 && cell.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
\"Data Source\",\"Bulk indicator archive\"
\"Last Updated Date\",\"2024-03-28\"

\"Country Name\",\"Country Code\",\"Indicator Name\",\"Indicator Code\",\"2020\",\"2021\"
\"United States\",\"USA\",\"Inflation, consumer prices (annual %)\",\"FP.CPI.TOTL.ZG\",\"3.1\",\"4.2\"
";

    #[test]
    fn test_decode_with_preamble() {
        let table = decode_bulk_csv(SAMPLE).unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(
            table.records[0],
            RawObservation { area: "USA".into(), period: "2020".into(), value: 3.1 }
        );
        assert_eq!(
            table.records[1],
            RawObservation { area: "USA".into(), period: "2021".into(), value: 4.2 }
        );
        assert_eq!(table.omitted, 0);
    }

    #[test]
    fn test_empty_cells_are_not_records() {
        let csv = "\
\"Country Name\",\"Country Code\",\"2019\",\"2020\"
\"Germany\",\"DEU\",\"\",\"0.5\"
";
        let table = decode_bulk_csv(csv).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].period, "2020");
    }

    #[test]
    fn test_empty_code_rows_are_omitted() {
        let csv = "\
\"Country Name\",\"Country Code\",\"2020\"
\"Aggregates\",\"\",\"1.0\"
\"France\",\"FRA\",\"1.6\"
";
        let table = decode_bulk_csv(csv).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].area, "FRA");
        assert_eq!(table.omitted, 1);
    }

    #[test]
    fn test_quoted_commas_respected() {
        let csv = "\
\"Country Name\",\"Country Code\",\"2021\"
\"Korea, Rep.\",\"KOR\",\"2.5\"
";
        let table = decode_bulk_csv(csv).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].area, "KOR");
        assert_eq!(table.records[0].value, 2.5);
    }

    #[test]
    fn test_non_numeric_cells_skipped() {
        let csv = "\
\"Country Name\",\"Country Code\",\"2020\",\"2021\"
\"Japan\",\"JPN\",\"..\",\"0.2\"
";
        let table = decode_bulk_csv(csv).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].period, "2021");
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let csv = "a,b,c\n1,2,3\n";
        assert!(matches!(
            decode_bulk_csv(csv),
            Err(DecodeError::MissingHeader(_))
        ));
    }

    #[test]
    fn test_header_without_year_columns_is_an_error() {
        let csv = "\"Country Name\",\"Country Code\"\n\"France\",\"FRA\"\n";
        assert!(matches!(decode_bulk_csv(csv), Err(DecodeError::NoYearColumns)));
    }

    #[test]
    fn test_header_beyond_scan_window_is_missed() {
        let mut csv = String::new();
        for i in 0..HEADER_SCAN_ROWS {
            csv.push_str(&format!("\"meta row {i}\",\"x\"\n"));
        }
        csv.push_str("\"Country Name\",\"Country Code\",\"2020\"\n");
        assert!(matches!(
            decode_bulk_csv(&csv),
            Err(DecodeError::MissingHeader(_))
        ));
    }
}
