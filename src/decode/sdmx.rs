// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SDMX generic data document decoder.
//!
//! The monthly source returns time-series XML where each observation carries a
//! key/value attribute set. Two layouts exist in the wild and both are
//! handled:
//!
//! - compact: `<Series REF_AREA="DEU"><Obs TIME_PERIOD="2021-06" OBS_VALUE="2.8"/></Series>`
//! - generic: dimension values as `<Value id="REF_AREA" value="DEU"/>` /
//!   `<ObsDimension value="2021-06"/>` / `<ObsValue value="2.8"/>` children.
//!
//! Namespace prefixes vary between publishers, so matching is on local names
//! only. The primary pass requires observations nested under a `Series`
//! element; if that path yields nothing, a fallback pass accepts any element
//! whose local name contains `Obs`. A document where neither pass finds an
//! observation fails the decode.
//!
//! A present observation with a missing value attribute decodes as `0.0`, an
//! upstream quirk that must surface as a zero rather than a dropped record. An
//! unparseable value decodes as NaN so the validator rejects and counts it.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::DecodeError;
use crate::record::RawObservation;

const REF_AREA: &str = "REF_AREA";
const TIME_PERIOD: &str = "TIME_PERIOD";

/// Decode an SDMX document into raw observations.
pub fn decode_sdmx(xml: &[u8]) -> Result<Vec<RawObservation>, DecodeError> {
    let strict = Scan::new(false).run(xml)?;
    if !strict.is_empty() {
        return Ok(strict);
    }

    let fallback = Scan::new(true).run(xml)?;
    if fallback.is_empty() {
        return Err(DecodeError::NoObservations);
    }
    Ok(fallback)
}

/// One streaming pass over the document.
///
/// `fallback` loosens the observation predicate from "an `Obs` element under a
/// `Series`" to "any element whose local name contains `Obs`".
struct Scan {
    fallback: bool,
    records: Vec<RawObservation>,
    series_attrs: HashMap<String, String>,
    in_series: bool,
    /// Local name of the currently open observation element, if any.
    obs_scope: Option<String>,
    obs_attrs: HashMap<String, String>,
    obs_value: Option<f64>,
}

impl Scan {
    fn new(fallback: bool) -> Self {
        Self {
            fallback,
            records: Vec::new(),
            series_attrs: HashMap::new(),
            in_series: false,
            obs_scope: None,
            obs_attrs: HashMap::new(),
            obs_value: None,
        }
    }

    fn run(mut self, xml: &[u8]) -> Result<Vec<RawObservation>, DecodeError> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => self.open(e, false),
                Event::Empty(ref e) => self.open(e, true),
                Event::End(ref e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    self.close(&name);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(self.records)
    }

    fn open(&mut self, e: &BytesStart<'_>, self_closing: bool) {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        if self.obs_scope.is_some() {
            self.absorb_obs_child(e, &name);
        } else if self.is_observation(&name) {
            self.obs_attrs.clear();
            self.obs_value = None;
            absorb_attributes(e, &mut self.obs_attrs);
            if self_closing {
                self.finalize();
            } else {
                self.obs_scope = Some(name);
            }
        } else if is_series(&name) {
            self.series_attrs.clear();
            absorb_attributes(e, &mut self.series_attrs);
            self.in_series = !self_closing;
        } else if self.in_series && name == "Value" {
            absorb_id_value(e, &mut self.series_attrs);
        }
    }

    fn close(&mut self, name: &str) {
        if self.obs_scope.as_deref() == Some(name) {
            self.finalize();
            self.obs_scope = None;
        } else if is_series(name) {
            self.in_series = false;
            self.series_attrs.clear();
        }
    }

    fn is_observation(&self, name: &str) -> bool {
        if self.fallback {
            name.contains("Obs") && !is_obs_child(name)
        } else {
            name == "Obs" && self.in_series
        }
    }

    /// Child elements inside an open observation scope.
    fn absorb_obs_child(&mut self, e: &BytesStart<'_>, name: &str) {
        if name.contains("ObsValue") {
            for attr in e.attributes().flatten() {
                if attr.key.local_name().as_ref() == b"value" {
                    if let Ok(raw) = attr.unescape_value() {
                        self.obs_value = Some(parse_value(&raw));
                    }
                }
            }
        } else if name.contains("ObsDimension") {
            // The observation dimension is the time period unless an id says otherwise.
            let mut id = TIME_PERIOD.to_string();
            let mut value = None;
            for attr in e.attributes().flatten() {
                match attr.key.local_name().as_ref() {
                    b"id" => {
                        if let Ok(v) = attr.unescape_value() {
                            id = v.into_owned();
                        }
                    }
                    b"value" => value = attr.unescape_value().ok().map(|v| v.into_owned()),
                    _ => {}
                }
            }
            if let Some(value) = value {
                self.obs_attrs.insert(id, value);
            }
        } else if name == "Value" {
            absorb_id_value(e, &mut self.obs_attrs);
        }
    }

    fn finalize(&mut self) {
        let area = self.attr(REF_AREA);
        let period = self.attr(TIME_PERIOD);

        // Value precedence: explicit ObsValue child, then the OBS_VALUE
        // attribute, then the documented default of zero.
        let value = self.obs_value.unwrap_or_else(|| {
            self.obs_attrs
                .get("OBS_VALUE")
                .map(|raw| parse_value(raw))
                .unwrap_or(0.0)
        });

        self.records.push(RawObservation { area, period, value });
    }

    /// Observation attribute, falling back to the enclosing series.
    fn attr(&self, key: &str) -> String {
        self.obs_attrs
            .get(key)
            .or_else(|| self.series_attrs.get(key))
            .cloned()
            .unwrap_or_default()
    }
}

fn is_series(name: &str) -> bool {
    name.ends_with("Series")
}

fn is_obs_child(name: &str) -> bool {
    name.contains("ObsDimension") || name.contains("ObsValue") || name.contains("ObsKey")
}

/// Copy every attribute of an element into the map.
fn absorb_attributes(e: &BytesStart<'_>, into: &mut HashMap<String, String>) {
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if let Ok(value) = attr.unescape_value() {
            into.insert(key, value.into_owned());
        }
    }
}

/// `<Value id="REF_AREA" value="DEU"/>` style dimension pairs.
fn absorb_id_value(e: &BytesStart<'_>, into: &mut HashMap<String, String>) {
    let mut id = None;
    let mut value = None;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"id" => id = attr.unescape_value().ok().map(|v| v.into_owned()),
            b"value" => value = attr.unescape_value().ok().map(|v| v.into_owned()),
            _ => {}
        }
    }
    if let (Some(id), Some(value)) = (id, value) {
        into.insert(id, value);
    }
}

fn parse_value(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_compact_layout() {
        let xml = br#"<?xml version="1.0"?>
            <message:CompactData xmlns:message="http://example.org/message">
              <DataSet>
                <Series REF_AREA="DEU" FREQ="M">
                  <Obs TIME_PERIOD="2021-06" OBS_VALUE="2.8"/>
                  <Obs TIME_PERIOD="2021-07" OBS_VALUE="3.1"/>
                </Series>
                <Series REF_AREA="FRA" FREQ="M">
                  <Obs TIME_PERIOD="2021-06" OBS_VALUE="1.9"/>
                </Series>
              </DataSet>
            </message:CompactData>"#;

        let records = decode_sdmx(xml).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].area, "DEU");
        assert_eq!(records[0].period, "2021-06");
        assert_eq!(records[0].value, 2.8);
        assert_eq!(records[2].area, "FRA");
    }

    #[test]
    fn test_decode_generic_layout() {
        let xml = br#"<?xml version="1.0"?>
            <generic:DataSet xmlns:generic="http://example.org/generic">
              <generic:Series>
                <generic:SeriesKey>
                  <generic:Value id="REF_AREA" value="JPN"/>
                  <generic:Value id="FREQ" value="M"/>
                </generic:SeriesKey>
                <generic:Obs>
                  <generic:ObsDimension value="2022-01"/>
                  <generic:ObsValue value="0.5"/>
                </generic:Obs>
              </generic:Series>
            </generic:DataSet>"#;

        let records = decode_sdmx(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].area, "JPN");
        assert_eq!(records[0].period, "2022-01");
        assert_eq!(records[0].value, 0.5);
    }

    #[test]
    fn test_missing_value_defaults_to_zero() {
        let xml = br#"<DataSet><Series REF_AREA="ITA">
            <Obs TIME_PERIOD="2020-03"/>
        </Series></DataSet>"#;

        let records = decode_sdmx(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 0.0);
    }

    #[test]
    fn test_unparseable_value_becomes_nan() {
        let xml = br#"<DataSet><Series REF_AREA="ITA">
            <Obs TIME_PERIOD="2020-03" OBS_VALUE="n/a"/>
        </Series></DataSet>"#;

        let records = decode_sdmx(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].value.is_nan());
    }

    #[test]
    fn test_fallback_scan_finds_renamed_observations() {
        // No Series wrapper at all; observations under an unexpected path.
        let xml = br#"<Data>
            <Group>
              <Observation REF_AREA="CAN" TIME_PERIOD="2019-11" OBS_VALUE="1.7"/>
              <Observation REF_AREA="CAN" TIME_PERIOD="2019-12" OBS_VALUE="2.0"/>
            </Group>
        </Data>"#;

        let records = decode_sdmx(xml).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].area, "CAN");
        assert_eq!(records[1].period, "2019-12");
    }

    #[test]
    fn test_no_observations_is_an_error() {
        let xml = br#"<Data><Header><Sender id="X"/></Header></Data>"#;
        assert!(matches!(decode_sdmx(xml), Err(DecodeError::NoObservations)));
    }

    #[test]
    fn test_series_attrs_reset_between_series() {
        let xml = br#"<DataSet>
            <Series REF_AREA="DEU"><Obs TIME_PERIOD="2021-01" OBS_VALUE="1.0"/></Series>
            <Series><Obs TIME_PERIOD="2021-01" OBS_VALUE="2.0"/></Series>
        </DataSet>"#;

        let records = decode_sdmx(xml).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].area, "DEU");
        // Second series carries no REF_AREA; it must not inherit DEU.
        assert_eq!(records[1].area, "");
    }

    #[test]
    fn test_non_self_closing_observation_elements() {
        let xml = br#"<DataSet><Series REF_AREA="ESP">
            <Obs TIME_PERIOD="2021-02" OBS_VALUE="1.1"></Obs>
        </Series></DataSet>"#;

        let records = decode_sdmx(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 1.1);
    }
}
