// src/tabular/mod.rs

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Cursor;
use tracing::{debug, info, instrument};
use url::Url;

use crate::enrich::{DATA_SOURCE, EXTRACTION_DATE, REGION};
use crate::error::ExtractError;
use crate::fetch::RawPayload;
use crate::record::{NormalizedRecord, RecordStream, Value};

/// The two regional variants of the licensing statistics file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Region {
    GreatBritain,
    UnitedKingdom,
}

impl Region {
    /// Derive the variant from a file URL. The file name is checked before the rest of
    /// the URL, and "gb" before "uk", since every government URL lives under gov.uk.
    pub fn from_url(url: &str) -> Option<Region> {
        let file_name = Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_lowercase))
            })
            .filter(|name| !name.is_empty());

        file_name
            .as_deref()
            .and_then(Self::from_hint)
            .or_else(|| Self::from_hint(&url.to_lowercase()))
    }

    fn from_hint(s: &str) -> Option<Region> {
        if s.contains("gb") {
            Some(Region::GreatBritain)
        } else if s.contains("uk") {
            Some(Region::UnitedKingdom)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Region::GreatBritain => "Great Britain",
            Region::UnitedKingdom => "United Kingdom",
        }
    }

    pub fn data_source(&self) -> &'static str {
        match self {
            Region::GreatBritain => "VEH0160_GB",
            Region::UnitedKingdom => "VEH0160_UK",
        }
    }
}

/// Lowercase a column name and replace spaces with underscores.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Give every column a distinct name: a blank header becomes `unnamed:_{i}` and a
/// repeated one gets a `.{n}` suffix, so no column overwrites another.
pub fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut out = Vec::with_capacity(headers.len());
    for (i, name) in headers.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("unnamed:_{}", i)
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Parse a delimited file into region-tagged records.
///
/// The whole file is parsed before anything is returned: a structural error anywhere
/// yields [`ExtractError::Parse`] and no records at all. Rows shorter than the header
/// are padded with empty strings; longer rows are a structural error.
#[instrument(level = "info", skip(payload, region, run_date), fields(url = %payload.url, region = ?region))]
pub fn normalize(
    payload: &RawPayload,
    region: Region,
    run_date: NaiveDate,
) -> Result<RecordStream, ExtractError> {
    let url = payload.url.as_str();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(payload.bytes.as_slice()));

    let raw: Vec<String> = rdr
        .headers()
        .map_err(|e| ExtractError::parse(url, format!("reading header row: {}", e)))?
        .iter()
        .map(normalize_header)
        .collect();
    if raw.iter().all(|h| h.is_empty()) {
        return Err(ExtractError::parse(url, "missing header row"));
    }
    let headers = unique_headers(raw);
    debug!(columns = headers.len(), "header row");

    let mut records = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let row = result.map_err(|e| ExtractError::parse(url, format!("record {}: {}", idx, e)))?;
        if row.len() > headers.len() {
            return Err(ExtractError::parse(
                url,
                format!(
                    "record {} has {} fields, header has {}",
                    idx,
                    row.len(),
                    headers.len()
                ),
            ));
        }

        let mut rec = NormalizedRecord::with_capacity(headers.len() + 3);
        for (i, name) in headers.iter().enumerate() {
            let value = row.get(i).map(Value::infer).unwrap_or_else(|| Value::from(""));
            rec.insert(name.clone(), value);
        }
        rec.insert(REGION, region.label());
        rec.insert(DATA_SOURCE, region.data_source());
        rec.insert(EXTRACTION_DATE, Value::Date(run_date));
        records.push(rec);
    }

    info!(rows = records.len(), "normalized delimited file");
    Ok(RecordStream::new(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 19).unwrap()
    }

    const GB_URL: &str =
        "https://assets.publishing.service.gov.uk/media/66f15d48bd3aced9da489bdf/df_VEH0160_GB.csv";
    const UK_URL: &str =
        "https://assets.publishing.service.gov.uk/media/66f15d6a7aeb85342827abdc/df_VEH0160_UK.csv";

    #[test]
    fn region_from_url() {
        assert_eq!(Region::from_url(GB_URL), Some(Region::GreatBritain));
        assert_eq!(Region::from_url(UK_URL), Some(Region::UnitedKingdom));
        assert_eq!(
            Region::from_url("https://data.example.org/gb/latest.csv"),
            Some(Region::GreatBritain)
        );
        assert_eq!(Region::from_url("https://data.example.org/latest.csv"), None);
    }

    #[test]
    fn gb_scenario() {
        let payload = RawPayload::new(GB_URL, "Region,Year,Count\nGB,2023,500\n");
        let records: Vec<_> = normalize(&payload, Region::GreatBritain, run_date())
            .unwrap()
            .collect();

        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(
            rec.keys().collect::<Vec<_>>(),
            vec!["region", "year", "count", "data_source", "extraction_date"]
        );
        assert_eq!(rec.get_str("region"), Some("Great Britain"));
        assert_eq!(rec.get_str("data_source"), Some("VEH0160_GB"));
        assert_eq!(rec.get("year"), Some(&Value::Int(2023)));
        assert_eq!(rec.get("count"), Some(&Value::Int(500)));
        assert_eq!(rec.get("extraction_date"), Some(&Value::Date(run_date())));
    }

    #[test]
    fn headers_are_lowercased_without_spaces() {
        let body = "Body Type,Fuel Type,Licence Status,2024 Q4\nCars,Petrol,Licensed,12345\nCars,Diesel,SORN,\n";
        let payload = RawPayload::new(UK_URL, body);
        let records: Vec<_> = normalize(&payload, Region::UnitedKingdom, run_date())
            .unwrap()
            .collect();

        assert_eq!(records.len(), 2);
        for rec in &records {
            for key in rec.keys() {
                assert_eq!(key, key.to_lowercase());
                assert!(!key.contains(' '), "{key} contains a space");
            }
            for required in ["region", "data_source", "extraction_date"] {
                let v = rec.get(required).expect(required);
                assert!(!v.to_string().is_empty());
            }
        }
        assert_eq!(records[0].get_str("fuel_type"), Some("Petrol"));
        assert_eq!(records[1].get_str("2024_q4"), Some(""));
        assert_eq!(records[1].get_str("region"), Some("United Kingdom"));
    }

    #[test]
    fn short_rows_are_padded() {
        let payload = RawPayload::new(GB_URL, "a,b,c\n1\n");
        let rec = normalize(&payload, Region::GreatBritain, run_date())
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(rec.get("a"), Some(&Value::Int(1)));
        assert_eq!(rec.get_str("c"), Some(""));
    }

    #[test]
    fn structural_error_yields_nothing() {
        let payload = RawPayload::new(GB_URL, "a,b\n1,2\n3,4,5\n");
        let err = normalize(&payload, Region::GreatBritain, run_date()).unwrap_err();
        assert!(matches!(err, ExtractError::Parse { .. }));
    }

    #[test]
    fn empty_file_is_a_parse_error() {
        let payload = RawPayload::new(GB_URL, "");
        assert!(matches!(
            normalize(&payload, Region::GreatBritain, run_date()),
            Err(ExtractError::Parse { .. })
        ));
    }

    #[test]
    fn header_only_is_empty_not_error() {
        let payload = RawPayload::new(GB_URL, "Region,Year\n");
        let stream = normalize(&payload, Region::GreatBritain, run_date()).unwrap();
        assert_eq!(stream.count(), 0);
    }

    #[test]
    fn duplicate_and_blank_headers_keep_every_column() {
        let payload = RawPayload::new(GB_URL, "Fuel,Count,Count,,\nPetrol,1,2,3,4\n");
        let rec = normalize(&payload, Region::GreatBritain, run_date())
            .unwrap()
            .next()
            .unwrap();

        assert_eq!(
            rec.keys().take(5).collect::<Vec<_>>(),
            vec!["fuel", "count", "count.1", "unnamed:_3", "unnamed:_4"]
        );
        assert_eq!(rec.get("count"), Some(&Value::Int(1)));
        assert_eq!(rec.get("count.1"), Some(&Value::Int(2)));
        assert_eq!(rec.get("unnamed:_3"), Some(&Value::Int(3)));
        assert_eq!(rec.get("unnamed:_4"), Some(&Value::Int(4)));
    }

    #[test]
    fn names_colliding_after_normalization_get_suffixes() {
        let names = ["count", "count.1", "count"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        assert_eq!(unique_headers(names), vec!["count", "count.1", "count.2"]);

        let payload = RawPayload::new(GB_URL, "Fuel Type,fuel type\nPetrol,Diesel\n");
        let rec = normalize(&payload, Region::GreatBritain, run_date())
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(rec.get_str("fuel_type"), Some("Petrol"));
        assert_eq!(rec.get_str("fuel_type.1"), Some("Diesel"));
    }
}
