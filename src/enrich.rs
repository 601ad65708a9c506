// src/enrich.rs

use chrono::NaiveDate;

use crate::record::{NormalizedRecord, RecordStream, Value};

pub const DATA_SOURCE: &str = "data_source";
pub const EXTRACTION_DATE: &str = "extraction_date";
pub const REGION: &str = "region";
pub const MONTH: &str = "month";

/// Provenance stamped onto every record a source emits.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub data_source: String,
    /// The run date, not a date taken from the source.
    pub extraction_date: NaiveDate,
    /// Source-specific dimension, `("region", ..)` or `("month", ..)`.
    pub dimension: Option<(&'static str, String)>,
}

impl Provenance {
    pub fn new(data_source: impl Into<String>, extraction_date: NaiveDate) -> Self {
        Self {
            data_source: data_source.into(),
            extraction_date,
            dimension: None,
        }
    }

    pub fn with_dimension(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.dimension = Some((key, value.into()));
        self
    }
}

/// Add the provenance fields that are not already present. Existing values are left
/// untouched, so applying this twice is the same as applying it once.
pub fn enrich(mut record: NormalizedRecord, provenance: &Provenance) -> NormalizedRecord {
    record.insert_if_absent(DATA_SOURCE, provenance.data_source.as_str());
    record.insert_if_absent(EXTRACTION_DATE, Value::Date(provenance.extraction_date));
    if let Some((key, value)) = &provenance.dimension {
        record.insert_if_absent(key, value.as_str());
    }
    record
}

/// Lazily enrich every record of `stream`.
pub fn enrich_stream(stream: RecordStream, provenance: Provenance) -> RecordStream {
    RecordStream::new(stream.map(move |r| enrich(r, &provenance)))
}
