// src/scrape/mod.rs

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

use crate::config::SmmtConfig;
use crate::enrich::{DATA_SOURCE, EXTRACTION_DATE, MONTH};
use crate::error::ExtractError;
use crate::fetch::RawPayload;
use crate::record::{NormalizedRecord, RecordStream, Value};

pub mod columns;

pub use columns::{Column, ColumnMapping, FIXED_COLUMNS, FUEL};

pub const SMMT_DATA_SOURCE: &str = "SMMT";

/// Leading rows that carry the month and year labels rather than data.
pub const HEADER_ROWS: usize = 2;

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("table selector should parse"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector should parse"));
static CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td, th").expect("cell selector should parse"));

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub data_source: String,
    pub default_month: String,
    pub current_year: u16,
    pub previous_year: u16,
    pub run_date: NaiveDate,
}

impl ParseOptions {
    pub fn from_config(cfg: &SmmtConfig, run_date: NaiveDate) -> Self {
        Self {
            data_source: SMMT_DATA_SOURCE.to_string(),
            default_month: cfg.default_month.clone(),
            current_year: cfg.current_year,
            previous_year: cfg.previous_year,
            run_date,
        }
    }
}

/// Where the month label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    Detected,
    Default,
}

#[derive(Debug)]
pub struct ParsedTable {
    pub month: String,
    pub label_source: LabelSource,
    /// Data rows considered after the header rows.
    pub rows_seen: usize,
    /// Rows dropped for an empty fuel cell.
    pub rows_discarded: usize,
    pub records: RecordStream,
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Parse the first table of an SMMT registrations page.
///
/// Only the first table is read and its first two rows are always skipped; neither
/// rule is checked against the page, so a change in page layout shows up as missing
/// or odd records rather than an error.
#[instrument(level = "info", skip(payload, opts), fields(url = %payload.url))]
pub fn parse(payload: &RawPayload, opts: &ParseOptions) -> Result<ParsedTable, ExtractError> {
    let url = payload.url.as_str();
    let document = Html::parse_document(&payload.text());

    let table = document
        .select(&TABLE)
        .next()
        .ok_or_else(|| ExtractError::empty(url, "no table element on page"))?;

    let rows: Vec<ElementRef<'_>> = table.select(&ROW).collect();

    let detected = rows
        .first()
        .and_then(|r| r.select(&CELL).next())
        .map(cell_text)
        .filter(|t| !t.is_empty());
    let (month, label_source) = match detected {
        Some(m) => {
            info!(month = %m, "month detected");
            (m, LabelSource::Detected)
        }
        None => {
            warn!(month = %opts.default_month, "could not detect month, using default");
            (opts.default_month.clone(), LabelSource::Default)
        }
    };
    let mapping = ColumnMapping::new(&month, opts.current_year, opts.previous_year);

    let mut records = Vec::new();
    let mut rows_seen = 0;
    let mut rows_discarded = 0;
    for row in rows.iter().skip(HEADER_ROWS) {
        let cells: Vec<String> = row.select(&CELL).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }
        rows_seen += 1;

        let mut rec = NormalizedRecord::with_capacity(cells.len() + 3);
        for (i, text) in cells.into_iter().enumerate() {
            rec.insert(mapping.name(i).into_owned(), Value::Str(text));
        }
        if rec.get(FUEL).map_or(true, Value::is_blank) {
            rows_discarded += 1;
            continue;
        }

        rec.insert(DATA_SOURCE, opts.data_source.as_str());
        rec.insert(EXTRACTION_DATE, Value::Date(opts.run_date));
        rec.insert(MONTH, mapping.month());
        records.push(rec);
    }

    info!(
        rows_seen,
        rows_discarded,
        records = records.len(),
        "parsed registrations table"
    );
    Ok(ParsedTable {
        month,
        label_source,
        rows_seen,
        rows_discarded,
        records: RecordStream::new(records),
    })
}

/// Write the raw page to `<dir>/smmt_data_<YYYYmmdd_HHMMSS>.html`.
pub fn dump_raw_html(dir: &Path, payload: &RawPayload) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating raw dir {:?}", dir))?;
    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("smmt_data_{}.html", ts));
    fs::write(&path, &payload.bytes).with_context(|| format!("writing {:?}", path))?;
    info!(path = %path.display(), "saved raw HTML");
    Ok(path)
}
