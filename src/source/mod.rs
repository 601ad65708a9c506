// src/source/mod.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{require, Config, GOV_UK_SOURCE_ID, SMMT_SOURCE_ID};
use crate::error::ExtractError;
use crate::fetch::{Fetch, PoliteFetcher, Throttle};
use crate::record::RecordStream;

pub mod scraped;
pub mod tabular;

pub use scraped::ScrapedSource;
pub use tabular::TabularSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Tabular,
    Scraped,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Tabular => "tabular",
            BackendKind::Scraped => "scraped",
        }
    }
}

/// How a load treats what is already in the destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    /// The run's output fully supersedes the table.
    #[default]
    Replace,
}

/// What to extract and where it goes. Built once per run from the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub identifier: String,
    pub backend: BackendKind,
    pub origins: Vec<String>,
    pub table_name: String,
    pub disposition: WriteDisposition,
}

impl SourceDescriptor {
    /// The two government files, GB first.
    pub fn gov_uk(cfg: &Config) -> Result<Self, ExtractError> {
        let gov = &cfg.sources.gov_uk;
        let gb = require(GOV_UK_SOURCE_ID, "gb_registrations_url", &gov.gb_registrations_url)?;
        let uk = require(GOV_UK_SOURCE_ID, "uk_registrations_url", &gov.uk_registrations_url)?;
        Ok(Self {
            identifier: GOV_UK_SOURCE_ID.to_string(),
            backend: BackendKind::Tabular,
            origins: vec![gb.to_string(), uk.to_string()],
            table_name: gov.table_name.clone(),
            disposition: WriteDisposition::Replace,
        })
    }

    pub fn smmt(cfg: &Config) -> Result<Self, ExtractError> {
        let smmt = &cfg.sources.smmt;
        let url = require(SMMT_SOURCE_ID, "data_url", &smmt.data_url)?;
        Ok(Self {
            identifier: SMMT_SOURCE_ID.to_string(),
            backend: BackendKind::Scraped,
            origins: vec![url.to_string()],
            table_name: smmt.table_name.clone(),
            disposition: WriteDisposition::Replace,
        })
    }
}

/// Output of one extraction: the recovered records plus every non-fatal error hit
/// along the way.
#[derive(Debug)]
pub struct Extraction {
    pub records: RecordStream,
    pub errors: Vec<ExtractError>,
}

impl Extraction {
    pub fn empty() -> Self {
        Self {
            records: RecordStream::empty(),
            errors: Vec::new(),
        }
    }
}

/// A producer of normalized, enriched records for one destination table.
///
/// `extract` is called once per run. Only configuration problems are returned as
/// `Err`; fetch and parse failures of individual sub-sources are reported in
/// [`Extraction::errors`] next to whatever the other sub-sources produced.
#[async_trait]
pub trait SourceResource: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    async fn extract(&self, run_date: NaiveDate) -> Result<Extraction, ExtractError>;
}

/// Build every configured source. A missing URL fails here, before any request.
///
/// Scraped sources share one throttle so the politeness limits hold across them.
pub fn build_sources(
    cfg: &Config,
    http: Arc<dyn Fetch>,
) -> Result<Vec<Arc<dyn SourceResource>>, ExtractError> {
    let gov_uk = SourceDescriptor::gov_uk(cfg)?;
    let smmt = SourceDescriptor::smmt(cfg)?;

    let throttle = Throttle::from_config(&cfg.scraping);
    let polite: Arc<dyn Fetch> = Arc::new(PoliteFetcher::new(http.clone(), throttle, &cfg.scraping));

    let raw_dir = cfg
        .sources
        .smmt
        .save_html
        .then(|| cfg.destination.raw_dir.clone());

    Ok(vec![
        Arc::new(TabularSource::new(gov_uk, http)),
        Arc::new(ScrapedSource::new(smmt, polite, &cfg.sources.smmt, raw_dir)),
    ])
}
