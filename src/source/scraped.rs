// src/source/scraped.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::{Extraction, SourceDescriptor, SourceResource};
use crate::config::SmmtConfig;
use crate::enrich::{enrich_stream, Provenance, MONTH};
use crate::error::ExtractError;
use crate::fetch::Fetch;
use crate::scrape::{self, ParseOptions};

/// The trade-association page with the monthly registrations table.
///
/// The fetcher handed in here is expected to enforce the politeness policy.
pub struct ScrapedSource {
    descriptor: SourceDescriptor,
    fetcher: Arc<dyn Fetch>,
    settings: SmmtConfig,
    raw_dir: Option<PathBuf>,
}

impl ScrapedSource {
    pub fn new(
        descriptor: SourceDescriptor,
        fetcher: Arc<dyn Fetch>,
        settings: &SmmtConfig,
        raw_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            descriptor,
            fetcher,
            settings: settings.clone(),
            raw_dir,
        }
    }
}

#[async_trait]
impl SourceResource for ScrapedSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip(self), fields(source = %self.descriptor.identifier))]
    async fn extract(&self, run_date: NaiveDate) -> Result<Extraction, ExtractError> {
        let url = self
            .descriptor
            .origins
            .first()
            .ok_or_else(|| ExtractError::ConfigMissing {
                source_id: self.descriptor.identifier.clone(),
                key: "data_url".to_string(),
            })?;

        let mut out = Extraction::empty();
        let payload = match self.fetcher.fetch(url).await {
            Ok(p) => p,
            Err(e) => {
                error!(%url, backend = "scraped", error = %e, "fetch failed");
                out.errors.push(e.into());
                return Ok(out);
            }
        };

        if let Some(dir) = &self.raw_dir {
            if let Err(e) = scrape::dump_raw_html(dir, &payload) {
                warn!(error = %e, "could not save raw HTML");
            }
        }

        let opts = ParseOptions::from_config(&self.settings, run_date);
        match scrape::parse(&payload, &opts) {
            Ok(parsed) => {
                info!(%url, month = %parsed.month, label = ?parsed.label_source, "page parsed");
                let provenance = Provenance::new(opts.data_source.clone(), run_date)
                    .with_dimension(MONTH, parsed.month.clone());
                out.records = enrich_stream(parsed.records, provenance);
            }
            Err(e) => {
                error!(%url, backend = "scraped", error = %e, "parse failed");
                out.errors.push(e);
            }
        }
        Ok(out)
    }
}
