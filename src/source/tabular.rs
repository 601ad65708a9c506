// src/source/tabular.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{Extraction, SourceDescriptor, SourceResource};
use crate::enrich::{enrich_stream, Provenance, REGION};
use crate::error::ExtractError;
use crate::fetch::Fetch;
use crate::record::RecordStream;
use crate::tabular::{self, Region};

/// Regions assumed for each origin slot when the URL itself gives no hint.
const SLOT_REGIONS: [Region; 2] = [Region::GreatBritain, Region::UnitedKingdom];

/// The government open-data files: one delimited file per region.
pub struct TabularSource {
    descriptor: SourceDescriptor,
    fetcher: Arc<dyn Fetch>,
}

impl TabularSource {
    pub fn new(descriptor: SourceDescriptor, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            descriptor,
            fetcher,
        }
    }

    fn region_for(&self, slot: usize, url: &str) -> Region {
        Region::from_url(url).unwrap_or(SLOT_REGIONS[slot % SLOT_REGIONS.len()])
    }

    async fn extract_one(
        &self,
        url: &str,
        region: Region,
        run_date: NaiveDate,
    ) -> Result<RecordStream, ExtractError> {
        let payload = self.fetcher.fetch(url).await?;
        let records = tabular::normalize(&payload, region, run_date)?;
        let provenance = Provenance::new(region.data_source(), run_date)
            .with_dimension(REGION, region.label());
        Ok(enrich_stream(records, provenance))
    }
}

#[async_trait]
impl SourceResource for TabularSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(level = "info", skip(self), fields(source = %self.descriptor.identifier))]
    async fn extract(&self, run_date: NaiveDate) -> Result<Extraction, ExtractError> {
        if self.descriptor.origins.is_empty() {
            return Err(ExtractError::ConfigMissing {
                source_id: self.descriptor.identifier.clone(),
                key: "origins".to_string(),
            });
        }

        // Sub-sources are fetched concurrently; output keeps origin order.
        let results = join_all(self.descriptor.origins.iter().enumerate().map(|(slot, url)| {
            let region = self.region_for(slot, url);
            async move { (url, self.extract_one(url, region, run_date).await) }
        }))
        .await;

        let mut out = Extraction::empty();
        for (url, result) in results {
            match result {
                Ok(records) => {
                    info!(%url, "sub-source extracted");
                    out.records = out.records.chain(records);
                }
                Err(e) => {
                    error!(%url, backend = "tabular", error = %e, "sub-source failed, continuing");
                    out.errors.push(e);
                }
            }
        }
        Ok(out)
    }
}
