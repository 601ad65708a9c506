// src/load/orchestrator.rs

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{Destination, LoadResult, LoadState, RunReport};
use crate::record::NormalizedRecord;
use crate::source::{SourceDescriptor, SourceResource};

/// Runs every source into one destination.
pub struct Orchestrator {
    destination: Arc<dyn Destination>,
}

/// Progress of a single table through the load.
struct TableLoad {
    result: LoadResult,
}

impl TableLoad {
    fn new(d: &SourceDescriptor) -> Self {
        Self {
            result: LoadResult {
                table: d.table_name.clone(),
                source: d.identifier.clone(),
                backend: d.backend,
                records: 0,
                status: LoadState::Idle,
                errors: Vec::new(),
            },
        }
    }

    fn advance(&mut self, next: LoadState) {
        let from = self.result.status;
        if !from.can_advance_to(next) {
            warn!(table = %self.result.table, ?from, to = ?next, "unexpected load transition");
        }
        debug!(table = %self.result.table, ?from, to = ?next, "load state");
        self.result.status = next;
    }

    fn fail(mut self, reason: String) -> LoadResult {
        self.result.errors.push(reason);
        self.result.status = LoadState::Failed;
        self.result
    }
}

impl Orchestrator {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self { destination }
    }

    /// Extract and write every source concurrently. A failing table never stops its
    /// siblings; each ends up in the report as `Done` or `Failed`.
    #[instrument(level = "info", skip_all, fields(run_date = %run_date, sources = sources.len()))]
    pub async fn run(
        &self,
        sources: Vec<Arc<dyn SourceResource>>,
        run_date: NaiveDate,
    ) -> RunReport {
        let started_at = Utc::now();

        let mut handles = Vec::with_capacity(sources.len());
        for source in sources {
            let descriptor = source.descriptor().clone();
            let destination = Arc::clone(&self.destination);
            handles.push((
                descriptor,
                tokio::spawn(load_one(source, destination, run_date)),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (descriptor, handle) in handles {
            let result = match handle.await {
                Ok(r) => r,
                Err(e) => {
                    error!(table = %descriptor.table_name, error = %e, "load task died");
                    TableLoad::new(&descriptor).fail(format!("load task died: {}", e))
                }
            };
            results.push(result);
        }

        let report = RunReport::new(run_date, started_at, results);
        info!(
            outcome = ?report.outcome,
            records = report.total_records(),
            "run finished"
        );
        report
    }
}

async fn load_one(
    source: Arc<dyn SourceResource>,
    destination: Arc<dyn Destination>,
    run_date: NaiveDate,
) -> LoadResult {
    let descriptor = source.descriptor().clone();
    let backend = descriptor.backend.as_str();
    let mut load = TableLoad::new(&descriptor);

    load.advance(LoadState::Extracting);
    let extraction = match source.extract(run_date).await {
        Ok(x) => x,
        Err(e) => {
            error!(table = %descriptor.table_name, backend, error = %e, "extraction aborted");
            load.advance(LoadState::Failed);
            load.result.errors.push(e.to_string());
            return load.result;
        }
    };
    for e in &extraction.errors {
        warn!(
            table = %descriptor.table_name,
            backend,
            url = e.url().unwrap_or("-"),
            error = %e,
            "source reported error"
        );
    }
    load.result
        .errors
        .extend(extraction.errors.iter().map(|e| e.to_string()));

    load.advance(LoadState::Writing);
    let table = descriptor.table_name.clone();
    let disposition = descriptor.disposition;
    let records = extraction.records;
    let written = tokio::task::spawn_blocking(move || {
        let records: Vec<NormalizedRecord> = records.collect();
        destination.write(&table, records, disposition)
    })
    .await;

    match written {
        Ok(Ok(n)) => {
            info!(table = %descriptor.table_name, records = n, "table loaded");
            load.result.records = n;
            load.advance(LoadState::Done);
        }
        Ok(Err(e)) => {
            error!(table = %descriptor.table_name, error = %format!("{:#}", e), "write failed");
            load.result.errors.push(format!("{:#}", e));
            load.advance(LoadState::Failed);
        }
        Err(e) => {
            error!(table = %descriptor.table_name, error = %e, "write task died");
            load.result.errors.push(format!("write task died: {}", e));
            load.advance(LoadState::Failed);
        }
    }
    load.result
}
