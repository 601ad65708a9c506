// src/load/mod.rs

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::error::ExtractError;
use crate::fetch::Fetch;
use crate::record::NormalizedRecord;
use crate::source::{build_sources, BackendKind, WriteDisposition};

pub mod memory;
pub mod orchestrator;
pub mod warehouse;

pub use memory::MemoryDestination;
pub use orchestrator::Orchestrator;
pub use warehouse::ParquetDestination;

/// A table store. Writes are blocking and run on the blocking pool.
pub trait Destination: Send + Sync {
    /// Commit `records` to `table`, returning how many were written.
    ///
    /// An empty `records` is a valid load and still supersedes the table under
    /// [`WriteDisposition::Replace`].
    fn write(
        &self,
        table: &str,
        records: Vec<NormalizedRecord>,
        disposition: WriteDisposition,
    ) -> Result<usize>;
}

/// Per-destination progress: `Idle -> Extracting -> Writing -> Done | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Idle,
    Extracting,
    Writing,
    Done,
    Failed,
}

impl LoadState {
    pub fn can_advance_to(self, next: LoadState) -> bool {
        use LoadState::*;
        matches!(
            (self, next),
            (Idle, Extracting) | (Extracting, Writing) | (Extracting, Failed) | (Writing, Done) | (Writing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoadState::Done | LoadState::Failed)
    }
}

/// Outcome for one destination table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadResult {
    pub table: String,
    pub source: String,
    pub backend: BackendKind,
    pub records: usize,
    pub status: LoadState,
    /// One line per error the source reported, fatal or not.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// The run finished but produced no records, or some source reported errors.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<LoadResult>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn new(run_date: NaiveDate, started_at: DateTime<Utc>, results: Vec<LoadResult>) -> Self {
        let total: usize = results.iter().map(|r| r.records).sum();
        let clean = results
            .iter()
            .all(|r| r.status == LoadState::Done && r.errors.is_empty());
        let outcome = if total > 0 && clean {
            RunOutcome::Completed
        } else {
            RunOutcome::Degraded
        };
        Self {
            run_date,
            started_at,
            finished_at: Utc::now(),
            results,
            outcome,
        }
    }

    pub fn total_records(&self) -> usize {
        self.results.iter().map(|r| r.records).sum()
    }

    pub fn result(&self, table: &str) -> Option<&LoadResult> {
        self.results.iter().find(|r| r.table == table)
    }
}

/// Validate the config, build every source and load them all into `destination`.
///
/// Only a configuration problem is an `Err`; everything else ends up in the report.
pub async fn run(
    cfg: &Config,
    http: Arc<dyn Fetch>,
    destination: Arc<dyn Destination>,
    run_date: NaiveDate,
) -> Result<RunReport, ExtractError> {
    cfg.validate()?;
    let sources = build_sources(cfg, http)?;
    Ok(Orchestrator::new(destination).run(sources, run_date).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(records: usize, status: LoadState, errors: &[&str]) -> LoadResult {
        LoadResult {
            table: "t".into(),
            source: "s".into(),
            backend: BackendKind::Tabular,
            records,
            status,
            errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 19).unwrap()
    }

    #[test]
    fn state_machine_transitions() {
        use LoadState::*;
        assert!(Idle.can_advance_to(Extracting));
        assert!(Extracting.can_advance_to(Writing));
        assert!(Writing.can_advance_to(Done));
        assert!(Writing.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Done));
        assert!(!Done.can_advance_to(Extracting));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn zero_records_is_degraded() {
        let report = RunReport::new(date(), Utc::now(), vec![result(0, LoadState::Done, &[])]);
        assert_eq!(report.outcome, RunOutcome::Degraded);
        assert_eq!(report.total_records(), 0);
    }

    #[test]
    fn clean_run_is_completed() {
        let report = RunReport::new(
            date(),
            Utc::now(),
            vec![result(3, LoadState::Done, &[]), result(2, LoadState::Done, &[])],
        );
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.total_records(), 5);
    }

    #[test]
    fn soft_errors_degrade_the_run() {
        let report = RunReport::new(
            date(),
            Utc::now(),
            vec![result(3, LoadState::Done, &["fetch failed"])],
        );
        assert_eq!(report.outcome, RunOutcome::Degraded);
    }

    #[tokio::test]
    async fn missing_url_is_returned_to_caller() {
        let cfg = Config::default();
        let http = Arc::new(crate::fetch::testing::StubFetcher::new());
        let dest = Arc::new(MemoryDestination::new());
        let err = run(&cfg, http.clone(), dest, date()).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(http.calls(), 0);
    }
}
