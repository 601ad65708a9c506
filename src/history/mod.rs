// src/history/mod.rs

use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::load::RunReport;

/// One JSON report per run, named `run_<timestamp>.json`.
pub struct History {
    history_dir: PathBuf,
}

impl History {
    /// Open the history directory, creating it if needed.
    pub fn new(history_dir: impl Into<PathBuf>) -> Result<Self> {
        let history_dir = history_dir.into();
        fs::create_dir_all(&history_dir)
            .with_context(|| format!("creating history directory {:?}", &history_dir))?;
        Ok(Self { history_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.history_dir
    }

    /// Write `report` atomically: tmp file, then rename.
    pub fn record_run(&self, report: &RunReport) -> Result<PathBuf> {
        let stamp = report.finished_at.format("%Y%m%d_%H%M%S_%6f");
        let path = self.history_dir.join(format!("run_{}.json", stamp));
        let tmp_path = self.history_dir.join(format!(".run_{}.json.tmp", stamp));

        let mut tmp =
            fs::File::create(&tmp_path).with_context(|| format!("creating {:?}", tmp_path))?;
        serde_json::to_writer_pretty(&mut tmp, report).context("serializing run report")?;
        tmp.write_all(b"\n")?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;

        info!(path = %path.display(), "recorded run");
        Ok(path)
    }

    /// Report files, oldest first.
    pub fn runs(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.history_dir)
            .with_context(|| format!("listing {:?}", self.history_dir))?
        {
            let path = entry?.path();
            let is_report = path
                .file_name()
                .and_then(|f| f.to_str())
                .map_or(false, |f| f.starts_with("run_") && f.ends_with(".json"));
            if is_report {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// The most recent readable report, if any.
    pub fn latest(&self) -> Result<Option<RunReport>> {
        for path in self.runs()?.into_iter().rev() {
            let text = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
            match serde_json::from_str(&text) {
                Ok(report) => return Ok(Some(report)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable run report"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{LoadResult, LoadState, RunOutcome};
    use crate::source::BackendKind;
    use chrono::{Duration, NaiveDate, Utc};

    fn report(records: usize) -> RunReport {
        RunReport::new(
            NaiveDate::from_ymd_opt(2025, 3, 19).unwrap(),
            Utc::now(),
            vec![LoadResult {
                table: "smmt_vehicle_data".into(),
                source: "smmt_vehicle_data".into(),
                backend: BackendKind::Scraped,
                records,
                status: LoadState::Done,
                errors: Vec::new(),
            }],
        )
    }

    #[test]
    fn records_and_reads_back_latest() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history")).unwrap();
        assert!(history.latest().unwrap().is_none());

        let first = report(0);
        let mut second = report(7);
        second.finished_at = first.finished_at + Duration::seconds(1);
        history.record_run(&first).unwrap();
        let path = history.record_run(&second).unwrap();

        assert_eq!(history.runs().unwrap().len(), 2);
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("run_"));
        let latest = history.latest().unwrap().unwrap();
        assert_eq!(latest, second);
        assert_eq!(latest.outcome, RunOutcome::Completed);
    }

    #[test]
    fn ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path()).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("run_broken.json"), "{").unwrap();
        assert_eq!(history.runs().unwrap().len(), 1);
        assert!(history.latest().unwrap().is_none());
    }
}
