use anyhow::{Context, Result};
use chrono::Local;
use std::{env, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use vehscraper::{
    config::Config,
    fetch::{Fetch, HttpFetcher},
    history::History,
    load::{self, Destination, MemoryDestination, ParquetDestination, RunOutcome},
};

const DRY_RUN_ENV: &str = "VEHSCRAPER_DRY_RUN";

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vehscraper=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Config::load().context("loading configuration")?;
    let dry_run = env::var(DRY_RUN_ENV).map_or(false, |v| v == "1" || v.eq_ignore_ascii_case("true"));
    let history = History::new(&cfg.history_dir)?;
    if let Some(prev) = history.latest()? {
        info!(
            run_date = %prev.run_date,
            outcome = ?prev.outcome,
            records = prev.total_records(),
            "previous run"
        );
    }

    // ─── 3) destination ──────────────────────────────────────────────
    let memory = Arc::new(MemoryDestination::new());
    let destination: Arc<dyn Destination> = if dry_run {
        info!("dry run: loading into memory");
        memory.clone()
    } else {
        let dest = ParquetDestination::from_config(&cfg.destination);
        info!(root = %cfg.destination.root_dir.display(), dataset = %cfg.destination.dataset, "parquet destination");
        Arc::new(dest)
    };

    // ─── 4) run every source ─────────────────────────────────────────
    let http: Arc<dyn Fetch> = Arc::new(HttpFetcher::from_config(&cfg.scraping)?);
    let run_date = Local::now().date_naive();
    let report = load::run(&cfg, http, destination, run_date)
        .await
        .context("run aborted")?;

    for r in &report.results {
        info!(table = %r.table, status = ?r.status, records = r.records, errors = r.errors.len(), "load result");
        for e in &r.errors {
            warn!(table = %r.table, "{}", e);
        }
    }
    if dry_run {
        for table in memory.table_names() {
            let n = memory.table(&table).map_or(0, |t| t.len());
            info!(table = %table, records = n, "dry run table");
        }
    }

    // ─── 5) history ──────────────────────────────────────────────────
    if let Err(e) = history.record_run(&report) {
        error!("failed to record run: {:#}", e);
    }

    match report.outcome {
        RunOutcome::Completed => info!(records = report.total_records(), "all done"),
        RunOutcome::Degraded => warn!(records = report.total_records(), "run completed degraded"),
    }
    Ok(())
}
