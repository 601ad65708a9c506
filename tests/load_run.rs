use arrow::array::{Array, StringArray};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use std::{collections::HashMap, path::Path, sync::Arc};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vehscraper::{
    config::Config,
    error::FetchError,
    fetch::{Fetch, RawPayload},
    load::{self, warehouse::read_table, LoadState, ParquetDestination, RunOutcome},
};

const GB: &str = "https://gov.example/media/df_VEH0160_GB.csv";
const UK: &str = "https://gov.example/media/df_VEH0160_UK.csv";
const SMMT: &str = "https://smmt.example/vehicle-data/car-registrations/";

/// Serves fixed pages; everything else is a 404.
#[derive(Default)]
struct Pages(HashMap<String, Vec<u8>>);

impl Pages {
    fn with(mut self, url: &str, body: &str) -> Self {
        self.0.insert(url.to_string(), body.as_bytes().to_vec());
        self
    }
}

#[async_trait]
impl Fetch for Pages {
    async fn fetch(&self, url: &str) -> Result<RawPayload, FetchError> {
        self.0
            .get(url)
            .map(|b| RawPayload::new(url, b.clone()))
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: StatusCode::NOT_FOUND,
            })
    }
}

fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vehscraper=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn config(root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.sources.gov_uk.gb_registrations_url = Some(GB.into());
    cfg.sources.gov_uk.uk_registrations_url = Some(UK.into());
    cfg.sources.smmt.data_url = Some(SMMT.into());
    cfg.scraping.download_delay_secs = 0.0;
    cfg.destination.root_dir = root.to_path_buf();
    cfg
}

fn smmt_page(month: &str, fuels: &[&str]) -> String {
    let mut html = format!(
        "<html><body><table><tr><td>{}</td><td>2025</td></tr><tr><td>Fuel</td></tr>",
        month
    );
    for fuel in fuels {
        html.push_str(&format!(
            "<tr><td>{}</td><td>10</td><td>9</td><td>11.1</td><td>5</td><td>4</td></tr>",
            fuel
        ));
    }
    html.push_str("</table></body></html>");
    html
}

fn strings(path: &Path, column: &str) -> Vec<String> {
    let (_, batches) = read_table(path).unwrap();
    let mut out = Vec::new();
    for batch in batches {
        let col = batch
            .column_by_name(column)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        for i in 0..col.len() {
            out.push(col.value(i).to_string());
        }
    }
    out
}

fn rows(path: &Path) -> usize {
    let (_, batches) = read_table(path).unwrap();
    batches.iter().map(|b| b.num_rows()).sum()
}

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 19).unwrap()
}

#[tokio::test]
async fn second_run_replaces_first() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let dest = Arc::new(ParquetDestination::from_config(&cfg.destination));

    let first = Pages::default()
        .with(GB, "Fuel,Count\nPetrol,1\nDiesel,2\n")
        .with(UK, "Fuel,Count\nPetrol,3\n")
        .with(SMMT, &smmt_page("January", &["BEV", "PHEV", "Diesel"]));
    let report = load::run(&cfg, Arc::new(first), dest.clone(), run_date())
        .await
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.total_records(), 6);

    let second = Pages::default()
        .with(GB, "Fuel,Count\nHEV,7\n")
        .with(UK, "Fuel,Count\nHEV,8\n")
        .with(SMMT, &smmt_page("February", &["Petrol"]));
    load::run(&cfg, Arc::new(second), dest.clone(), run_date())
        .await
        .unwrap();

    let smmt = dest.table_path("smmt_vehicle_data");
    assert_eq!(strings(&smmt, "fuel"), vec!["Petrol"]);
    assert_eq!(strings(&smmt, "month"), vec!["February"]);
    let gov = dest.table_path("gov_uk_vehicle_data");
    assert_eq!(strings(&gov, "fuel"), vec!["HEV", "HEV"]);
}

#[tokio::test]
async fn gb_failure_still_loads_uk() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let dest = Arc::new(ParquetDestination::from_config(&cfg.destination));

    let pages = Pages::default()
        .with(UK, "Fuel Type,Count\nPetrol,3\nBEV,4\n")
        .with(SMMT, &smmt_page("February", &["BEV"]));
    let report = load::run(&cfg, Arc::new(pages), dest.clone(), run_date())
        .await
        .unwrap();

    let gov = report.result("gov_uk_vehicle_data").unwrap();
    assert_eq!(gov.status, LoadState::Done);
    assert_eq!(gov.records, 2);
    assert_eq!(gov.errors.len(), 1);
    assert!(gov.errors[0].contains("df_VEH0160_GB.csv"));
    assert_eq!(report.outcome, RunOutcome::Degraded);

    let path = dest.table_path("gov_uk_vehicle_data");
    assert_eq!(strings(&path, "region"), vec!["United Kingdom"; 2]);
    assert_eq!(strings(&path, "fuel_type"), vec!["Petrol", "BEV"]);
}

#[tokio::test]
async fn nothing_reachable_is_degraded_with_empty_tables() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let dest = Arc::new(ParquetDestination::from_config(&cfg.destination));

    let report = load::run(&cfg, Arc::new(Pages::default()), dest.clone(), run_date())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Degraded);
    assert_eq!(report.total_records(), 0);
    for table in ["gov_uk_vehicle_data", "smmt_vehicle_data"] {
        assert_eq!(report.result(table).unwrap().status, LoadState::Done);
        assert_eq!(rows(&dest.table_path(table)), 0);
    }
}

#[tokio::test]
async fn missing_url_aborts_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.sources.gov_uk.uk_registrations_url = None;
    let dest = Arc::new(ParquetDestination::from_config(&cfg.destination));

    let err = load::run(&cfg, Arc::new(Pages::default()), dest.clone(), run_date())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(!dest.table_path("smmt_vehicle_data").exists());
}
