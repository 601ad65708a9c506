// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

use crate::error::ExtractError;

pub const CONFIG_PATH_ENV: &str = "VEHSCRAPER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

pub const GOV_UK_SOURCE_ID: &str = "gov_uk_vehicle_data";
pub const SMMT_SOURCE_ID: &str = "smmt_vehicle_data";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36";

/// Every option the extraction layer recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub scraping: ScrapingConfig,
    pub destination: DestinationConfig,
    pub history_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            scraping: ScrapingConfig::default(),
            destination: DestinationConfig::default(),
            history_dir: PathBuf::from("history"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub gov_uk: GovUkConfig,
    pub smmt: SmmtConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovUkConfig {
    pub gb_registrations_url: Option<String>,
    pub uk_registrations_url: Option<String>,
    pub table_name: String,
}

impl Default for GovUkConfig {
    fn default() -> Self {
        Self {
            gb_registrations_url: None,
            uk_registrations_url: None,
            table_name: "gov_uk_vehicle_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmmtConfig {
    pub data_url: Option<String>,
    pub table_name: String,
    /// Dump the fetched page under `destination.raw_dir`.
    pub save_html: bool,
    /// Label used when the table carries no month in its first cell.
    pub default_month: String,
    pub current_year: u16,
    pub previous_year: u16,
}

impl Default for SmmtConfig {
    fn default() -> Self {
        Self {
            data_url: None,
            table_name: "smmt_vehicle_data".to_string(),
            save_html: false,
            default_month: "February".to_string(),
            current_year: 2025,
            previous_year: 2024,
        }
    }
}

/// Politeness settings for scraped sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub robotstxt_obey: bool,
    pub download_delay_secs: f64,
    pub concurrent_requests: usize,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            robotstxt_obey: true,
            download_delay_secs: 3.0,
            concurrent_requests: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ScrapingConfig {
    pub fn download_delay(&self) -> Duration {
        Duration::from_secs_f64(self.download_delay_secs.max(0.0))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub dataset: String,
    pub root_dir: PathBuf,
    pub raw_dir: PathBuf,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            dataset: "vehicle_data".to_string(),
            root_dir: PathBuf::from("warehouse"),
            raw_dir: PathBuf::from("data/raw"),
        }
    }
}

impl Config {
    /// Load from `VEHSCRAPER_CONFIG` (or `config.yaml`), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = Self::from_path(&path)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Read a YAML file; a missing file yields the defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {:?}", path))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// `GB_REGISTRATIONS_URL`, `UK_REGISTRATIONS_URL` and `SMMT_DATA_URL` win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()));
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("GB_REGISTRATIONS_URL") {
            debug!("GB_REGISTRATIONS_URL overridden from environment");
            self.sources.gov_uk.gb_registrations_url = Some(url);
        }
        if let Some(url) = lookup("UK_REGISTRATIONS_URL") {
            debug!("UK_REGISTRATIONS_URL overridden from environment");
            self.sources.gov_uk.uk_registrations_url = Some(url);
        }
        if let Some(url) = lookup("SMMT_DATA_URL") {
            debug!("SMMT_DATA_URL overridden from environment");
            self.sources.smmt.data_url = Some(url);
        }
    }

    /// Report the first required URL that is absent.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let gov_uk = &self.sources.gov_uk;
        require(GOV_UK_SOURCE_ID, "gb_registrations_url", &gov_uk.gb_registrations_url)?;
        require(GOV_UK_SOURCE_ID, "uk_registrations_url", &gov_uk.uk_registrations_url)?;
        require(SMMT_SOURCE_ID, "data_url", &self.sources.smmt.data_url)?;
        Ok(())
    }
}

/// Return the configured value or a `ConfigMissing` naming the key.
pub fn require<'a>(
    source_id: &str,
    key: &str,
    value: &'a Option<String>,
) -> Result<&'a str, ExtractError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExtractError::ConfigMissing {
            source_id: source_id.to_string(),
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
sources:
  gov_uk:
    gb_registrations_url: https://assets.example.gov.uk/df_VEH0160_GB.csv
    uk_registrations_url: https://assets.example.gov.uk/df_VEH0160_UK.csv
  smmt:
    data_url: https://www.smmt.co.uk/vehicle-data/car-registrations/
    save_html: true
scraping:
  download_delay_secs: 0.5
  concurrent_requests: 2
destination:
  dataset: test_vehicle_data
"#;

    #[test]
    fn parses_yaml_with_defaults() {
        let cfg = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.sources.gov_uk.table_name, "gov_uk_vehicle_data");
        assert_eq!(cfg.sources.smmt.default_month, "February");
        assert!(cfg.sources.smmt.save_html);
        assert!(cfg.scraping.robotstxt_obey);
        assert_eq!(cfg.scraping.concurrent_requests, 2);
        assert_eq!(cfg.scraping.download_delay(), Duration::from_millis(500));
        assert_eq!(cfg.destination.dataset, "test_vehicle_data");
        assert_eq!(cfg.destination.root_dir, PathBuf::from("warehouse"));
        assert_eq!(cfg.history_dir, PathBuf::from("history"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_url_is_reported() {
        let cfg = Config::from_yaml("scraping:\n  concurrent_requests: 1\n").unwrap();
        match cfg.validate() {
            Err(ExtractError::ConfigMissing { source_id, key }) => {
                assert_eq!(source_id, "gov_uk_vehicle_data");
                assert_eq!(key, "gb_registrations_url");
            }
            other => panic!("expected ConfigMissing, got {:?}", other),
        }
    }

    #[test]
    fn blank_url_counts_as_missing() {
        let value = Some("   ".to_string());
        assert!(require("smmt_vehicle_data", "data_url", &value).is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = Config::from_yaml(SAMPLE).unwrap();
        let vars: HashMap<&str, &str> =
            HashMap::from([("SMMT_DATA_URL", "http://localhost/smmt.html")]);
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(
            cfg.sources.smmt.data_url.as_deref(),
            Some("http://localhost/smmt.html")
        );
        assert!(cfg
            .sources
            .gov_uk
            .gb_registrations_url
            .as_deref()
            .unwrap()
            .ends_with("GB.csv"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::from_path(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg.destination.dataset, "vehicle_data");
        assert!(cfg.sources.smmt.data_url.is_none());
    }
}
