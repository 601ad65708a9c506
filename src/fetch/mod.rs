// src/fetch/mod.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ScrapingConfig;
use crate::error::FetchError;

pub mod politeness;
pub mod robots;

pub use politeness::{PoliteFetcher, Throttle};
pub use robots::RobotsPolicy;

/// Bytes retrieved from one URL.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub url: String,
    pub bytes: Vec<u8>,
    pub retrieved_at: DateTime<Utc>,
}

impl RawPayload {
    pub fn new(url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            bytes: bytes.into(),
            retrieved_at: Utc::now(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Retrieval of a whole remote resource.
///
/// Implementations hold no per-URL state, so a call can be repeated with the same URL
/// any number of times.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawPayload, FetchError>;
}

/// Plain HTTP GET with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, timeout })
    }

    pub fn from_config(cfg: &ScrapingConfig) -> Result<Self> {
        Self::new(&cfg.user_agent, cfg.timeout())
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url: url.to_string(),
                status,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<RawPayload, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%url, %status, "non-success status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.classify(url, e))?;
        debug!(%url, bytes = bytes.len(), "fetched");
        Ok(RawPayload::new(url, bytes.to_vec()))
    }
}
