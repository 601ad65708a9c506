// src/error.rs

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Why a single retrieval failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} is disallowed by robots.txt")]
    Disallowed { url: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::InvalidUrl { url, .. }
            | FetchError::Timeout { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Network { url, .. }
            | FetchError::Disallowed { url } => url,
        }
    }
}

/// Errors surfaced by a source resource while extracting.
///
/// Only [`ExtractError::ConfigMissing`] is fatal; every other variant is caught at the
/// resource boundary and reported next to whatever records could be recovered.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("source {source_id}: required setting `{key}` is missing")]
    ConfigMissing { source_id: String, key: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("could not parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("no extractable data in {url}: {reason}")]
    EmptySource { url: String, reason: String },
}

impl ExtractError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractError::ConfigMissing { .. })
    }

    /// The URL the error is about, if it concerns a retrieval.
    pub fn url(&self) -> Option<&str> {
        match self {
            ExtractError::ConfigMissing { .. } => None,
            ExtractError::Fetch(e) => Some(e.url()),
            ExtractError::Parse { url, .. } | ExtractError::EmptySource { url, .. } => Some(url),
        }
    }

    pub fn parse(url: impl Into<String>, reason: impl ToString) -> Self {
        ExtractError::Parse {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn empty(url: impl Into<String>, reason: impl ToString) -> Self {
        ExtractError::EmptySource {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
