//! Per-host politeness: a minimum gap between request starts and a cap on how many
//! requests may be in flight against one host at a time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::{Fetch, RawPayload, RobotsPolicy};
use crate::config::ScrapingConfig;
use crate::error::FetchError;

struct HostState {
    permits: Arc<Semaphore>,
    next_slot: Option<Instant>,
}

/// Shared throttle. Clones share the same per-host bookkeeping, so one instance can be
/// handed to every task that talks to a host.
#[derive(Clone)]
pub struct Throttle {
    delay: Duration,
    max_in_flight: usize,
    hosts: Arc<Mutex<HashMap<String, HostState>>>,
}

/// Held for the duration of one request; dropping it frees the in-flight slot.
pub struct ThrottlePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl Throttle {
    pub fn new(delay: Duration, max_in_flight: usize) -> Self {
        Self {
            delay,
            max_in_flight: max_in_flight.max(1),
            hosts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(cfg: &ScrapingConfig) -> Self {
        Self::new(cfg.download_delay(), cfg.concurrent_requests)
    }

    fn host_state(&self) -> HostState {
        HostState {
            permits: Arc::new(Semaphore::new(self.max_in_flight)),
            next_slot: None,
        }
    }

    /// Wait for a free slot on `host` and for the minimum delay since the previous start.
    pub async fn acquire(&self, host: &str) -> ThrottlePermit {
        let permits = {
            let mut hosts = self.hosts.lock().await;
            hosts
                .entry(host.to_string())
                .or_insert_with(|| self.host_state())
                .permits
                .clone()
        };
        // The semaphore is never closed, so this only fails if that changes.
        let permit = permits.acquire_owned().await.ok();

        // Reserve the next start time while holding the lock, sleep after releasing it.
        let slot = {
            let mut hosts = self.hosts.lock().await;
            let now = Instant::now();
            let state = hosts
                .entry(host.to_string())
                .or_insert_with(|| self.host_state());
            let slot = match state.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            state.next_slot = Some(slot + self.delay);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(host, ?wait, "throttling");
            sleep_until(slot).await;
        }
        ThrottlePermit { _permit: permit }
    }
}

/// A fetcher that honors the politeness policy and, optionally, robots.txt.
pub struct PoliteFetcher {
    inner: Arc<dyn Fetch>,
    throttle: Throttle,
    obey_robots: bool,
    user_agent: String,
    robots: Mutex<HashMap<String, Arc<RobotsPolicy>>>,
}

impl PoliteFetcher {
    pub fn new(inner: Arc<dyn Fetch>, throttle: Throttle, cfg: &ScrapingConfig) -> Self {
        Self {
            inner,
            throttle,
            obey_robots: cfg.robotstxt_obey,
            user_agent: cfg.user_agent.clone(),
            robots: Mutex::new(HashMap::new()),
        }
    }

    async fn throttled(&self, host: &str, url: &str) -> Result<RawPayload, FetchError> {
        let _permit = self.throttle.acquire(host).await;
        self.inner.fetch(url).await
    }

    /// The robots policy for `origin`, fetched once and cached. An unreachable
    /// robots.txt allows everything.
    async fn robots_for(&self, origin: &Url, host: &str) -> Arc<RobotsPolicy> {
        if let Some(policy) = self.robots.lock().await.get(host) {
            return policy.clone();
        }

        let robots_url = match origin.join("/robots.txt") {
            Ok(u) => u.to_string(),
            Err(_) => return Arc::new(RobotsPolicy::allow_all()),
        };
        let policy = match self.throttled(host, &robots_url).await {
            Ok(payload) => RobotsPolicy::parse(&payload.text()),
            Err(e) => {
                info!(url = %robots_url, error = %e, "robots.txt unavailable, allowing all");
                RobotsPolicy::allow_all()
            }
        };
        let policy = Arc::new(policy);
        self.robots
            .lock()
            .await
            .insert(host.to_string(), policy.clone());
        policy
    }
}

#[async_trait]
impl Fetch for PoliteFetcher {
    async fn fetch(&self, url: &str) -> Result<RawPayload, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let host = parsed.host_str().unwrap_or_default().to_string();

        if self.obey_robots {
            let policy = self.robots_for(&parsed, &host).await;
            if !policy.is_allowed(&self.user_agent, parsed.path()) {
                warn!(%url, "disallowed by robots.txt");
                return Err(FetchError::Disallowed {
                    url: url.to_string(),
                });
            }
        }

        self.throttled(&host, url).await
    }
}
