//! Per-domain request pacing for registry and mirror traffic.
//!
//! [`RateLimiter`] enforces a minimum gap between consecutive requests to the
//! same host and honours server-mandated pauses recorded from `Retry-After`
//! headers. The registry query pause of the metadata resolver is expressed
//! through it.
//!
//! ```
//! use std::time::Duration;
//! use paperbot_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_millis(500));
//! limiter.acquire("https://api.crossref.org/works?query=a").await;
//! // Waits ~500ms before returning.
//! limiter.acquire("https://api.crossref.org/works?query=b").await;
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Total wait on one host after which pacing is reported as excessive.
const EXCESSIVE_WAIT: Duration = Duration::from_secs(30);

/// Longest server-mandated pause that is honoured.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Per-host request pacing, shareable across tasks.
#[derive(Debug)]
pub struct RateLimiter {
    default_delay: Duration,
    // Slots are Arc'd so the map shard is released before the slot lock is awaited.
    hosts: DashMap<String, Arc<Mutex<HostSlot>>>,
}

#[derive(Debug, Default)]
struct HostSlot {
    /// Earliest start of the next request; `None` until the host is first used.
    next_start: Option<Instant>,
    waited: Duration,
}

impl HostSlot {
    fn postpone_to(&mut self, at: Instant) {
        if self.next_start.is_none_or(|current| current < at) {
            self.next_start = Some(at);
        }
    }
}

impl RateLimiter {
    /// Creates a limiter spacing same-host requests by `default_delay`.
    ///
    /// A zero delay only applies server-mandated pauses.
    #[must_use]
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            hosts: DashMap::new(),
        }
    }

    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    fn slot(&self, host: &str) -> Arc<Mutex<HostSlot>> {
        Arc::clone(self.hosts.entry(host.to_string()).or_default().value())
    }

    /// Waits for the turn of `url`'s host, then books the following slot.
    ///
    /// The first request to a host proceeds immediately.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        let host = extract_domain(url);
        tracing::Span::current().record("host", host.as_str());

        let slot = self.slot(&host);
        let mut slot = slot.lock().await;
        if let Some(wait) = slot
            .next_start
            .map(|at| at.saturating_duration_since(Instant::now()))
            .filter(|wait| !wait.is_zero())
        {
            slot.waited += wait;
            debug!(wait_ms = wait.as_millis(), total_ms = slot.waited.as_millis(), "pacing request");
            if slot.waited >= EXCESSIVE_WAIT {
                warn!(
                    total_secs = slot.waited.as_secs(),
                    "spent a long time waiting on this host"
                );
            }
            tokio::time::sleep(wait).await;
        }
        slot.next_start = Some(Instant::now() + self.default_delay);
    }

    /// Records a server-mandated pause (from `Retry-After`) for `url`'s host.
    ///
    /// The next [`RateLimiter::acquire`] for the host starts no sooner than
    /// `delay` from now, capped at one hour.
    #[instrument(skip(self))]
    pub async fn record_rate_limit(&self, url: &str, delay: Duration) {
        let host = extract_domain(url);
        let delay = delay.min(MAX_RETRY_AFTER);
        self.slot(&host).lock().await.postpone_to(Instant::now() + delay);
        debug!(%host, delay_ms = delay.as_millis(), "server asked us to back off");
    }
}

/// Extracts the lowercased host from a URL; `"unknown"` when unparsable.
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a `Retry-After` value (delta seconds or HTTP-date), capped at one hour.
///
/// Dates in the past yield a zero pause.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    let pause = match value.parse::<i64>() {
        Ok(seconds) => Duration::from_secs(u64::try_from(seconds).ok()?),
        Err(_) => httpdate::parse_http_date(value)
            .ok()?
            .duration_since(std::time::SystemTime::now())
            .unwrap_or_default(),
    };
    Some(pause.min(MAX_RETRY_AFTER))
}
