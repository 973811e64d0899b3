//! Request pacing and reactive rate-limit backoff.
//!
//! Two throttles apply to every GitHub request:
//! - a fixed minimum gap between consecutive requests ([`Pacer`])
//! - a server-driven sleep when GitHub reports the quota is exhausted
//!   ([`backoff_delay`])

use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Floor between any two outbound requests.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Retries after a rate-limit response before giving up.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Used when the response carries no reset hint at all.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

const MIN_BACKOFF_MS: i64 = 1_000;
const RESET_PADDING_MS: i64 = 1_000;

/// Enforces [`MIN_REQUEST_INTERVAL`] across every request made through one
/// client. The lock is held across the sleep, so callers sharing a pacer are
/// serialized.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sleep until the minimum interval since the previous request has passed.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(MIN_REQUEST_INTERVAL)
    }
}

/// Rate-limit headers from a GitHub response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSignal {
    /// `x-ratelimit-remaining`
    pub remaining: Option<u64>,
    /// `x-ratelimit-reset`, epoch seconds
    pub reset_epoch_secs: Option<i64>,
    /// `retry-after`, seconds
    pub retry_after_secs: Option<u64>,
}

impl RateLimitSignal {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        fn number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        }

        Self {
            remaining: number(headers, "x-ratelimit-remaining"),
            reset_epoch_secs: number(headers, "x-ratelimit-reset"),
            retry_after_secs: number(headers, "retry-after"),
        }
    }

    /// 429 always means throttled; 403 only when the quota is at zero.
    pub fn is_rate_limited(&self, status: u16) -> bool {
        status == 429 || (status == 403 && self.remaining == Some(0))
    }
}

/// How long to sleep before retrying a throttled request.
///
/// The reset timestamp is authoritative when present:
/// `max(reset_ms - now_ms + 1s, 1s)`, clamped to [`MAX_BACKOFF`]. Falls back
/// to `retry-after`, then to [`DEFAULT_BACKOFF`].
pub fn backoff_delay(signal: &RateLimitSignal, now_epoch_ms: i64) -> Duration {
    if let Some(reset_secs) = signal.reset_epoch_secs {
        let wait_ms = reset_secs
            .saturating_mul(1_000)
            .saturating_sub(now_epoch_ms)
            .saturating_add(RESET_PADDING_MS)
            .max(MIN_BACKOFF_MS);
        return Duration::from_millis(wait_ms as u64).min(MAX_BACKOFF);
    }

    if let Some(secs) = signal.retry_after_secs {
        return Duration::from_secs(secs)
            .max(Duration::from_millis(MIN_BACKOFF_MS as u64))
            .min(MAX_BACKOFF);
    }

    DEFAULT_BACKOFF
}
