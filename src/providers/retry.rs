use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const RATE_LIMIT_MAX_RETRIES: usize = 5;
pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(2);
pub(crate) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(60);

/// HTTP-level backoff for one completion call: doubles from 2s up to 60s and
/// honours a longer `retry-after`.
#[derive(Debug)]
pub(crate) struct RateLimitBackoff {
    provider: &'static str,
    attempt: usize,
    delay: Duration,
}

impl RateLimitBackoff {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            attempt: 0,
            delay: RATE_LIMIT_BASE_DELAY,
        }
    }

    /// Sleeps before the next attempt when the response was rate limited and
    /// the budget allows another try.
    pub(crate) async fn retry(
        &mut self,
        status: StatusCode,
        body: &str,
        retry_after: Option<Duration>,
    ) -> bool {
        self.attempt += 1;
        if !is_rate_limited(status, body) || self.attempt >= RATE_LIMIT_MAX_RETRIES {
            return false;
        }
        let wait = retry_after.map_or(self.delay, |value| value.max(self.delay));
        warn!(
            "{} rate limited; retrying in {:.1}s (attempt {}/{})",
            self.provider,
            wait.as_secs_f32(),
            self.attempt,
            RATE_LIMIT_MAX_RETRIES
        );
        sleep(wait).await;
        self.delay = next_delay(self.delay);
        true
    }
}

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if matches!(status.as_u16(), 503 | 529) {
        return true;
    }
    let lower = body.to_lowercase();
    [
        "rate limit",
        "rate_limit",
        "too many requests",
        "resource_exhausted",
        "quota",
        "overloaded",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn next_delay(current: Duration) -> Duration {
    current
        .saturating_mul(2)
        .clamp(RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_DELAY)
}
