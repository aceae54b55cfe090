//! Exponential backoff for data-source calls and head reconnects.

use crate::error::SourceError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff schedule with a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Cap on exponential growth.
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `attempt`-th failure (1-based), or `None`
    /// once the attempt budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.saturating_pow(attempt - 1);
        Some(self.initial_backoff.saturating_mul(factor).min(self.max_backoff))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
///
/// An exhausted `RateLimited` is surfaced as `Unavailable`: the caller only
/// needs to know the source could not be reached within budget.
pub async fn retry_source<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => match policy.next_delay(attempt) {
                Some(delay) => {
                    warn!(%label, attempt, error = %err, "retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(match err {
                        SourceError::RateLimited(msg) => SourceError::Unavailable(format!(
                            "{label}: still rate limited after {attempt} attempts: {msg}"
                        )),
                        other => other,
                    })
                }
            },
        }
    }
}
