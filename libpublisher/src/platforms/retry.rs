//! Bounded retry with exponential backoff for handler network steps
//!
//! Only `RateLimit` and `TransientNetwork` errors are retried. A rate-limit
//! hint is honored by waiting at least that long; a hint longer than
//! `max_delay` ends the retries instead of stalling the run.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::PublishError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff after the given failed attempt (1-based): base, 2*base, 4*base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before the next attempt, or `None` if the error must not be retried
    pub fn delay_for(&self, attempt: u32, error: &PublishError) -> Option<Duration> {
        if !error.is_retriable() || attempt >= self.max_attempts {
            return None;
        }
        let backoff = self.backoff(attempt);
        match error {
            PublishError::RateLimit {
                retry_after: Some(hint),
                ..
            } => {
                if *hint > self.max_delay {
                    None
                } else {
                    Some(backoff.max(*hint))
                }
            }
            _ => Some(backoff),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently or attempts run out
///
/// `step` names the network step in log lines (e.g. "upload", "metadata").
/// The operation is re-invoked from scratch on each attempt, so callers
/// retry upload and metadata steps separately to avoid re-uploading media.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    platform: &str,
    step: &str,
    mut operation: F,
) -> Result<T, PublishError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PublishError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} {} succeeded on attempt {}", platform, step, attempt);
                }
                return Ok(value);
            }
            Err(e) => match policy.delay_for(attempt, &e) {
                Some(delay) => {
                    warn!(
                        "Transient error during {} {} (attempt {}/{}): {}. Retrying in {:?}...",
                        platform, step, attempt, max_attempts, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    if e.is_retriable() {
                        warn!(
                            "{} {} failed after {} attempt(s): {}",
                            platform, step, attempt, e
                        );
                    }
                    return Err(e);
                }
            },
        }
    }
}
