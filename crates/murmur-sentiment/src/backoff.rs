//! Retry of rate-limited completion calls with exponential backoff.

use std::future::Future;
use std::time::Duration;

use murmur_core::AppConfig;
use tokio_util::sync::CancellationToken;

use crate::error::CompletionError;

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base: Duration::from_millis(config.llm_backoff_base_ms),
            max_retries: config.llm_max_retries,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base
            .checked_mul(1u32 << attempt.min(31))
            .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

/// Run `operation`, retrying only [`CompletionError::RateLimited`] failures.
///
/// Each backoff sleep races `stop`; a stop during the sleep ends the retry
/// loop with [`CompletionError::Cancelled`]. `on_retry` is called once per
/// scheduled retry.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, any non-retriable error
/// immediately, or `Cancelled`.
pub async fn retry_rate_limited<T, F, Fut, R>(
    policy: BackoffPolicy,
    stop: &CancellationToken,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, CompletionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CompletionError>>,
    R: FnMut(),
{
    let mut attempt = 0u32;

    loop {
        if stop.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_rate_limited() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "completion rate limited, backing off"
        );
        on_retry();

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = stop.cancelled() => return Err(CompletionError::Cancelled),
        }
        attempt += 1;
    }
}
