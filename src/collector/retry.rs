//! Retry with exponential backoff for cloud fetches.

use crate::error::{Result, TenantGraphError};
use std::future::Future;
use std::time::Duration;

/// How often and how patiently a single fetch is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Growth factor between retries
    pub backoff_multiplier: f64,
    /// Upper bound for the computed delay
    pub max_backoff: Duration,
    /// Timeout for each individual attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), capped at `max_backoff`.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry.min(32) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor).min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    ///
    /// Each attempt is bounded by `attempt_timeout`; an expired attempt counts
    /// as a transient failure. A server supplied `Retry-After` replaces the
    /// computed delay, still capped at `max_backoff`.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-transient error immediately.
    pub async fn run<T, F, Fut>(&self, resource_id: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            let error = match tokio::time::timeout(self.attempt_timeout, operation()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => crate::err!(FetchTimeout {
                    resource_id: resource_id.to_string(),
                    timeout_secs: self.attempt_timeout.as_secs(),
                }),
            };

            if !error.is_transient() || retry >= self.max_retries {
                return Err(error);
            }

            let delay = error
                .retry_after()
                .map_or_else(|| self.backoff(retry), |after| after.min(self.max_backoff));
            retry += 1;
            tracing::warn!(
                resource_id = %resource_id,
                attempt = retry,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Fetch failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Short human readable reason for an abandoned fetch.
pub(crate) fn abandon_reason(error: &TenantGraphError) -> String {
    match error {
        TenantGraphError::Throttled { .. } => "throttled, retries exhausted".to_string(),
        TenantGraphError::FetchTimeout { timeout_secs, .. } => {
            format!("timed out after {timeout_secs}s, retries exhausted")
        }
        TenantGraphError::CloudApi { status_code: Some(code), message, .. } => {
            format!("cloud API error {code}: {message}")
        }
        other => other.to_string(),
    }
}
