//! Bounded exponential backoff for provider calls

use crate::config::RetryConfig;
use crate::error::{RagError, Result};
use std::future::Future;
use std::time::Duration;

/// Retry schedule applied at the embedding and generation client boundary
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based): initial * 2^attempt, capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    fn delay_after(&self, attempt: u32, error: &RagError) -> Duration {
        let backoff = self.backoff_for(attempt);
        match error {
            RagError::RateLimited {
                retry_after_secs: Some(secs),
            } => backoff
                .max(Duration::from_secs(*secs))
                .min(self.max_backoff),
            _ => backoff,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only transient errors (`UpstreamUnavailable`, `RateLimited`) are
    /// retried; the last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let wait = self.delay_after(attempt, &e);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
