// Bounded exponential backoff for GitHub API calls.
// Retries live here, in the adapter, so the workflow core never retries itself.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::github::GitHubError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubRetryHandler {
    config: RetryConfig,
}

impl Default for GitHubRetryHandler {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl GitHubRetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time up to the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Run `operation`, retrying retryable failures until `max_attempts` is reached.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, GitHubError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitHubError>>,
    {
        self.run(operation_name, operation, GitHubError::is_retryable)
            .await
    }

    /// Run a request that creates something (an issue, a comment).
    ///
    /// Only rate-limited attempts are retried. Any other failure may already
    /// have been applied by GitHub, and sending it again would duplicate it.
    pub async fn execute_create<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, GitHubError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitHubError>>,
    {
        self.run(operation_name, operation, GitHubError::is_rate_limited)
            .await
    }

    async fn run<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
        should_retry: fn(&GitHubError) -> bool,
    ) -> Result<T, GitHubError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitHubError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation_name, attempt);
                    }
                    return Ok(value);
                }
                Err(error) if should_retry(&error) && attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "GitHub API call failed (retryable): {}",
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
