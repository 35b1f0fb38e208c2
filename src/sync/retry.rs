//! Retry policy for store calls: bounded attempts, exponential backoff, jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::config::SyncConfig;
use crate::error::{EngineError, StoreError};

/// Bounded retry with exponential backoff and jitter for store calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
    pub backoff: f64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 100,
            backoff: 2.0,
            jitter_ms: 50,
        }
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last: StoreError,
}

impl From<RetryExhausted> for EngineError {
    fn from(e: RetryExhausted) -> Self {
        if e.last.is_retryable() {
            EngineError::SyncFailure {
                attempts: e.attempts,
                message: e.last.to_string(),
            }
        } else {
            EngineError::Store(e.last)
        }
    }
}

impl From<&SyncConfig> for RetryPolicy {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            attempts: cfg.retry_attempts,
            delay_ms: cfg.retry_delay_ms,
            backoff: cfg.retry_backoff,
            jitter_ms: cfg.retry_jitter_ms,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `n + 1`, given that `n` attempts have failed.
    fn delay_after(&self, failed: u32) -> Duration {
        let factor = self.backoff.powi(failed.saturating_sub(1) as i32);
        let base = (self.delay_ms as f64 * factor).round() as u64;
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let budget = self.attempts.max(1);
        let mut failed = 0;

        loop {
            match operation().await {
                Ok(val) => return Ok(val),
                Err(e) => {
                    failed += 1;
                    if failed >= budget || !e.is_retryable() {
                        return Err(RetryExhausted {
                            attempts: failed,
                            last: e,
                        });
                    }
                    let delay = self.delay_after(failed);
                    warn!(
                        "store call failed (attempt {}/{}): {} - retrying in {:?}",
                        failed, budget, e, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
