//! Generic retry with exponential backoff.
//!
//! Wraps pairing calls, message sends and health checks uniformly: run the
//! operation up to `max_attempts` times, sleeping `base * multiplier^n`
//! between failures (capped at `max_delay_ms`), and return the first
//! success or the last error once attempts are exhausted. Every attempt's
//! outcome is logged under the operation's name.

use std::future::Future;
use std::time::Duration;

use crate::protocol::error::{NestlinkError, Result};

/// Retry configuration. Defaults: 3 attempts, 1 s base delay, doubling.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Each subsequent delay is the previous one times this.
    pub multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

/// Runs `operation` until it succeeds or `config.max_attempts` is reached.
pub async fn execute_with_retry<T, F, Fut>(
    name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut delay_ms = config.base_delay_ms;
    let mut last_err = None;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}/{}", name, attempt, attempts);
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => {
                // Protocol and resource errors don't get better on retry.
                tracing::warn!("{} failed with non-retryable error: {}", name, e);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("{} attempt {}/{} failed: {}", name, attempt, attempts, e);
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = std::cmp::min(
                        (delay_ms as f64 * config.multiplier) as u64,
                        config.max_delay_ms,
                    );
                }
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| NestlinkError::ConnectionFailed(format!("{name}: no attempts made"))))
}
