//! Retry utilities with exponential backoff and jitter.
//!
//! Applied to the LLM Adapter's non-streaming `complete` call when the
//! provider returns a retryable error (`Error::LlmRateLimit`, or an HTTP
//! 429/5xx). The streaming answer phase is never retried mid-stream — a
//! failure there is surfaced best-effort per the error-handling design
//! instead of restarted from scratch.

use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry configuration: bounded attempt count and bounded max delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Exponential delay with full jitter for the given attempt (0-indexed),
/// capped at `config.max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.base_delay.as_millis().saturating_mul(1u128 << attempt.min(16));
    let capped = exp.min(config.max_delay.as_millis());
    let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
    Duration::from_millis(jittered as u64)
}

/// Run `op` up to `config.max_attempts` times, sleeping with jittered
/// exponential backoff between attempts, stopping early on a non-retryable
/// error.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < config.max_attempts => {
                let delay = backoff_delay(config, attempt);
                log::warn!("retrying after transient error ({attempt}): {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        for attempt in 0..10 {
            let delay = backoff_delay(&config, attempt);
            assert!(delay <= config.max_delay);
        }
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_failure() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };

        let result = with_retry(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::LlmRateLimit("429".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_non_retryable() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result: Result<i32> = with_retry(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::LlmError("auth failed".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result: Result<i32> = with_retry(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::LlmRateLimit("429".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
