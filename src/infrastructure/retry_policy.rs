//! Uniform retry policy for the listing source boundary
//!
//! One `{max_attempts, backoff_delay}` policy, doubled per attempt and capped,
//! instead of ad-hoc loops scattered over every collector.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::infrastructure::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one, at least 1
    pub max_attempts: u32,
    pub backoff_delay: Duration,
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_delay: Duration::from_millis(config.backoff_delay_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter,
        }
    }

    /// Single attempt, no waiting
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_delay: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay to wait after the given failed attempt (1-based):
    /// `backoff_delay * 2^(attempt - 1)`, capped at `max_backoff`
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.backoff_delay.saturating_mul(factor).min(self.max_backoff);
        if self.jitter && !base.is_zero() {
            // up to 10% extra
            let extra_ms = fastrand::u64(0..=base.as_millis() as u64 / 10);
            base + Duration::from_millis(extra_ms)
        } else {
            base
        }
    }

    /// Runs `operation` until it succeeds, `is_retryable` rejects the error, or
    /// the attempts are used up. Returns the last error and the attempts made.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, (E, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label, attempt, self.max_attempts, delay, e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_delay: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            jitter: false,
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(2), Duration::from_millis(200));
        assert_eq!(p.delay_after(3), Duration::from_millis(350));
        assert_eq!(p.delay_after(40), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let p = RetryPolicy { jitter: true, ..policy(3) };
        for _ in 0..50 {
            let d = p.delay_after(2);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(220));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, (String, u32)> = policy(3)
            .run(
                "flaky",
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err(format!("attempt {n}")) } else { Ok(n) }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), (String, u32)> = policy(2)
            .run(
                "down",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("unavailable".to_string())
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Err(("unavailable".to_string(), 2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), (String, u32)> = policy(5)
            .run(
                "malformed",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("bad json".to_string())
                },
                |_| false,
            )
            .await;

        assert_eq!(result, Err(("bad json".to_string(), 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
