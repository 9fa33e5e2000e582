//! services/pipeline/src/retry.rs
//!
//! A small, composable bounded-retry policy with exponential backoff.
//!
//! The generator uses two independent instances of this (network retries
//! vs. re-prompts), so the policy is explicit data rather than an inline
//! loop: max attempts, a backoff function, and a caller-supplied
//! retryable-predicate.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// A bounded retry policy: up to `max_attempts` tries, sleeping an
/// exponentially growing delay (doubling from `base_delay`, capped at
/// `max_delay`) between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// The delay to sleep after a failed attempt number `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails non-retryably, or the attempt
    /// budget is spent. The closure receives the 1-based attempt number.
    pub async fn run<T, E, Fut, Op, P>(&self, mut op: Op, retryable: P) -> Result<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retryable failure, backing off: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(4, Duration::from_secs(2), Duration::from_secs(30))
    }

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::new(8, Duration::from_secs(2), Duration::from_secs(30));
        let delays: Vec<u64> = (1..=6).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = policy()
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err("transient".to_string())
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |_| true,
            )
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_exits_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = policy()
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal".to_string()) }
                },
                |err| err != "fatal",
            )
            .await;
        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = policy()
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("transient".to_string()) }
                },
                |_| true,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
