//! Retry executors for external calls and record updates.
//!
//! [`execute`] retries any error with exponential delay `initial * 2^attempt` and no jitter.
//! [`execute_linear`] is the record-update variant that waits `step * (attempt + 1)`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use likeness_core::constants::{
    BASE64_INITIAL_DELAY_MS, BASE64_MAX_ATTEMPTS, DB_UPDATE_MAX_ATTEMPTS, DB_UPDATE_STEP_MS,
    GENERATION_INITIAL_DELAY_MS, GENERATION_MAX_ATTEMPTS,
};

/// Attempt count and base delay for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(initial_delay_ms),
        }
    }

    /// Image generation and enhancement calls.
    pub const fn generation() -> Self {
        Self::new(GENERATION_MAX_ATTEMPTS, GENERATION_INITIAL_DELAY_MS)
    }

    /// Reference image to base64 conversion.
    pub const fn base64() -> Self {
        Self::new(BASE64_MAX_ATTEMPTS, BASE64_INITIAL_DELAY_MS)
    }

    /// Record update after a successful generation. Used with [`execute_linear`].
    pub const fn record_update() -> Self {
        Self::new(DB_UPDATE_MAX_ATTEMPTS, DB_UPDATE_STEP_MS)
    }

    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn linear_delay(&self, attempt: u32) -> Duration {
        self.initial_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// At least one attempt is always made.
    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

async fn run<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    delay_for: impl Fn(u32) -> Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(operation = label, attempt = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt + 1 < attempts => {
                let delay = delay_for(attempt);
                tracing::warn!(
                    operation = label,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    operation = label,
                    attempts,
                    error = %e,
                    "All attempts failed"
                );
                return Err(e);
            }
        }
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` calls have failed,
/// returning the last error in that case.
pub async fn execute<T, E, F, Fut>(policy: &RetryPolicy, label: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run(policy, label, |a| policy.exponential_delay(a), operation).await
}

/// Same contract as [`execute`] with linearly increasing delays.
pub async fn execute_linear<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run(policy, label, |a| policy.linear_delay(a), operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<&'static str, String> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(format!("failure {}", n + 1))
        } else {
            Ok("ok")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures_with_k_plus_one_calls() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 5_000);
        let start = Instant::now();

        let result = execute(&policy, "test", || flaky(&calls, 2)).await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 5s + 10s
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 1_000);

        let result = execute(&policy, "test", || flaky(&calls, 10)).await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_runs_immediately() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = execute(&RetryPolicy::generation(), "test", || flaky(&calls, 0)).await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn linear_delays_grow_by_step() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = execute_linear(&RetryPolicy::record_update(), "update", || flaky(&calls, 10)).await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // 1 + 2 + 3 + 4 seconds, no sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);
        let result = execute(&RetryPolicy::new(0, 10), "test", || flaky(&calls, 10)).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_delay_doubles() {
        let policy = RetryPolicy::base64();
        assert_eq!(policy.exponential_delay(0), Duration::from_secs(2));
        assert_eq!(policy.exponential_delay(1), Duration::from_secs(4));
        assert_eq!(policy.exponential_delay(3), Duration::from_secs(16));
    }
}
