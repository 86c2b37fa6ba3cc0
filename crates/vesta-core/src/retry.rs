//! Bounded exponential backoff shared by every external call.
//!
//! A single [`RetryPolicy`] value is handed to the portal client and to the
//! OpenAI client, so catalog requests, embedding requests and chat
//! completions all back off the same way. Only errors for which
//! [`AppError::is_retryable`] is true are retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay, including `Retry-After` hints.
    pub max_delay: Duration,
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Spread each delay by up to 25% in either direction.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::http()
    }
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            jitter: true,
        }
    }

    /// Policy for portal requests: 500ms doubling up to 30s, five attempts.
    pub fn http() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 5)
    }

    /// Policy for embedding and chat-completion calls: 4s doubling up to 10s,
    /// ten attempts.
    pub fn llm() -> Self {
        Self::new(Duration::from_secs(4), Duration::from_secs(10), 10)
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay after the given failed attempt (1-based).
    ///
    /// ```
    /// use std::time::Duration;
    /// use vesta_core::RetryPolicy;
    ///
    /// let policy = RetryPolicy::llm();
    /// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
    /// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(8));
    /// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(10));
    /// ```
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor: f64 = rand::rng().random_range(0.75..=1.25);
        delay.mul_f64(factor).min(self.max_delay)
    }

    fn backoff(&self, attempt: u32, error: &AppError) -> Duration {
        match error.retry_after() {
            Some(secs) => Duration::from_secs(secs).min(self.max_delay),
            None => self.jittered(self.delay_for_attempt(attempt)),
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned in the latter cases.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt, &e);
                    tracing::debug!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        tracing::warn!(operation, attempts = attempt, error = %e, "Giving up");
                    }
                    return Err(e);
                }
            }
        }
    }
}
