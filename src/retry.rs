//! Retry executor wrapping one adapter attempt with backoff and error
//! classification, following the pack's `RetryConfig`/`RetryExecutor` idiom
//! (named presets, attempt/wait metrics) adapted to the three backoff
//! strategies `spec.md` requires.

use crate::model::{BackoffStrategy, RetryPolicy};
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

impl RetryPolicy {
    /// A fast-fail policy for low-latency, low-risk calls.
    pub fn fast() -> Self {
        Self {
            max_attempts: 2,
            strategy: BackoffStrategy::Fixed,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// A conservative policy for expensive or critical calls.
    pub fn conservative() -> Self {
        Self {
            max_attempts: 5,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
            multiplier: 2.5,
            ..Self::default()
        }
    }

    /// Validates construction-time invariants; a builder that detects an
    /// invalid policy should fall back to `Self::default()` rather than abort.
    pub fn validate(&self) -> bool {
        self.max_attempts >= 1
            && self.initial_delay <= self.max_delay
            && self.multiplier >= 0.0
            && (0.0..=1.0).contains(&self.jitter_factor)
    }

    /// Builds a policy, silently falling back to defaults if `self` is invalid.
    pub fn must_build(self) -> Self {
        if self.validate() {
            self
        } else {
            Self::default()
        }
    }

    /// `exp -> initial × multiplier^(attempt-1)`; `linear -> initial + increment × (attempt-1)`;
    /// `fixed -> initial`. Clamped to `max_delay`; jitter adds `U(0, jitter_factor × delay)`.
    pub fn next_wait_duration(&self, attempt: u32) -> Duration {
        let n = attempt.saturating_sub(1);
        let base = match self.strategy {
            BackoffStrategy::Exponential => {
                let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(n as i32);
                Duration::from_secs_f64(secs.max(0.0))
            }
            BackoffStrategy::Linear => self.initial_delay + self.increment * n,
            BackoffStrategy::Fixed => self.initial_delay,
        };

        let clamped = if self.max_delay > Duration::ZERO && base > self.max_delay {
            self.max_delay
        } else {
            base
        };

        if self.jitter && self.jitter_factor > 0.0 {
            let max_jitter_secs = clamped.as_secs_f64() * self.jitter_factor;
            let jitter_secs = rand::thread_rng().gen_range(0.0..=max_jitter_secs.max(0.0));
            clamped + Duration::from_secs_f64(jitter_secs)
        } else {
            clamped
        }
    }

    /// False if `attempt ≥ max_attempts`. False if the message matches any
    /// non-retryable pattern (case-insensitive substring). If
    /// `retryable_patterns` is non-empty, a match is required; otherwise
    /// defaults to true.
    pub fn should_retry(&self, attempt: u32, error_message: &str) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }

        let lower = error_message.to_lowercase();
        if self.non_retryable_patterns.iter().any(|p| lower.contains(&p.to_lowercase())) {
            return false;
        }

        if !self.retryable_patterns.is_empty() {
            return self.retryable_patterns.iter().any(|p| lower.contains(&p.to_lowercase()));
        }

        true
    }
}

/// Outcome of running `RetryExecutor::execute`.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: Option<T>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration: Duration,
    pub successful_retries: u32,
    pub failed_retries: u32,
    pub total_wait: Duration,
}

/// Wraps one logical operation with the policy's backoff and retryability
/// rules, cooperating with a `CancellationToken` for early abort.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy: policy.must_build() }
    }

    /// Runs `f` until it succeeds, retries are exhausted, or `cancel` fires.
    /// On cancellation, returns immediately without invoking `f` again.
    pub async fn execute<T, E, F, Fut>(&self, cancel: &CancellationToken, mut f: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        let mut attempt = 0u32;
        let mut total_wait = Duration::ZERO;
        let mut failed_retries = 0u32;
        let mut last_error: Option<String> = None;

        loop {
            attempt += 1;

            if cancel.is_cancelled() {
                return RetryOutcome {
                    value: None,
                    error: Some("operation cancelled".to_string()),
                    attempts: attempt - 1,
                    duration: start.elapsed(),
                    successful_retries: 0,
                    failed_retries,
                    total_wait,
                };
            }

            match f(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        value: Some(value),
                        error: None,
                        attempts: attempt,
                        duration: start.elapsed(),
                        successful_retries: if attempt > 1 { 1 } else { 0 },
                        failed_retries,
                        total_wait,
                    };
                }
                Err(err) => {
                    let message = err.to_string();
                    failed_retries += 1;
                    last_error = Some(message.clone());

                    if !self.policy.should_retry(attempt, &message) {
                        return RetryOutcome {
                            value: None,
                            error: last_error,
                            attempts: attempt,
                            duration: start.elapsed(),
                            successful_retries: 0,
                            failed_retries,
                            total_wait,
                        };
                    }

                    let delay = self.policy.next_wait_duration(attempt);
                    total_wait += delay;

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return RetryOutcome {
                                value: None,
                                error: Some("operation cancelled".to_string()),
                                attempts: attempt,
                                duration: start.elapsed(),
                                successful_retries: 0,
                                failed_retries,
                                total_wait,
                            };
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn exponential_backoff_matches_formula() {
        let policy = RetryPolicy {
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_wait_duration(1), Duration::from_millis(10));
        assert_eq!(policy.next_wait_duration(2), Duration::from_millis(20));
        assert_eq!(policy.next_wait_duration(3), Duration::from_millis(40));
    }

    #[test]
    fn linear_backoff_matches_formula() {
        let policy = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            initial_delay: Duration::from_millis(10),
            increment: Duration::from_millis(5),
            jitter: false,
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_wait_duration(1), Duration::from_millis(10));
        assert_eq!(policy.next_wait_duration(3), Duration::from_millis(20));
    }

    #[test]
    fn delay_is_clamped_to_max() {
        let policy = RetryPolicy {
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(100),
            multiplier: 10.0,
            jitter: false,
            max_delay: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_wait_duration(5), Duration::from_millis(500));
    }

    #[test]
    fn non_retryable_pattern_blocks_retry() {
        let policy = RetryPolicy {
            non_retryable_patterns: vec!["not found".to_string()],
            ..RetryPolicy::default()
        };
        assert!(!policy.should_retry(1, "Resource NOT FOUND"));
    }

    #[test]
    fn retryable_patterns_require_a_match() {
        let policy = RetryPolicy {
            retryable_patterns: vec!["timeout".to_string()],
            ..RetryPolicy::default()
        };
        assert!(policy.should_retry(1, "connection timeout"));
        assert!(!policy.should_retry(1, "invalid argument"));
    }

    #[test]
    fn invalid_policy_falls_back_to_default() {
        let invalid = RetryPolicy { max_attempts: 0, ..RetryPolicy::default() };
        let built = invalid.must_build();
        assert_eq!(built.max_attempts, RetryPolicy::default().max_attempts);
    }

    #[tokio::test]
    async fn s5_retry_with_exponential_backoff() {
        let policy = RetryPolicy {
            max_attempts: 4,
            strategy: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
            max_delay: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        let executor = RetryExecutor::new(policy);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let outcome = executor
            .execute(&cancel, |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 4 {
                        Err(format!("fail {n}"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.value, Some(4));
        assert_eq!(outcome.successful_retries, 1);
        assert!(outcome.total_wait >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn s6_cancellation_mid_backoff() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            jitter: false,
            ..RetryPolicy::default()
        };
        let executor = RetryExecutor::new(policy);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let outcome = executor
            .execute(&cancel, |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>("always fails") }
            })
            .await;

        assert!(outcome.value.is_none());
        assert!(outcome.attempts <= 2);
    }
}
