//! Circuit breaker gating `LoopClient::execute_loop`.
//!
//! Three-state machine (`closed`/`open`/`half_open`) built the same way the
//! pack's resilience reference does it: an `RwLock`-guarded state plus
//! atomic counters, with `last_transition_at` gating the open→half-open
//! recovery window. Unlike a request-volume breaker, the inputs here are
//! the three iteration outcomes `spec.md` names: `success`, `no_progress`,
//! and `same_error(fingerprint)`.

use crate::model::CircuitState;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub no_progress_threshold: u32,
    pub same_error_threshold: u32,
    /// How long `open` must elapse before a probe is allowed through as `half_open`.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            no_progress_threshold: 5,
            same_error_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

struct Inner {
    state: CircuitState,
    last_transition_at: Instant,
}

/// Gate consulted before every iteration. `is_open` is the sole check
/// `ExecuteLoop` makes before running an adapter.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<Inner>,
    no_progress_count: AtomicU32,
    same_error_count: AtomicU32,
    last_error_fingerprint: RwLock<Option<String>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner { state: CircuitState::Closed, last_transition_at: Instant::now() }),
            no_progress_count: AtomicU32::new(0),
            same_error_count: AtomicU32::new(0),
            last_error_fingerprint: RwLock::new(None),
        }
    }

    /// True when the breaker currently rejects calls. If `open` has outlived
    /// `recovery_timeout`, transitions to `half_open` and returns false so
    /// exactly one probe call is allowed through.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.state {
            CircuitState::Open => {
                if inner.last_transition_at.elapsed() > self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_transition_at = Instant::now();
                    false
                } else {
                    true
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().unwrap().state
    }

    /// Success resets both counters to zero and closes the breaker.
    pub fn record_success(&self) {
        self.no_progress_count.store(0, Ordering::Relaxed);
        self.same_error_count.store(0, Ordering::Relaxed);
        *self.last_error_fingerprint.write().unwrap() = None;
        self.transition_to(CircuitState::Closed);
    }

    /// Empty output or stuck detection: bumps `no_progress_count` and opens
    /// the breaker once it reaches `no_progress_threshold`.
    pub fn record_no_progress(&self) {
        let count = self.no_progress_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.config.no_progress_threshold {
            self.transition_to(CircuitState::Open);
        }
    }

    /// Bumps `same_error_count` only if `fingerprint` matches the stored
    /// one, else resets it to 1. Opens once the threshold is reached.
    pub fn record_same_error(&self, fingerprint: &str) {
        let mut stored = self.last_error_fingerprint.write().unwrap();
        let count = if stored.as_deref() == Some(fingerprint) {
            self.same_error_count.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            *stored = Some(fingerprint.to_string());
            self.same_error_count.store(1, Ordering::Relaxed);
            1
        };
        drop(stored);

        if count >= self.config.same_error_threshold {
            self.transition_to(CircuitState::Open);
        }
    }

    /// Explicit reset: clears counters and closes the breaker unconditionally.
    pub fn reset(&self) {
        self.no_progress_count.store(0, Ordering::Relaxed);
        self.same_error_count.store(0, Ordering::Relaxed);
        *self.last_error_fingerprint.write().unwrap() = None;
        self.transition_to(CircuitState::Closed);
    }

    fn transition_to(&self, new_state: CircuitState) {
        let mut inner = self.inner.write().unwrap();
        if inner.state != new_state {
            inner.state = new_state;
            inner.last_transition_at = Instant::now();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_no_progress_threshold() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { no_progress_threshold: 3, ..Default::default() });
        for _ in 0..2 {
            cb.record_no_progress();
            assert!(!cb.is_open());
        }
        cb.record_no_progress();
        assert!(cb.is_open());
    }

    #[test]
    fn opens_after_same_error_threshold() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { same_error_threshold: 3, ..Default::default() });
        cb.record_same_error("fp-a");
        cb.record_same_error("fp-a");
        assert!(!cb.is_open());
        cb.record_same_error("fp-a");
        assert!(cb.is_open());
    }

    #[test]
    fn different_fingerprint_resets_same_error_count() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { same_error_threshold: 3, ..Default::default() });
        cb.record_same_error("fp-a");
        cb.record_same_error("fp-a");
        cb.record_same_error("fp-b");
        assert!(!cb.is_open());
    }

    #[test]
    fn success_closes_and_resets_counters() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { no_progress_threshold: 2, ..Default::default() });
        cb.record_no_progress();
        cb.record_success();
        cb.record_no_progress();
        assert!(!cb.is_open());
    }

    #[test]
    fn explicit_reset_closes_breaker() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { no_progress_threshold: 1, ..Default::default() });
        cb.record_no_progress();
        assert!(cb.is_open());
        cb.reset();
        assert!(!cb.is_open());
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
