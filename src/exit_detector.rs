//! Secondary graceful-exit heuristics.
//!
//! Records an explicit `done` signal (from a structured `EXIT_SIGNAL`) and a
//! `test-only-loop` signal, then decides whether the outer loop should stop
//! even without a promise-phrase detection. A graceful exit counts as
//! success for the circuit breaker.

use std::sync::Mutex;

const TEST_ONLY_STREAK_THRESHOLD: u32 = 3;
const GRACEFUL_SCORE_THRESHOLD: u32 = 20;

#[derive(Debug, Default)]
struct ExitState {
    done: bool,
    test_only_streak: u32,
}

pub struct ExitDetector {
    state: Mutex<ExitState>,
}

impl ExitDetector {
    pub fn new() -> Self {
        Self { state: Mutex::new(ExitState::default()) }
    }

    /// Records an explicit structured-completion signal for this iteration.
    pub fn record_done(&self) {
        self.state.lock().unwrap().done = true;
    }

    /// Records whether this iteration looked like a test-only loop.
    /// Resets the streak when `test_only` is false.
    pub fn record_test_only_loop(&self, test_only: bool) {
        let mut state = self.state.lock().unwrap();
        if test_only {
            state.test_only_streak += 1;
        } else {
            state.test_only_streak = 0;
        }
    }

    /// True when a `done` was recorded, or when `score` is high enough and
    /// consecutive test-only loops exceed a small threshold.
    pub fn should_exit_gracefully(&self, score: u32) -> bool {
        let state = self.state.lock().unwrap();
        state.done || (score >= GRACEFUL_SCORE_THRESHOLD && state.test_only_streak >= TEST_ONLY_STREAK_THRESHOLD)
    }

    /// Clears all recorded signals; used on explicit circuit-breaker reset.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = ExitState::default();
    }
}

impl Default for ExitDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_signal_is_sufficient() {
        let d = ExitDetector::new();
        d.record_done();
        assert!(d.should_exit_gracefully(0));
    }

    #[test]
    fn no_signals_means_no_exit() {
        let d = ExitDetector::new();
        assert!(!d.should_exit_gracefully(100));
    }

    #[test]
    fn test_only_streak_with_score_triggers_exit() {
        let d = ExitDetector::new();
        d.record_test_only_loop(true);
        d.record_test_only_loop(true);
        assert!(!d.should_exit_gracefully(50));
        d.record_test_only_loop(true);
        assert!(d.should_exit_gracefully(50));
    }

    #[test]
    fn low_score_blocks_streak_based_exit() {
        let d = ExitDetector::new();
        for _ in 0..5 {
            d.record_test_only_loop(true);
        }
        assert!(!d.should_exit_gracefully(5));
    }

    #[test]
    fn non_test_only_iteration_resets_streak() {
        let d = ExitDetector::new();
        d.record_test_only_loop(true);
        d.record_test_only_loop(true);
        d.record_test_only_loop(false);
        d.record_test_only_loop(true);
        assert!(!d.should_exit_gracefully(50));
    }
}
