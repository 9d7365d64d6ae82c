//! Stateful, concurrency-safe failure detectors.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const CONNECTION_SUBSTRINGS: &[&str] = &["refused", "reset", "timeout", "no such host", "unreachable", "eof"];

/// Common capability every detector exposes: `detect`, a type label, and `reset`.
pub trait FailureDetector: Send + Sync {
    fn detect(&self, error_message: &str, duration: Duration) -> bool;
    fn kind(&self) -> &'static str;
    fn reset(&self);
}

/// Fires when `duration > threshold` for `consecutive_threshold` consecutive
/// attempts; any faster attempt resets the counter.
pub struct TimeoutDetector {
    threshold: Duration,
    consecutive_threshold: u32,
    state: Mutex<u32>,
}

impl TimeoutDetector {
    pub fn new(threshold: Duration, consecutive_threshold: u32) -> Self {
        Self { threshold, consecutive_threshold, state: Mutex::new(0) }
    }
}

impl FailureDetector for TimeoutDetector {
    fn detect(&self, _error_message: &str, duration: Duration) -> bool {
        let mut count = self.state.lock().unwrap();
        if duration > self.threshold {
            *count += 1;
        } else {
            *count = 0;
        }
        *count >= self.consecutive_threshold
    }

    fn kind(&self) -> &'static str {
        "timeout"
    }

    fn reset(&self) {
        *self.state.lock().unwrap() = 0;
    }
}

/// Sliding window of N results; fires once the window is full and the
/// failure fraction exceeds `threshold`.
pub struct ErrorRateDetector {
    window_size: usize,
    threshold: f64,
    window: Mutex<VecDeque<bool>>,
}

impl ErrorRateDetector {
    pub fn new(window_size: usize, threshold: f64) -> Self {
        Self { window_size, threshold, window: Mutex::new(VecDeque::with_capacity(window_size)) }
    }

    /// Records one result (`true` = failure) and returns whether the
    /// detector fires on the current window.
    pub fn record(&self, failed: bool) -> bool {
        let mut window = self.window.lock().unwrap();
        if window.len() == self.window_size {
            window.pop_front();
        }
        window.push_back(failed);

        if window.len() < self.window_size {
            return false;
        }

        let failures = window.iter().filter(|f| **f).count();
        (failures as f64 / self.window_size as f64) > self.threshold
    }
}

impl FailureDetector for ErrorRateDetector {
    fn detect(&self, _error_message: &str, _duration: Duration) -> bool {
        self.record(true)
    }

    fn kind(&self) -> &'static str {
        "error_rate"
    }

    fn reset(&self) {
        self.window.lock().unwrap().clear();
    }
}

/// Runs a caller-supplied probe at most once per `check_interval`; fires
/// after `max_unhealthy` consecutive failed probes.
pub struct HealthCheckDetector {
    check_interval: Duration,
    max_unhealthy: u32,
    last_check: Mutex<Option<Instant>>,
    consecutive_unhealthy: Mutex<u32>,
}

impl HealthCheckDetector {
    pub fn new(check_interval: Duration, max_unhealthy: u32) -> Self {
        Self {
            check_interval,
            max_unhealthy,
            last_check: Mutex::new(None),
            consecutive_unhealthy: Mutex::new(0),
        }
    }

    /// Runs `probe` if the interval has elapsed since the last run; returns
    /// whether the detector fires. If the interval hasn't elapsed, returns
    /// the previous verdict without invoking `probe` again.
    pub fn check<F: FnOnce() -> bool>(&self, probe: F) -> bool {
        let mut last_check = self.last_check.lock().unwrap();
        let should_run = last_check.map(|t| t.elapsed() >= self.check_interval).unwrap_or(true);

        if !should_run {
            return *self.consecutive_unhealthy.lock().unwrap() >= self.max_unhealthy;
        }

        *last_check = Some(Instant::now());
        let healthy = probe();

        let mut consecutive = self.consecutive_unhealthy.lock().unwrap();
        if healthy {
            *consecutive = 0;
        } else {
            *consecutive += 1;
        }
        *consecutive >= self.max_unhealthy
    }
}

impl FailureDetector for HealthCheckDetector {
    fn detect(&self, _error_message: &str, _duration: Duration) -> bool {
        self.check(|| false)
    }

    fn kind(&self) -> &'static str {
        "health_check"
    }

    fn reset(&self) {
        *self.last_check.lock().unwrap() = None;
        *self.consecutive_unhealthy.lock().unwrap() = 0;
    }
}

/// Matches the error message against a fixed list of network-layer
/// substrings; fires after `threshold` consecutive matches.
pub struct ConnectionDetector {
    threshold: u32,
    consecutive: Mutex<u32>,
}

impl ConnectionDetector {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, consecutive: Mutex::new(0) }
    }
}

impl FailureDetector for ConnectionDetector {
    fn detect(&self, error_message: &str, _duration: Duration) -> bool {
        let lower = error_message.to_lowercase();
        let mut consecutive = self.consecutive.lock().unwrap();
        if CONNECTION_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
            *consecutive += 1;
        } else {
            *consecutive = 0;
        }
        *consecutive >= self.threshold
    }

    fn kind(&self) -> &'static str {
        "connection"
    }

    fn reset(&self) {
        *self.consecutive.lock().unwrap() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_detector_fires_on_consecutive_overruns() {
        let d = TimeoutDetector::new(Duration::from_millis(100), 3);
        assert!(!d.detect("", Duration::from_millis(150)));
        assert!(!d.detect("", Duration::from_millis(150)));
        assert!(d.detect("", Duration::from_millis(150)));
    }

    #[test]
    fn timeout_detector_resets_on_fast_attempt() {
        let d = TimeoutDetector::new(Duration::from_millis(100), 2);
        assert!(!d.detect("", Duration::from_millis(150)));
        assert!(!d.detect("", Duration::from_millis(10)));
        assert!(!d.detect("", Duration::from_millis(150)));
    }

    #[test]
    fn error_rate_detector_waits_for_full_window() {
        let d = ErrorRateDetector::new(4, 0.5);
        assert!(!d.record(true));
        assert!(!d.record(true));
        assert!(!d.record(true));
        assert!(d.record(true));
    }

    #[test]
    fn connection_detector_matches_substrings() {
        let d = ConnectionDetector::new(2);
        assert!(!d.detect("connection refused", Duration::ZERO));
        assert!(d.detect("connection reset by peer", Duration::ZERO));
    }

    #[test]
    fn connection_detector_resets_on_unrelated_error() {
        let d = ConnectionDetector::new(2);
        d.detect("connection refused", Duration::ZERO);
        d.detect("invalid syntax", Duration::ZERO);
        assert!(!d.detect("connection refused", Duration::ZERO));
    }
}
