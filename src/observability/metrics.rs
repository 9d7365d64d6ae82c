//! Lightweight metrics collector: counters, gauges, and timers keyed by
//! name + label set, with a `.start_timer()/drop` idiom mirroring the
//! pack's telemetry helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Bucket boundaries for a histogram metric, in the unit the caller records.
#[derive(Debug, Clone)]
pub struct HistogramBuckets(pub Vec<f64>);

impl Default for HistogramBuckets {
    fn default() -> Self {
        Self(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    }
}

#[derive(Debug, Default)]
pub struct Histogram {
    buckets: Mutex<Vec<(f64, u64)>>,
    sum: Mutex<f64>,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(boundaries: HistogramBuckets) -> Self {
        Self {
            buckets: Mutex::new(boundaries.0.into_iter().map(|b| (b, 0)).collect()),
            sum: Mutex::new(0.0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        *self.sum.lock().unwrap() += value;
        for (boundary, count) in self.buckets.lock().unwrap().iter_mut() {
            if value <= *boundary {
                *count += 1;
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> f64 {
        *self.sum.lock().unwrap()
    }
}

/// A named metric identified by its label set, the same `name{k=v,...}`
/// convention Prometheus exposition uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabeledMetric {
    pub name: String,
    pub labels: Vec<(String, String)>,
}

impl LabeledMetric {
    pub fn new(name: impl Into<String>, labels: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

#[derive(Default)]
pub struct MetricStorage {
    counters: Mutex<HashMap<LabeledMetric, AtomicU64>>,
    gauges: Mutex<HashMap<LabeledMetric, AtomicI64>>,
}

pub struct MetricsCollector {
    storage: MetricStorage,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self { storage: MetricStorage::default() }
    }

    pub fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_by(name, labels, 1);
    }

    pub fn increment_by(&self, name: &str, labels: &[(&str, &str)], delta: u64) {
        let key = LabeledMetric::new(name, labels);
        let mut counters = self.storage.counters.lock().unwrap();
        counters.entry(key).or_insert_with(|| AtomicU64::new(0)).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = LabeledMetric::new(name, labels);
        self.storage.counters.lock().unwrap().get(&key).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = LabeledMetric::new(name, labels);
        let mut gauges = self.storage.gauges.lock().unwrap();
        gauges.entry(key).or_insert_with(|| AtomicI64::new(0)).store(value, Ordering::Relaxed);
    }

    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        let key = LabeledMetric::new(name, labels);
        self.storage.gauges.lock().unwrap().get(&key).map(|g| g.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Starts a timer; recording happens when the returned guard drops,
    /// so a `?`-early-return still records the elapsed duration.
    pub fn start_timer(&self, name: &'static str, _labels: &[(&str, &str)]) -> TimerGuard<'_> {
        TimerGuard { collector: self, name, started: Instant::now() }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TimerGuard<'a> {
    collector: &'a MetricsCollector,
    name: &'static str,
    started: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as i64;
        self.collector.set_gauge(self.name, &[], elapsed_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let collector = MetricsCollector::new();
        collector.increment("loops_executed", &[("adapter", "cli")]);
        collector.increment("loops_executed", &[("adapter", "cli")]);
        assert_eq!(collector.counter_value("loops_executed", &[("adapter", "cli")]), 2);
    }

    #[test]
    fn gauge_overwrites() {
        let collector = MetricsCollector::new();
        collector.set_gauge("pool_size", &[], 3);
        collector.set_gauge("pool_size", &[], 7);
        assert_eq!(collector.gauge_value("pool_size", &[]), 7);
    }

    #[test]
    fn histogram_counts_within_buckets() {
        let h = Histogram::new(HistogramBuckets(vec![1.0, 5.0, 10.0]));
        h.observe(0.5);
        h.observe(3.0);
        h.observe(20.0);
        assert_eq!(h.count(), 3);
        assert!(h.sum() > 23.0);
    }

    #[test]
    fn timer_guard_records_on_drop() {
        let collector = MetricsCollector::new();
        {
            let _timer = collector.start_timer("op_duration_ms", &[]);
        }
        assert!(collector.gauge_value("op_duration_ms", &[]) >= 0);
    }
}
