//! Instrumentation hooks passed into the runner and pipeline roles.

use std::{collections::BTreeMap, fmt};

use dashmap::DashMap;

/// Checks that completed, labelled by monitor.
pub const MONITORS_PROCESSED_TOTAL: &str = "monitors_processed_total";
/// Checks that failed to fetch, labelled by monitor.
pub const MONITORS_ERRORED_TOTAL: &str = "monitors_errored_total";
/// Jobs waiting for an executor.
pub const MONITORS_QUEUED: &str = "monitors_queued";
/// Last aggregate state per monitor, 1 or 0.
pub const MONITOR_STATE: &str = "monitor_state";
/// Next scheduled check per monitor, in unix seconds.
pub const MONITOR_NEXT_CHECK_AT: &str = "monitor_next_check_at";
/// Notifier calls that returned an error.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "notifications_failed_total";

/// Receives counters, gauges and observations.
pub trait MetricsSink: Send + Sync + fmt::Debug {
    /// Adds one to counter `name`.
    fn increment_counter(&self, name: &'static str, monitor: Option<&str>);

    /// Sets gauge `name` to `value`.
    fn set_gauge(&self, name: &'static str, monitor: Option<&str>, value: f64);

    /// Records one sample of `name`.
    fn observe(&self, name: &'static str, monitor: Option<&str>, value: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment_counter(&self, _name: &'static str, _monitor: Option<&str>) {}

    fn set_gauge(&self, _name: &'static str, _monitor: Option<&str>, _value: f64) {}

    fn observe(&self, _name: &'static str, _monitor: Option<&str>, _value: f64) {}
}

fn key(name: &str, monitor: Option<&str>) -> String {
    match monitor {
        Some(monitor) => format!("{name}{{monitor=\"{monitor}\"}}"),
        None => name.to_string(),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Summary {
    count: u64,
    sum: f64,
}

/// Keeps the latest value of every metric in memory.
///
/// Keys are the metric name, followed by `{monitor="..."}` for per-monitor
/// series. Observations are kept as count and sum.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    values: DashMap<String, f64>,
    summaries: DashMap<String, Summary>,
}

impl InMemoryMetrics {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current value of a counter or gauge.
    pub fn value(&self, name: &str, monitor: Option<&str>) -> Option<f64> {
        self.values.get(&key(name, monitor)).map(|v| *v)
    }

    /// Sample count and sum of an observed metric.
    pub fn summary(&self, name: &str, monitor: Option<&str>) -> Option<(u64, f64)> {
        self.summaries.get(&key(name, monitor)).map(|s| (s.count, s.sum))
    }

    /// Every counter and gauge, sorted by key.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }

    /// Writes the counters and gauges to the log.
    pub fn log_summary(&self) {
        for (key, value) in self.snapshot() {
            tracing::info!(metric = %key, value, "Metrics summary.");
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment_counter(&self, name: &'static str, monitor: Option<&str>) {
        *self.values.entry(key(name, monitor)).or_insert(0.0) += 1.0;
    }

    fn set_gauge(&self, name: &'static str, monitor: Option<&str>, value: f64) {
        self.values.insert(key(name, monitor), value);
    }

    fn observe(&self, name: &'static str, monitor: Option<&str>, value: f64) {
        let mut summary = self.summaries.entry(key(name, monitor)).or_default();
        summary.count += 1;
        summary.sum += value;
    }
}
