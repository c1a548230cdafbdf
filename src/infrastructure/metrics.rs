//! Runner metrics: operation timings and counters

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// Metric names recorded by the runner.
pub mod names {
    pub const UPDATE: &str = "update";
    pub const UPDATE_ASYNC: &str = "update_async";
    pub const IMPORT: &str = "import";
    pub const REINITIALIZE: &str = "reinitialize";
    pub const GRAPH_UPDATE: &str = "update_graph";
    pub const CONTEXT_BIND: &str = "bind_context_data";
    pub const NODES_BUILT: &str = "nodes_built";
    pub const FAULTS: &str = "faults";
    pub const SKIPPED_DEFINITIONS: &str = "skipped_definitions";
    pub const EVALUATED_BINDINGS: &str = "evaluated_bindings";
}

/// Most recent timings kept per metric for the percentiles.
pub const SAMPLE_WINDOW: usize = 1024;

/// Running aggregates for one timing metric.
#[derive(Debug, Default)]
struct Series {
    count: usize,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
    recent: VecDeque<Duration>,
}

impl Series {
    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total = self.total.saturating_add(duration);
        self.min = Some(self.min.map_or(duration, |min| min.min(duration)));
        self.max = self.max.max(duration);

        if self.recent.len() == SAMPLE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(duration);
    }
}

/// Metrics collector owned by one runner
pub struct RunnerMetrics {
    timings: RwLock<BTreeMap<String, Series>>,
    counters: RwLock<BTreeMap<String, u64>>,
    start_time: Instant,
}

impl RunnerMetrics {
    pub fn new() -> Self {
        Self {
            timings: RwLock::new(BTreeMap::new()),
            counters: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_timing(&self, name: impl Into<String>, duration: Duration) {
        let mut timings = self.timings.write();
        timings.entry(name.into()).or_default().record(duration);
    }

    pub fn increment(&self, name: impl Into<String>) {
        self.add(name, 1);
    }

    pub fn add(&self, name: impl Into<String>, value: u64) {
        let mut counters = self.counters.write();
        *counters.entry(name.into()).or_default() += value;
    }

    pub fn timing_stats(&self, name: &str) -> Option<TimingStats> {
        self.timings.read().get(name).map(TimingStats::from_series)
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn reset(&self) {
        self.timings.write().clear();
        self.counters.write().clear();
    }

    pub fn summary(&self) -> MetricsSummary {
        let timings = self
            .timings
            .read()
            .iter()
            .map(|(name, series)| (name.clone(), TimingStats::from_series(series)))
            .collect();

        MetricsSummary {
            uptime: self.uptime(),
            timings,
            counters: self.counters.read().clone(),
        }
    }
}

impl Default for RunnerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Count, total, mean, min and max cover every recording; the percentiles
/// cover the last [`SAMPLE_WINDOW`] only.
#[derive(Debug, Clone, Serialize)]
pub struct TimingStats {
    pub count: usize,
    pub total: Duration,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
}

impl TimingStats {
    fn from_series(series: &Series) -> Self {
        let mut sorted: Vec<_> = series.recent.iter().copied().collect();
        sorted.sort();

        let percentile = |p: f64| match sorted.len() {
            0 => Duration::ZERO,
            n => sorted[((n as f64 * p) as usize).min(n - 1)],
        };
        let mean = match series.count {
            0 => Duration::ZERO,
            n => series.total.div_f64(n as f64),
        };

        Self {
            count: series.count,
            total: series.total,
            mean,
            min: series.min.unwrap_or(Duration::ZERO),
            max: series.max,
            p50: percentile(0.50),
            p95: percentile(0.95),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub uptime: Duration,
    pub timings: BTreeMap<String, TimingStats>,
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSummary {
    pub fn report(&self) -> String {
        let mut lines = vec![format!("uptime: {:.2?}", self.uptime)];

        for (name, stats) in &self.timings {
            lines.push(format!(
                "{}: count={} mean={:.2?} p95={:.2?} max={:.2?}",
                name, stats.count, stats.mean, stats.p95, stats.max
            ));
        }
        for (name, value) in &self.counters {
            lines.push(format!("{}: {}", name, value));
        }

        lines.join("\n")
    }
}

/// RAII timer recording into a [`RunnerMetrics`] on drop
pub struct Timer<'a> {
    metrics: &'a RunnerMetrics,
    name: &'static str,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(metrics: &'a RunnerMetrics, name: &'static str) -> Self {
        Self {
            metrics,
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.metrics.record_timing(self.name, self.start.elapsed());
    }
}
