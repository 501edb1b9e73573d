//! Scoped timing of lifecycle steps and named counters.
//!
//! The monitor is purely observational: nothing in the initialization core
//! reads it back to make decisions.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counter bumped every time a database unit rolls back its transaction.
pub const DATABASE_ROLLBACKS: &str = "database.rollbacks";

#[derive(Debug, Default, Clone, Copy)]
struct TimingStats {
    count: u64,
    total: Duration,
    max: Duration,
    last: Duration,
}

#[derive(Debug, Default)]
struct MonitorState {
    timings: HashMap<(String, String), TimingStats>,
    counters: BTreeMap<String, u64>,
}

/// Shared performance monitor. Cloning is cheap and clones share state.
#[derive(Debug, Default, Clone)]
pub struct PerformanceMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `operation` of `component`. The measurement is recorded
    /// when the returned guard is ended or dropped.
    pub fn start_measurement(
        &self,
        component: impl Into<String>,
        operation: impl Into<String>,
    ) -> Measurement {
        Measurement {
            monitor: self.clone(),
            component: component.into(),
            operation: operation.into(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// End a measurement and return its elapsed time.
    pub fn end_measurement(&self, measurement: Measurement) -> Duration {
        measurement.end()
    }

    fn record(&self, component: &str, operation: &str, elapsed: Duration) {
        let mut state = self.state.lock();
        let stats = state
            .timings
            .entry((component.to_string(), operation.to_string()))
            .or_default();
        stats.count += 1;
        stats.total += elapsed;
        stats.last = elapsed;
        stats.max = stats.max.max(elapsed);
    }

    /// Increment a named counter and return its new value.
    pub fn increment(&self, counter: &str) -> u64 {
        let mut state = self.state.lock();
        let value = state.counters.entry(counter.to_string()).or_insert(0);
        *value += 1;
        *value
    }

    pub fn counter(&self, counter: &str) -> u64 {
        self.state.lock().counters.get(counter).copied().unwrap_or(0)
    }

    /// Number of finished measurements for `component`/`operation`.
    pub fn measurement_count(&self, component: &str, operation: &str) -> u64 {
        self.state
            .lock()
            .timings
            .get(&(component.to_string(), operation.to_string()))
            .map_or(0, |s| s.count)
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let state = self.state.lock();
        let mut timings: Vec<TimingSnapshot> = state
            .timings
            .iter()
            .map(|((component, operation), stats)| TimingSnapshot {
                component: component.clone(),
                operation: operation.clone(),
                count: stats.count,
                total_ms: stats.total.as_millis() as u64,
                max_ms: stats.max.as_millis() as u64,
                last_ms: stats.last.as_millis() as u64,
            })
            .collect();
        timings.sort_by(|a, b| {
            a.component
                .cmp(&b.component)
                .then_with(|| a.operation.cmp(&b.operation))
        });

        MonitorSnapshot {
            timings,
            counters: state.counters.clone(),
        }
    }
}

/// Running measurement. Records itself on drop if not ended explicitly.
#[derive(Debug)]
pub struct Measurement {
    monitor: PerformanceMonitor,
    component: String,
    operation: String,
    started: Instant,
    finished: bool,
}

impl Measurement {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn end(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.finished {
            self.finished = true;
            self.monitor
                .record(&self.component, &self.operation, elapsed);
            tracing::debug!(
                component = %self.component,
                operation = %self.operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "measurement finished"
            );
        }
        elapsed
    }
}

impl Drop for Measurement {
    fn drop(&mut self) {
        self.finish();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingSnapshot {
    pub component: String,
    pub operation: String,
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
    pub last_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub timings: Vec<TimingSnapshot>,
    pub counters: BTreeMap<String, u64>,
}
