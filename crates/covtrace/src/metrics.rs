//! Metrics collection and reporting using metrics-rs.
//!
//! Tracer statistics are published as counters labelled by their source
//! (a thread name, a log file). The in-memory [`SummaryRecorder`] prints them
//! at the end of a CLI run.

use std::collections::BTreeMap;
use std::sync::Arc;

use covtrace_core::TracerStats;
use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use parking_lot::RwLock;

// ============================================================================
// Metric descriptions
// ============================================================================

/// Initialize metric descriptions.
///
/// Call this once at startup to register metric descriptions.
pub fn init() {
    describe_counter!("covtrace_calls_total", Unit::Count, "Call events seen");
    describe_counter!("covtrace_lines_total", Unit::Count, "Line events seen");
    describe_counter!("covtrace_returns_total", Unit::Count, "Return events seen");
    describe_counter!(
        "covtrace_exceptions_total",
        Unit::Count,
        "Exception events seen"
    );
    describe_counter!(
        "covtrace_new_units_total",
        Unit::Count,
        "Units first seen by a tracer (per-tracer cache misses)"
    );
    describe_counter!(
        "covtrace_missed_returns_total",
        Unit::Count,
        "Returns synthesized for frames that never reported one"
    );
    describe_counter!(
        "covtrace_stack_reallocs_total",
        Unit::Count,
        "Depth stack capacity growths"
    );
    describe_counter!("covtrace_errors_total", Unit::Count, "Tracer faults");

    describe_gauge!(
        "covtrace_measured_units",
        Unit::Count,
        "Tracenames with at least one recorded line"
    );
    describe_gauge!(
        "covtrace_recorded_lines",
        Unit::Count,
        "Distinct (tracename, line) pairs recorded"
    );

    describe_histogram!(
        "covtrace_replay_duration_seconds",
        Unit::Seconds,
        "Event log replay duration"
    );
}

// ============================================================================
// Metric recording functions
// ============================================================================

/// Publish the statistics of one tracer or session.
pub fn record_stats(source: &str, stats: &TracerStats) {
    let labels = [("source", source.to_string())];
    for (name, value) in stats.entries() {
        counter!(format!("covtrace_{name}_total"), &labels).absolute(value);
    }
}

/// Publish the size of the collected line data.
#[allow(clippy::cast_precision_loss)]
pub fn record_line_data(units: usize, lines: usize) {
    gauge!("covtrace_measured_units").set(units as f64);
    gauge!("covtrace_recorded_lines").set(lines as f64);
}

/// Record how long one replay took.
pub fn record_replay(source: &str, secs: f64) {
    let labels = [("source", source.to_string())];
    histogram!("covtrace_replay_duration_seconds", &labels).record(secs);
}

// ============================================================================
// Summary recorder for terminal output
// ============================================================================

/// One recorded metric. The variant follows the metric kind it was
/// registered as.
#[derive(Clone, Debug, PartialEq)]
enum Value {
    Count(u64),
    Level(f64),
    Samples(Vec<f64>),
}

type Store = Arc<RwLock<BTreeMap<String, Value>>>;

/// Handle returned for every registered metric; writes land in the shared
/// store under the rendered key.
struct Slot {
    key: String,
    store: Store,
}

impl Slot {
    fn update(&self, init: Value, apply: impl FnOnce(&mut Value)) {
        let mut store = self.store.write();
        apply(store.entry(self.key.clone()).or_insert(init));
    }
}

impl metrics::CounterFn for Slot {
    fn increment(&self, value: u64) {
        self.update(Value::Count(0), |slot| {
            if let Value::Count(count) = slot {
                *count += value;
            }
        });
    }

    fn absolute(&self, value: u64) {
        self.store.write().insert(self.key.clone(), Value::Count(value));
    }
}

impl metrics::GaugeFn for Slot {
    fn increment(&self, value: f64) {
        self.update(Value::Level(0.0), |slot| {
            if let Value::Level(level) = slot {
                *level += value;
            }
        });
    }

    fn decrement(&self, value: f64) {
        metrics::GaugeFn::increment(self, -value);
    }

    fn set(&self, value: f64) {
        self.store.write().insert(self.key.clone(), Value::Level(value));
    }
}

impl metrics::HistogramFn for Slot {
    fn record(&self, value: f64) {
        self.update(Value::Samples(Vec::new()), |slot| {
            if let Value::Samples(samples) = slot {
                samples.push(value);
            }
        });
    }
}

/// Recorder that keeps metrics in memory for a closing summary.
///
/// Every metric lives in one map keyed by `name{label=value,...}`, so the
/// summary comes out grouped by source and sorted.
#[derive(Clone, Default)]
pub struct SummaryRecorder {
    store: Store,
}

impl SummaryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a clone of this recorder as the global metrics recorder.
    ///
    /// Returns `false` if a global recorder was already installed.
    pub fn install(&self) -> bool {
        metrics::set_global_recorder(self.clone()).is_ok()
    }

    #[must_use]
    pub fn counter(&self, key: &str) -> Option<u64> {
        match self.store.read().get(key)? {
            Value::Count(count) => Some(*count),
            _ => None,
        }
    }

    #[must_use]
    pub fn gauge(&self, key: &str) -> Option<f64> {
        match self.store.read().get(key)? {
            Value::Level(level) => Some(*level),
            _ => None,
        }
    }

    #[must_use]
    pub fn histogram(&self, key: &str) -> Option<Vec<f64>> {
        match self.store.read().get(key)? {
            Value::Samples(samples) => Some(samples.clone()),
            _ => None,
        }
    }

    /// Render the collected metrics, one per line.
    #[must_use]
    pub fn summary(&self) -> String {
        let store = self.store.read();
        if store.is_empty() {
            return "No metrics collected.\n".to_string();
        }
        let mut out = String::from("\n## Metrics Summary\n\n");
        for (key, value) in store.iter() {
            let line = match value {
                Value::Count(count) => format!("  {key}: {count}\n"),
                Value::Level(level) => format!("  {key}: {level:.6}\n"),
                Value::Samples(samples) if samples.is_empty() => continue,
                Value::Samples(samples) => format!("  {key}: {}\n", describe_samples(samples)),
            };
            out.push_str(&line);
        }
        out
    }

    /// Print all collected metrics in a human-readable format.
    pub fn print_summary(&self) {
        print!("{}", self.summary());
    }

    fn slot(&self, key: &Key) -> Arc<Slot> {
        Arc::new(Slot {
            key: key_to_string(key),
            store: Arc::clone(&self.store),
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn describe_samples(samples: &[f64]) -> String {
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
    format!(
        "count={}, min={min:.6}, max={max:.6}, avg={avg:.6}",
        samples.len()
    )
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for SummaryRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.slot(key))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.slot(key))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.slot(key))
    }
}
