//! A recorder that keeps every value in memory.
//!
//! Used by tests to assert on emitted metrics and by the CLI to dump them as
//! JSON on exit.
//!
//! ```rust
//! use std::sync::Arc;
//! use joule_metrics::{metric_defs, metrics, InMemoryRecorder};
//!
//! let recorder = Arc::new(InMemoryRecorder::new());
//! metrics::with_local_recorder(&*recorder, || {
//!     metrics::counter!(metric_defs::POLLS_OK.name, "device" => "kitchen").increment(2);
//! });
//! assert_eq!(recorder.counter("joule.poll.ok", &[("device", "kitchen")]), 2);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use parking_lot::Mutex;
use serde::Serialize;

struct CounterCell(AtomicU64);

impl CounterFn for CounterCell {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn absolute(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct GaugeCell(Mutex<f64>);

impl GaugeFn for GaugeCell {
    fn increment(&self, value: f64) {
        *self.0.lock() += value;
    }

    fn decrement(&self, value: f64) {
        *self.0.lock() -= value;
    }

    fn set(&self, value: f64) {
        *self.0.lock() = value;
    }
}

#[derive(Default)]
struct HistogramCell(Mutex<Vec<f64>>);

impl HistogramFn for HistogramCell {
    fn record(&self, value: f64) {
        self.0.lock().push(value);
    }
}

/// Exported value of one metric series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricValue {
    /// Counter total.
    Counter { value: u64 },
    /// Last gauge value.
    Gauge { value: f64 },
    /// Histogram summary.
    Histogram {
        count: usize,
        sum: f64,
        min: f64,
        max: f64,
    },
}

/// In-memory [`Recorder`].
///
/// Series are keyed by name and label set. Lookups match every series whose
/// labels include the given pairs, so `&[]` sums over all label sets.
#[derive(Default)]
pub struct InMemoryRecorder {
    counters: Mutex<HashMap<Key, Arc<CounterCell>>>,
    gauges: Mutex<HashMap<Key, Arc<GaugeCell>>>,
    histograms: Mutex<HashMap<Key, Arc<HistogramCell>>>,
    descriptions: Mutex<HashMap<String, String>>,
}

fn matches(key: &Key, name: &str, labels: &[(&str, &str)]) -> bool {
    key.name() == name
        && labels
            .iter()
            .all(|(k, v)| key.labels().any(|l| l.key() == *k && l.value() == *v))
}

/// `name{a=1,b=2}` with labels sorted by key.
fn series_name(key: &Key) -> String {
    let mut labels: Vec<_> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        return key.name().to_string();
    }
    labels.sort();
    format!("{}{{{}}}", key.name(), labels.join(","))
}

impl InMemoryRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all counters named `name` carrying `labels`.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(key, _)| matches(key, name, labels))
            .map(|(_, cell)| cell.0.load(Ordering::Relaxed))
            .sum()
    }

    /// Value of a gauge named `name` carrying `labels`, if one was registered.
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.gauges
            .lock()
            .iter()
            .find(|(key, _)| matches(key, name, labels))
            .map(|(_, cell)| *cell.0.lock())
    }

    /// Number of samples recorded by histograms named `name` carrying `labels`.
    pub fn histogram_count(&self, name: &str, labels: &[(&str, &str)]) -> usize {
        self.histograms
            .lock()
            .iter()
            .filter(|(key, _)| matches(key, name, labels))
            .map(|(_, cell)| cell.0.lock().len())
            .sum()
    }

    /// Description registered for `name`.
    pub fn description(&self, name: &str) -> Option<String> {
        self.descriptions.lock().get(name).cloned()
    }

    /// Every series with its current value.
    pub fn snapshot(&self) -> BTreeMap<String, MetricValue> {
        let mut out = BTreeMap::new();
        for (key, cell) in self.counters.lock().iter() {
            out.insert(
                series_name(key),
                MetricValue::Counter {
                    value: cell.0.load(Ordering::Relaxed),
                },
            );
        }
        for (key, cell) in self.gauges.lock().iter() {
            out.insert(
                series_name(key),
                MetricValue::Gauge {
                    value: *cell.0.lock(),
                },
            );
        }
        for (key, cell) in self.histograms.lock().iter() {
            let samples = cell.0.lock();
            let summary = MetricValue::Histogram {
                count: samples.len(),
                sum: samples.iter().sum(),
                min: samples.iter().copied().fold(f64::INFINITY, f64::min),
                max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            out.insert(series_name(key), summary);
        }
        out
    }

    fn describe(&self, key: KeyName, description: SharedString) {
        self.descriptions
            .lock()
            .insert(key.as_str().to_string(), description.to_string());
    }
}

impl Recorder for InMemoryRecorder {
    fn describe_counter(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_gauge(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_histogram(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let cell = self
            .counters
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CounterCell(AtomicU64::new(0))))
            .clone();
        Counter::from_arc(cell)
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        let cell = self.gauges.lock().entry(key.clone()).or_default().clone();
        Gauge::from_arc(cell)
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        let cell = self.histograms.lock().entry(key.clone()).or_default().clone();
        Histogram::from_arc(cell)
    }
}
