//! Metric declarations for the circulator controller.
//!
//! Every metric the controller emits is declared once as a const [`Metric`]
//! in [`metric_defs`], so call sites cannot misspell a name and exporters can
//! be given descriptions up front via [`describe_metrics`]. The `metrics`
//! crate is re-exported for convenience.
//!
//! ```rust
//! use joule_metrics::{metric_defs, metrics, DeviceLabels};
//!
//! let labels = DeviceLabels::new("kitchen").with_transport("tcp");
//! metrics::counter!(metric_defs::POLLS_OK.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

mod recorder;

pub use recorder::{InMemoryRecorder, MetricValue};

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically increasing.
    Counter,
    /// Goes up and down.
    Gauge,
    /// Records a distribution.
    Histogram,
}

impl MetricKind {
    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use joule_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const WRITES: Metric = Metric::counter("joule.example.writes")
///     .with_description("Frames written")
///     .with_unit(Unit::Count)
///     .with_labels(&["device"]);
///
/// assert_eq!(WRITES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name, e.g. `joule.poll.ok`.
    pub name: &'static str,
    /// Counter, gauge or histogram.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Unit of measurement.
    pub unit: Option<Unit>,
    /// Label keys callers are expected to attach.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Set the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metrics emitted by the controller.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label present on every metric.
    pub const DEVICE_LABELS: &[&str] = &["device", "transport"];

    // ========================================================================
    // Polling
    // ========================================================================

    /// Refresh cycles that published a new snapshot.
    pub const POLLS_OK: Metric = Metric::counter("joule.poll.ok")
        .with_description("Refresh cycles that published a new snapshot")
        .with_unit(Unit::Count)
        .with_labels(DEVICE_LABELS);

    /// Refresh cycles that failed.
    ///
    /// Labels: device, transport, reason (`connect`, `write`, `timeout`)
    pub const POLLS_FAILED: Metric = Metric::counter("joule.poll.failed")
        .with_description("Refresh cycles that failed")
        .with_unit(Unit::Count)
        .with_labels(&["device", "transport", "reason"]);

    /// Time from live-feed request to data point.
    pub const POLL_LATENCY: Metric = Metric::histogram("joule.poll.latency_ms")
        .with_description("Time from live-feed request to data point in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(DEVICE_LABELS);

    // ========================================================================
    // Commands
    // ========================================================================

    /// Commands written to the device.
    ///
    /// Labels: device, transport, command (`start`, `stop`)
    pub const COMMANDS_SENT: Metric = Metric::counter("joule.command.sent")
        .with_description("Commands written to the device")
        .with_unit(Unit::Count)
        .with_labels(&["device", "transport", "command"]);

    /// Commands whose write failed.
    ///
    /// Labels: device, transport, command
    pub const COMMANDS_FAILED: Metric = Metric::counter("joule.command.failed")
        .with_description("Commands whose write failed")
        .with_unit(Unit::Count)
        .with_labels(&["device", "transport", "command"]);

    // ========================================================================
    // Device
    // ========================================================================

    /// Notifications that did not carry a data point.
    pub const NOTIFICATIONS_UNPARSED: Metric = Metric::counter("joule.notification.unparsed")
        .with_description("Notifications that did not carry a data point")
        .with_unit(Unit::Count)
        .with_labels(DEVICE_LABELS);

    /// Notifications dropped because no poll was waiting for them.
    pub const NOTIFICATIONS_IGNORED: Metric = Metric::counter("joule.notification.ignored")
        .with_description("Notifications dropped because no poll was waiting")
        .with_unit(Unit::Count)
        .with_labels(DEVICE_LABELS);

    /// Last reported bath temperature in °C.
    pub const BATH_TEMPERATURE: Metric = Metric::gauge("joule.bath_temp_c")
        .with_description("Last reported bath temperature in degrees Celsius")
        .with_labels(DEVICE_LABELS);

    /// Successful connections to the device.
    pub const CONNECTS: Metric = Metric::counter("joule.transport.connects")
        .with_description("Successful connections to the device")
        .with_unit(Unit::Count)
        .with_labels(DEVICE_LABELS);

    /// All declared metrics.
    pub const ALL: &[&Metric] = &[
        &POLLS_OK,
        &POLLS_FAILED,
        &POLL_LATENCY,
        &COMMANDS_SENT,
        &COMMANDS_FAILED,
        &NOTIFICATIONS_UNPARSED,
        &NOTIFICATIONS_IGNORED,
        &BATH_TEMPERATURE,
        &CONNECTS,
    ];
}

/// Labels identifying which device a metric belongs to.
#[derive(Debug, Clone)]
pub struct DeviceLabels {
    /// Device name from configuration.
    pub device: String,
    /// Transport kind (`tcp`, `mock`).
    pub transport: String,
}

impl DeviceLabels {
    /// Labels for `device` on an unspecified transport.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            transport: "unknown".to_string(),
        }
    }

    /// Set the transport kind.
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    /// Labels in the form the `metrics` macros accept.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("device", self.device.clone()),
            ("transport", self.transport.clone()),
        ]
    }

    /// Labels plus extra key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Register descriptions for every metric in [`metric_defs::ALL`].
///
/// Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_labels() {
        let labels = DeviceLabels::new("kitchen");
        assert_eq!(labels.transport, "unknown");

        let labels = labels.with_transport("tcp");
        let label_vec = labels.to_labels();
        assert_eq!(label_vec.len(), 2);
        assert!(label_vec.contains(&("device", "kitchen".to_string())));
        assert!(label_vec.contains(&("transport", "tcp".to_string())));
    }

    #[test]
    fn test_with_extra_labels() {
        let labels = DeviceLabels::new("kitchen");
        let extended = labels.with(&[("command", "start".to_string())]);
        assert_eq!(extended.len(), 3);
        assert!(extended.contains(&("command", "start".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::POLLS_OK.name, "joule.poll.ok");
        assert_eq!(metric_defs::POLLS_OK.kind, MetricKind::Counter);
        assert_eq!(metric_defs::POLL_LATENCY.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::POLL_LATENCY.unit, Some(Unit::Milliseconds));
        assert_eq!(metric_defs::BATH_TEMPERATURE.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::COMMANDS_SENT.labels, &["device", "transport", "command"]);
    }

    #[test]
    fn test_all_metrics_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("joule.")));
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::gauge("minimal");
        assert_eq!(MINIMAL.kind, MetricKind::Gauge);
        assert_eq!(MINIMAL.description, "");
        assert_eq!(MINIMAL.unit, None);
        assert_eq!(MINIMAL.labels, &[] as &[&str]);
        assert_eq!(MINIMAL.kind.to_string(), "gauge");
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: describing is a no-op
        describe_metrics();
    }
}
