//! Observer fan-out.
//!
//! After each span ends, the engine synchronously delivers a
//! [`SpanInfo`] to every registered observer. The attribute list inside is
//! a copy, so an observer can do whatever it wants with it.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracefab_model::SpanInfo;

/// Receives one [`SpanInfo`] per ended span.
pub trait Observer: Send {
    /// Called synchronously after a span ends.
    fn on_span(&mut self, info: &SpanInfo);
}

/// Derives log records from spans via `tracing`.
///
/// Errored spans log at error level; spans slower than the threshold log at
/// warn level. Every record carries the service and operation names.
#[derive(Debug, Default)]
pub struct LogObserver {
    slow_threshold: Option<Duration>,
}

impl LogObserver {
    /// Creates a log observer that only reports errors.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slow_threshold: None,
        }
    }

    /// Also reports spans slower than `threshold`.
    #[must_use]
    pub const fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }
}

impl Observer for LogObserver {
    fn on_span(&mut self, info: &SpanInfo) {
        if info.is_error {
            tracing::error!(
                service = %info.service,
                operation = %info.operation,
                duration_ms = info.duration.as_secs_f64() * 1_000.0,
                "request failed"
            );
        }
        if let Some(threshold) = self.slow_threshold {
            if info.duration > threshold {
                tracing::warn!(
                    service = %info.service,
                    operation = %info.operation,
                    duration_ms = info.duration.as_secs_f64() * 1_000.0,
                    "slow request"
                );
            }
        }
    }
}

/// Derives metrics from spans via the `metrics` facade.
///
/// Per span: a `synth.request.duration` histogram sample (milliseconds), a
/// `synth.request.count` increment and, for errors, a `synth.error.count`
/// increment, all labelled by service and operation.
///
/// Metric backends timestamp samples at record time, so the engine's
/// backfill time offset is not reflected here; only spans and logs carry
/// shifted timestamps.
#[derive(Debug, Default)]
pub struct MetricObserver;

impl MetricObserver {
    /// Creates a metric observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Observer for MetricObserver {
    fn on_span(&mut self, info: &SpanInfo) {
        metrics::histogram!(
            "synth.request.duration",
            "service" => info.service.clone(),
            "operation" => info.operation.clone()
        )
        .record(info.duration.as_secs_f64() * 1_000.0);
        metrics::counter!(
            "synth.request.count",
            "service" => info.service.clone(),
            "operation" => info.operation.clone()
        )
        .increment(1);
        if info.is_error {
            metrics::counter!(
                "synth.error.count",
                "service" => info.service.clone(),
                "operation" => info.operation.clone()
            )
            .increment(1);
        }
    }
}

/// Records every delivery; shared storage across clones. Used by tests and
/// the sampled analysis.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    infos: Arc<Mutex<Vec<SpanInfo>>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SpanInfo> {
        crate::export::lock(&self.infos).clone()
    }

    /// Number of deliveries.
    #[must_use]
    pub fn len(&self) -> usize {
        crate::export::lock(&self.infos).len()
    }

    /// Whether nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        crate::export::lock(&self.infos).is_empty()
    }
}

impl Observer for RecordingObserver {
    fn on_span(&mut self, info: &SpanInfo) {
        crate::export::lock(&self.infos).push(info.clone());
    }
}
