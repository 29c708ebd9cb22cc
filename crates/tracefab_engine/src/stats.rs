//! Run statistics.
//!
//! The walker and the realtime emitters update a shared [`StatsRecorder`]
//! through atomic counters; [`Stats`] is the serialisable snapshot the
//! engine returns and the CLI prints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic counters accumulated over one engine run.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    traces: AtomicU64,
    spans: AtomicU64,
    errors: AtomicU64,
    failed_traces: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
    spans_bounded: AtomicU64,
    queue_rejections: AtomicU64,
    circuit_breaker_trips: AtomicU64,
}

impl StatsRecorder {
    /// Creates a zeroed recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one emitted span.
    pub fn record_span(&self, is_error: bool) {
        self.spans.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records one completed trace walk.
    pub fn record_trace(&self, failed: bool, bounded: bool) {
        self.traces.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed_traces.fetch_add(1, Ordering::Relaxed);
        }
        if bounded {
            self.spans_bounded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a perceived call timeout.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retry attempt.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a queue-full rejection.
    pub fn record_queue_rejection(&self) {
        self.queue_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a circuit-open rejection.
    pub fn record_circuit_rejection(&self) {
        self.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a snapshot with derived rates over the given elapsed time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self, elapsed: Duration) -> Stats {
        let traces = self.traces.load(Ordering::Relaxed);
        let spans = self.spans.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let failed_traces = self.failed_traces.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();

        let per_second = |count: u64| if secs > 0.0 { count as f64 / secs } else { 0.0 };
        let ratio = |num: u64, den: u64| if den > 0 { num as f64 / den as f64 } else { 0.0 };

        Stats {
            traces,
            spans,
            errors,
            failed_traces,
            timeouts: self.timeouts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            spans_bounded: self.spans_bounded.load(Ordering::Relaxed),
            queue_rejections: self.queue_rejections.load(Ordering::Relaxed),
            circuit_breaker_trips: self.circuit_breaker_trips.load(Ordering::Relaxed),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            traces_per_second: per_second(traces),
            spans_per_second: per_second(spans),
            error_rate: ratio(errors, spans),
            trace_error_rate: ratio(failed_traces, traces),
        }
    }
}

/// A point-in-time snapshot of run statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Traces walked.
    pub traces: u64,
    /// Spans emitted (rejection spans included).
    pub spans: u64,
    /// Spans that ended in error.
    pub errors: u64,
    /// Traces whose root span errored.
    pub failed_traces: u64,
    /// Perceived call timeouts.
    pub timeouts: u64,
    /// Retry attempts.
    pub retries: u64,
    /// Traces that hit the per-trace span limit.
    pub spans_bounded: u64,
    /// Queue-full rejections.
    pub queue_rejections: u64,
    /// Circuit-open rejections.
    pub circuit_breaker_trips: u64,
    /// Wall-clock run length in milliseconds.
    pub elapsed_ms: u64,
    /// Traces per second over the run.
    pub traces_per_second: f64,
    /// Spans per second over the run.
    pub spans_per_second: f64,
    /// Errored spans over all spans.
    pub error_rate: f64,
    /// Failed traces over all traces.
    pub trace_error_rate: f64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "traces: {} ({:.1}/s), spans: {} ({:.1}/s)",
            self.traces, self.traces_per_second, self.spans, self.spans_per_second
        )?;
        writeln!(
            f,
            "errors: {} ({:.1}% of spans), failed traces: {} ({:.1}%)",
            self.errors,
            self.error_rate * 100.0,
            self.failed_traces,
            self.trace_error_rate * 100.0
        )?;
        write!(
            f,
            "timeouts: {}, retries: {}, queue rejections: {}, breaker rejections: {}, bounded: {}",
            self.timeouts,
            self.retries,
            self.queue_rejections,
            self.circuit_breaker_trips,
            self.spans_bounded
        )
    }
}
