//! Span exporter boundary.
//!
//! The engine hands fully-formed [`Span`] values to a [`SpanExporter`].
//! OTLP transport lives behind this trait in an external crate; the two
//! reference implementations here cover tests/analysis (in-memory) and the
//! CLI default (JSON lines on stdout).

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracefab_model::Span;

/// Receives finished spans, children before parents within one trace.
pub trait SpanExporter: Send {
    /// Exports one span.
    fn export(&mut self, span: Span);
}

/// Locks a mutex, recovering from poisoning (a panicked holder cannot leave
/// span storage in a broken state; the data is append-only).
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collects spans in memory; cloning shares the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    spans: Arc<Mutex<Vec<Span>>>,
}

impl InMemoryExporter {
    /// Creates an empty exporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spans exported so far.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.spans).len()
    }

    /// Whether nothing has been exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.spans).is_empty()
    }

    /// A copy of everything exported so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Span> {
        lock(&self.spans).clone()
    }

    /// Drops all collected spans.
    pub fn clear(&self) {
        lock(&self.spans).clear();
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&mut self, span: Span) {
        lock(&self.spans).push(span);
    }
}

/// Writes one JSON object per span to stdout.
#[derive(Debug, Default)]
pub struct StdoutExporter;

impl StdoutExporter {
    /// Creates a stdout exporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SpanExporter for StdoutExporter {
    fn export(&mut self, span: Span) {
        match serde_json::to_string(&span) {
            Ok(line) => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                if let Err(e) = writeln!(handle, "{line}") {
                    tracing::warn!(error = %e, "failed to write span to stdout");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialise span"),
        }
    }
}
