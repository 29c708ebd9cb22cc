//! The Tracefab trace-generation engine.
//!
//! Walks a resolved topology to produce fully-timed synthetic span trees,
//! applies cross-trace simulation state (queue admission, circuit breakers,
//! latency-driven backpressure), and emits spans either synthetically or
//! replayed at wall clock. Derived logs and metrics fan out through
//! observers.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod emitter;
pub mod engine;
pub mod export;
pub mod observer;
pub mod plan;
pub mod state;
pub mod stats;
pub mod walker;

pub use emitter::{emit_plan, SharedExporter, SharedObservers};
pub use engine::{Engine, EngineConfig};
pub use export::{InMemoryExporter, SpanExporter, StdoutExporter};
pub use observer::{LogObserver, MetricObserver, Observer, RecordingObserver};
pub use plan::{materialize, span_id, trace_id, SpanPlan, REJECTION_DURATION};
pub use state::{Admission, CircuitState, OperationState, RejectionReason, SimulationState};
pub use stats::{Stats, StatsRecorder};
pub use walker::{PlanSink, SpanSink, WalkOutcome, WalkParams, Walker, DEFAULT_SPAN_LIMIT};
