//! Structural analysis of Tracefab topologies.
//!
//! Computes static worst-case bounds (depth, fan-out, span count) by
//! memoised DFS over the acyclic call graph, samples real walks to observe
//! the actual distribution, and checks both against caller-provided limits.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod bounds;
pub mod check;
pub mod sample;

pub use bounds::{analyze, max_depth, max_fan_out, max_spans, DepthBound, FanOutBound, StaticBounds, MAX_SPANS_CAP};
pub use check::{check, CheckReport, CheckResult, Limits, Metric};
pub use sample::{sample_traces, SampleSummary, TraceSample};
