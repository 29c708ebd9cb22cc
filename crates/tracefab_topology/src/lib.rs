//! Call-graph resolution, traffic shaping and scenarios for Tracefab.
//!
//! The topology is an arena of operations indexed by [`OpId`]: read-only
//! after construction, guaranteed acyclic, with call edges resolved to
//! indices and roots precomputed. Scenarios are time-windowed override sets
//! resolved against that arena once and activated per elapsed time.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod build;
pub mod error;
pub mod graph;
pub mod scenario;
pub mod traffic;

pub use build::build;
pub use error::{Error, Result};
pub use graph::{
    BackpressureParams, Call, CallCondition, CallStyle, CircuitBreakerParams, OpId, Operation,
    Service, Topology,
};
pub use scenario::{
    active_scenarios, build_scenarios, resolve_overrides, resolve_traffic, MergedOverride,
    Override, Scenario,
};
pub use traffic::{Segment, TrafficPattern};
