//! Declarative topology configuration for Tracefab.
//!
//! A YAML document describes a microservice fleet: services, operations,
//! call edges, latency distributions, error rates, traffic shape and
//! time-windowed scenarios. This crate owns the typed model of that
//! document and its structural validation; reference resolution against the
//! built topology lives in `tracefab_topology`.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{Error, Result};
pub use loader::{from_path, from_str};
pub use model::{
    AttributeValueConfig, BackpressureConfig, CallConfig, CallStyle, CircuitBreakerConfig, Config,
    DistributionConfig, OperationConfig, OverrideConfig, PatternKind, RangeConfig, ScenarioConfig,
    SegmentConfig, ServiceConfig, StaticValueConfig, TrafficConfig,
};
pub use validate::{parse_offset, validate};
