//! Span data model and value samplers for Tracefab.
//!
//! This crate provides the leaf building blocks the generator is assembled
//! from:
//! - [`Distribution`] for normally-distributed durations with string parsing
//! - [`Rate`] for `<count>/<unit>` traffic rates and error-rate percentages
//! - The span vocabulary ([`Span`], [`SpanKind`], [`SpanStatus`],
//!   [`AttributeValue`]) shared by the engine, exporters and observers
//! - [`AttrGenerator`] for synthesising typed span attributes from an RNG

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod attrgen;
pub mod distribution;
pub mod error;
pub mod rate;
pub mod span;

pub use attrgen::AttrGenerator;
pub use distribution::{parse_duration, Distribution};
pub use error::{Error, Result};
pub use rate::{parse_error_rate, Rate, RateUnit, MAX_RATE_COUNT};
pub use span::{AttributeValue, KeyValue, Span, SpanInfo, SpanKind, SpanStatus, StatusCode};
