//! Typed model of the YAML configuration document.
//!
//! Maps are `BTreeMap` so iteration order is deterministic everywhere a
//! config feeds the RNG or the output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The config version this build understands.
pub const SUPPORTED_VERSION: u32 = 1;

const fn default_version() -> u32 {
    SUPPORTED_VERSION
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Document version; only version 1 is supported.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Services keyed by name.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Base traffic shape. Defaults to 1/s uniform when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficConfig>,
    /// Time-windowed scenarios layered on top of the base topology.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<ScenarioConfig>,
}

/// One service: static attributes plus its operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Static string attributes attached to every span of this service.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Operations keyed by name.
    #[serde(default)]
    pub operations: BTreeMap<String, OperationConfig>,
}

/// How an operation executes its downstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStyle {
    /// Each call starts when the previous one finishes.
    Sequential,
    /// All calls start together.
    #[default]
    Parallel,
}

/// One operation of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationConfig {
    /// Duration distribution, e.g. `"100ms +/- 20ms"`.
    pub duration: String,
    /// Error rate, e.g. `"2%"` or `"0.02"`. Defaults to zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<String>,
    /// Downstream call execution style.
    #[serde(default)]
    pub call_style: CallStyle,
    /// Downstream calls, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<CallConfig>,
    /// Attribute generators keyed by attribute name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValueConfig>,
    /// Maximum concurrent requests before queue-full rejection; 0 disables.
    #[serde(default)]
    pub queue_depth: u32,
    /// Latency-driven backpressure parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backpressure: Option<BackpressureConfig>,
    /// Circuit breaker parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Reserved for external domain resolvers; accepted and ignored by the
    /// core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// One directed call edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallConfig {
    /// Target reference of the form `service.operation`.
    pub target: String,
    /// Fan-out: how many times the call fires. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Number of retries after a failed attempt.
    #[serde(default)]
    pub retries: u32,
    /// Pause between a failed attempt and its retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<String>,
    /// Client-side timeout; absent or zero means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Probability the call fires at all; 0 means "always".
    #[serde(default)]
    pub probability: f64,
    /// Conditional firing: `""`, `"on-error"` or `"on-success"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Fire-and-forget: the parent does not wait for the result.
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

/// Attribute generator configuration. Exactly one of the fields must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeValueConfig {
    /// A static value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<StaticValueConfig>,
    /// Weighted string choices: value to positive integer weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, u64>>,
    /// Sequence pattern containing `{n}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    /// Probability of `true` for a boolean attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Uniform `[min, max]` range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeConfig>,
    /// Normal distribution over floats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionConfig>,
}

impl AttributeValueConfig {
    /// Number of variant fields that are set. Valid configs have exactly
    /// one.
    #[must_use]
    pub const fn set_count(&self) -> usize {
        self.value.is_some() as usize
            + self.values.is_some() as usize
            + self.sequence.is_some() as usize
            + self.probability.is_some() as usize
            + self.range.is_some() as usize
            + self.distribution.is_some() as usize
    }
}

/// A static scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StaticValueConfig {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
}

/// Bounds of a uniform range attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeConfig {
    /// Integer bounds produce integer attributes.
    Int([i64; 2]),
    /// Float bounds produce float attributes.
    Float([f64; 2]),
}

/// Mean and standard deviation of a normal float attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionConfig {
    /// Mean of the distribution.
    pub mean: f64,
    /// Standard deviation; defaults to zero.
    #[serde(default)]
    pub stddev: f64,
}

/// Shape of the traffic curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Constant base rate.
    #[default]
    Uniform,
    /// Sinusoidal day/night cycle.
    Diurnal,
    /// Periodic bursts over the base rate.
    Bursty,
    /// Piecewise segments.
    Custom,
}

/// Traffic shape configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficConfig {
    /// Base rate, e.g. `"100/s"`.
    pub rate: String,
    /// Curve shape over the base rate.
    #[serde(default)]
    pub pattern: PatternKind,
    /// Diurnal peak multiplier (default 1.5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_multiplier: Option<f64>,
    /// Diurnal trough multiplier (default 0.5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trough_multiplier: Option<f64>,
    /// Diurnal period (default 24h).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Bursty rate multiplier during a burst.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_multiplier: Option<f64>,
    /// Bursty cycle length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_interval: Option<String>,
    /// Burst length at the start of each cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_duration: Option<String>,
    /// Segments for the custom pattern.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentConfig>,
    /// Multiplicative overlay pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Box<TrafficConfig>>,
}

/// One `(until, rate)` segment of a custom pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentConfig {
    /// The segment applies while elapsed time is below this offset.
    pub until: String,
    /// Rate during the segment, e.g. `"50/s"`.
    pub rate: String,
}

/// A named, time-windowed set of overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Scenario name (also used for span labelling).
    pub name: String,
    /// Activation offset relative to engine start, e.g. `"+5m"`.
    pub at: String,
    /// How long the scenario stays active.
    pub duration: String,
    /// Merge priority; higher priorities apply later and win conflicts.
    #[serde(default)]
    pub priority: i32,
    /// Per-operation overrides keyed by `service.operation` ref.
    #[serde(default, rename = "override", skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, OverrideConfig>,
    /// Traffic pattern replacing the base one while active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficConfig>,
}

/// A per-operation patch applied while a scenario is active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideConfig {
    /// Replacement duration distribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Replacement error rate. `"0%"` is meaningful and distinct from
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<String>,
    /// Attribute generators merged over the operation's own.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValueConfig>,
    /// Calls appended to the operation's call list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_calls: Vec<CallConfig>,
    /// Call targets (refs) filtered out of the operation's call list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_calls: Vec<String>,
}

/// Backpressure parameters for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackpressureConfig {
    /// Smoothed-latency threshold that activates backpressure.
    pub latency_threshold: String,
    /// Duration multiplier while active; clamped to `[1, 10]` at runtime.
    #[serde(default)]
    pub duration_multiplier: f64,
    /// Added to the error rate while active.
    #[serde(default)]
    pub error_rate_add: f64,
}

/// Circuit breaker parameters for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that trip the breaker.
    pub failure_threshold: u32,
    /// Sliding window for counting failures.
    pub window: String,
    /// How long the breaker stays open before probing.
    pub cooldown: String,
}
