//! The resolved call graph.
//!
//! Operations live in a dense arena indexed by [`OpId`]; call edges and
//! scenario add-calls hold indices into that arena. The whole structure is
//! read-only once [`build`](crate::build::build) returns.

use std::collections::BTreeMap;
use std::time::Duration;
use tracefab_model::{AttrGenerator, Distribution};

/// Dense index of an operation in the topology arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub(crate) usize);

impl OpId {
    /// The underlying arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// How an operation executes its downstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallStyle {
    /// Each call starts when the previous one finishes.
    Sequential,
    /// All calls start together.
    #[default]
    Parallel,
}

impl From<tracefab_config::CallStyle> for CallStyle {
    fn from(style: tracefab_config::CallStyle) -> Self {
        match style {
            tracefab_config::CallStyle::Sequential => Self::Sequential,
            tracefab_config::CallStyle::Parallel => Self::Parallel,
        }
    }
}

/// When a conditional call fires, relative to the parent's own error draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallCondition {
    /// Fire unconditionally.
    #[default]
    Always,
    /// Fire only when the parent's own draw errored.
    OnError,
    /// Fire only when the parent's own draw succeeded.
    OnSuccess,
}

/// A directed call edge with its modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Call {
    /// The operation this call invokes.
    pub target: OpId,
    /// Probability the call fires; 0 means "always".
    pub probability: f64,
    /// Conditional firing against the parent's own error draw.
    pub condition: CallCondition,
    /// Fan-out count, at least 1.
    pub count: u32,
    /// Client-side timeout; zero means none.
    pub timeout: Duration,
    /// Retries after a failed attempt.
    pub retries: u32,
    /// Pause between a failed attempt and the retry.
    pub retry_backoff: Duration,
    /// Fire-and-forget: result does not reach the parent.
    pub is_async: bool,
}

/// Backpressure parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackpressureParams {
    /// Smoothed-latency threshold that activates backpressure.
    pub latency_threshold: Duration,
    /// Duration multiplier while active.
    pub duration_multiplier: f64,
    /// Added to the error rate while active.
    pub error_rate_add: f64,
}

/// Circuit breaker parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerParams {
    /// Failures within the window that trip the breaker.
    pub failure_threshold: u32,
    /// Sliding window for counting failures.
    pub window: Duration,
    /// How long the breaker stays open before probing.
    pub cooldown: Duration,
}

/// One operation of one service.
#[derive(Debug)]
pub struct Operation {
    /// Owning service name.
    pub service: String,
    /// Operation name (may itself contain dots).
    pub name: String,
    /// Globally unique reference `service.operation`.
    pub op_ref: String,
    /// Duration distribution.
    pub duration: Distribution,
    /// Own error rate in `[0, 1]`.
    pub error_rate: f64,
    /// Downstream call execution style.
    pub call_style: CallStyle,
    /// Resolved downstream calls, in declaration order.
    pub calls: Vec<Call>,
    /// Attribute generators keyed by attribute name.
    pub attributes: BTreeMap<String, AttrGenerator>,
    /// Maximum concurrent requests; 0 disables queue admission.
    pub queue_depth: u32,
    /// Backpressure parameters, if configured.
    pub backpressure: Option<BackpressureParams>,
    /// Circuit breaker parameters, if configured.
    pub circuit_breaker: Option<CircuitBreakerParams>,
}

impl Operation {
    /// Returns true if this operation tracks any runtime state.
    #[must_use]
    pub const fn has_runtime_state(&self) -> bool {
        self.queue_depth > 0 || self.backpressure.is_some() || self.circuit_breaker.is_some()
    }
}

/// One service: static attributes plus its operations.
#[derive(Debug)]
pub struct Service {
    /// Service name.
    pub name: String,
    /// Static string attributes attached to every span of this service.
    pub attributes: BTreeMap<String, String>,
    /// Operations keyed by name.
    pub operations: BTreeMap<String, OpId>,
}

/// The resolved, validated, acyclic call graph.
#[derive(Debug)]
pub struct Topology {
    pub(crate) services: BTreeMap<String, Service>,
    pub(crate) ops: Vec<Operation>,
    pub(crate) roots: Vec<OpId>,
    pub(crate) root_flags: Vec<bool>,
}

impl Topology {
    /// The operation behind an id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this topology.
    #[must_use]
    pub fn op(&self, id: OpId) -> &Operation {
        &self.ops[id.0]
    }

    /// Iterates all operations with their ids, in arena order.
    pub fn ops(&self) -> impl Iterator<Item = (OpId, &Operation)> {
        self.ops.iter().enumerate().map(|(i, op)| (OpId(i), op))
    }

    /// Number of operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Number of services.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// The service with the given name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Root operations (never referenced as a call target), sorted
    /// lexicographically by `(service, operation)`.
    #[must_use]
    pub fn roots(&self) -> &[OpId] {
        &self.roots
    }

    /// Whether the operation is a root.
    #[must_use]
    pub fn is_root(&self, id: OpId) -> bool {
        self.root_flags.get(id.0).copied().unwrap_or(false)
    }

    /// Resolves a `service.operation` reference. The split is on the first
    /// dot, so operation names may contain dots.
    #[must_use]
    pub fn resolve(&self, op_ref: &str) -> Option<OpId> {
        let (service, operation) = op_ref.split_once('.')?;
        self.services.get(service)?.operations.get(operation).copied()
    }

    /// Static attributes of the service owning `id`.
    #[must_use]
    pub fn service_attributes(&self, id: OpId) -> &BTreeMap<String, String> {
        &self.services[&self.ops[id.0].service].attributes
    }
}
