//! Cross-trace simulation state.
//!
//! Each operation with a queue depth, backpressure or circuit breaker
//! configured gets an [`OperationState`]. The engine's driving task is the
//! single owner of all mutations; nothing here is synchronised. State
//! persists across scenario boundaries: a tripped breaker does not heal
//! just because the scenario that caused the load ended.

use std::time::Duration;
use tracefab_topology::{BackpressureParams, CircuitBreakerParams, OpId, Topology};

/// EWMA smoothing factor for recent latency.
const LATENCY_ALPHA: f64 = 0.3;

/// Upper clamp for the backpressure duration multiplier.
const MAX_BACKPRESSURE_MULTIPLIER: f64 = 10.0;

/// Why an operation refused to execute a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The admission queue is full.
    QueueFull,
    /// The circuit breaker is open.
    CircuitOpen,
}

impl RejectionReason {
    /// The wire label used in span attributes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

/// Outcome of admission evaluation for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Execute, with backpressure adjustments applied.
    Proceed {
        /// Multiplier for the operation's mean duration (>= 1).
        duration_multiplier: f64,
        /// Added to the operation's error rate.
        error_rate_add: f64,
    },
    /// Refuse with a rejection span.
    Reject(RejectionReason),
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Requests flow normally.
    #[default]
    Closed,
    /// Requests are rejected until the cooldown elapses.
    Open,
    /// One probe request decides between reopening and closing.
    HalfOpen,
}

/// Runtime state of a single operation.
#[derive(Debug)]
pub struct OperationState {
    queue_depth: u32,
    backpressure: Option<BackpressureParams>,
    breaker: Option<CircuitBreakerParams>,

    active_requests: u32,
    recent_latency: Duration,
    has_latency_sample: bool,
    backpressure_active: bool,

    // Failure timestamps, capped at the breaker threshold. The cap is
    // deliberate: the breaker only needs to know the threshold was reached
    // within the window, not the exact count beyond it.
    failures: Vec<Duration>,
    circuit: CircuitState,
    opened_at: Duration,
}

impl OperationState {
    fn new(
        queue_depth: u32,
        backpressure: Option<BackpressureParams>,
        breaker: Option<CircuitBreakerParams>,
    ) -> Self {
        Self {
            queue_depth,
            backpressure,
            breaker,
            active_requests: 0,
            recent_latency: Duration::ZERO,
            has_latency_sample: false,
            backpressure_active: false,
            failures: Vec::new(),
            circuit: CircuitState::Closed,
            opened_at: Duration::ZERO,
        }
    }

    /// Decides whether a request may execute at `elapsed`.
    ///
    /// An open breaker whose cooldown has passed transitions to half-open
    /// and admits the probe. An open breaker takes precedence over a full
    /// queue.
    pub fn evaluate(&mut self, elapsed: Duration) -> Admission {
        if self.circuit == CircuitState::Open {
            if let Some(cb) = &self.breaker {
                if elapsed.saturating_sub(self.opened_at) >= cb.cooldown {
                    self.circuit = CircuitState::HalfOpen;
                }
            }
        }
        if self.circuit == CircuitState::Open {
            return Admission::Reject(RejectionReason::CircuitOpen);
        }

        if self.queue_depth > 0 && self.active_requests >= self.queue_depth {
            return Admission::Reject(RejectionReason::QueueFull);
        }

        if self.backpressure_active {
            if let Some(bp) = &self.backpressure {
                let multiplier = if bp.duration_multiplier <= 0.0 {
                    1.0
                } else {
                    bp.duration_multiplier.clamp(1.0, MAX_BACKPRESSURE_MULTIPLIER)
                };
                return Admission::Proceed {
                    duration_multiplier: multiplier,
                    error_rate_add: bp.error_rate_add,
                };
            }
        }

        Admission::Proceed {
            duration_multiplier: 1.0,
            error_rate_add: 0.0,
        }
    }

    /// Records that a request started executing.
    pub fn enter(&mut self) {
        self.active_requests += 1;
    }

    /// Records that a request finished with the given latency and outcome.
    pub fn exit(&mut self, elapsed: Duration, latency: Duration, failed: bool) {
        self.active_requests = self.active_requests.saturating_sub(1);

        if let Some(bp) = &self.backpressure {
            self.recent_latency = if self.has_latency_sample {
                let smoothed = LATENCY_ALPHA
                    .mul_add(latency.as_secs_f64(), (1.0 - LATENCY_ALPHA) * self.recent_latency.as_secs_f64());
                Duration::from_secs_f64(smoothed.max(0.0))
            } else {
                latency
            };
            self.has_latency_sample = true;
            self.backpressure_active = self.recent_latency > bp.latency_threshold;
        }

        let Some(cb) = self.breaker else { return };

        if !cb.window.is_zero() {
            let cutoff = elapsed.saturating_sub(cb.window);
            self.failures.retain(|&at| at >= cutoff);
        }
        if failed && (self.failures.len() as u32) < cb.failure_threshold {
            self.failures.push(elapsed);
        }

        match self.circuit {
            CircuitState::Closed => {
                if self.failures.len() as u32 >= cb.failure_threshold {
                    self.circuit = CircuitState::Open;
                    self.opened_at = elapsed;
                    tracing::debug!(?elapsed, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                if failed {
                    self.circuit = CircuitState::Open;
                    self.opened_at = elapsed;
                } else {
                    self.circuit = CircuitState::Closed;
                    self.failures.clear();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Currently executing requests.
    #[must_use]
    pub const fn active_requests(&self) -> u32 {
        self.active_requests
    }

    /// Current breaker state.
    #[must_use]
    pub const fn circuit(&self) -> CircuitState {
        self.circuit
    }

    /// Whether backpressure is currently amplifying requests.
    #[must_use]
    pub const fn backpressure_active(&self) -> bool {
        self.backpressure_active
    }

    /// Number of failures currently in the window.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Per-operation runtime states for one engine run.
///
/// Not safe for concurrent use; the engine's driving task owns all
/// mutations.
#[derive(Debug)]
pub struct SimulationState {
    states: Vec<Option<OperationState>>,
}

impl SimulationState {
    /// Allocates state for every operation that needs it.
    #[must_use]
    pub fn new(topo: &Topology) -> Self {
        let states = topo
            .ops()
            .map(|(_, op)| {
                op.has_runtime_state().then(|| {
                    OperationState::new(op.queue_depth, op.backpressure, op.circuit_breaker)
                })
            })
            .collect();
        Self { states }
    }

    /// Evaluates admission for an operation; `None` if it tracks no state.
    pub fn evaluate(&mut self, id: OpId, elapsed: Duration) -> Option<Admission> {
        self.states
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .map(|state| state.evaluate(elapsed))
    }

    /// Marks a request as started on a tracked operation.
    pub fn enter(&mut self, id: OpId) {
        if let Some(state) = self.states.get_mut(id.index()).and_then(Option::as_mut) {
            state.enter();
        }
    }

    /// Marks a request as finished on a tracked operation.
    pub fn exit(&mut self, id: OpId, elapsed: Duration, latency: Duration, failed: bool) {
        if let Some(state) = self.states.get_mut(id.index()).and_then(Option::as_mut) {
            state.exit(elapsed, latency, failed);
        }
    }

    /// Read access to an operation's state, if tracked.
    #[must_use]
    pub fn state(&self, id: OpId) -> Option<&OperationState> {
        self.states.get(id.index()).and_then(Option::as_ref)
    }

    /// Mutable access to an operation's state, if tracked.
    #[must_use]
    pub fn state_mut(&mut self, id: OpId) -> Option<&mut OperationState> {
        self.states.get_mut(id.index()).and_then(Option::as_mut)
    }
}
