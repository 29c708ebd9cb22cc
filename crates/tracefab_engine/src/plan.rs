//! Planned spans.
//!
//! A [`SpanPlan`] is one fully-timed span of a planned trace: dense index,
//! parent link, synthetic start/end offsets and attributes. Plans are
//! short-lived; a trace's plan list is emitted (synthetically or at wall
//! clock) and discarded.

use crate::state::RejectionReason;
use std::time::Duration;
use tracefab_model::{KeyValue, Span, SpanKind, SpanStatus};

/// Fixed duration of a rejection span.
pub const REJECTION_DURATION: Duration = Duration::from_millis(1);

/// Status description for simulated failures.
pub const SYNTHETIC_ERROR: &str = "synthetic error";

/// Status description for spans ended by cancellation.
pub const CANCELLED: &str = "cancelled";

/// One planned span.
#[derive(Debug, Clone)]
pub struct SpanPlan {
    /// Dense index in the plan list; parents precede children.
    pub index: usize,
    /// Parent plan index; `None` for the root.
    pub parent: Option<usize>,
    /// Owning service name.
    pub service: String,
    /// Operation name.
    pub operation: String,
    /// Span kind (Server for roots, Client otherwise).
    pub kind: SpanKind,
    /// Synthetic start offset from engine start.
    pub start: Duration,
    /// Synthetic end offset from engine start.
    pub end: Duration,
    /// Attributes known at span start.
    pub start_attrs: Vec<KeyValue>,
    /// Attributes attached after the span starts.
    pub post_attrs: Vec<KeyValue>,
    /// Whether the span ends in error (own draw or cascaded).
    pub is_error: bool,
    /// Names of the scenarios active when the trace was planned.
    pub scenarios: Vec<String>,
    /// Whether the span is a rejection span.
    pub rejected: bool,
    /// Why the span was rejected, when it is one.
    pub rejection_reason: Option<RejectionReason>,
}

impl SpanPlan {
    /// The planned span duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// The status this span materialises with.
    #[must_use]
    pub fn status(&self) -> SpanStatus {
        if self.is_error {
            let description = self
                .rejection_reason
                .map_or(SYNTHETIC_ERROR, RejectionReason::as_str);
            SpanStatus::error(description)
        } else {
            SpanStatus::default()
        }
    }
}

/// Derives the hex span id for a plan index from the trace's id seed.
///
/// Identity never consumes the walk RNG, which keeps the planner and the
/// live walker draw-for-draw identical.
#[must_use]
pub fn span_id(trace_seed: u64, index: usize) -> String {
    format!("{:016x}", mix64(trace_seed.wrapping_add(index as u64 + 1)))
}

/// Formats a 128-bit trace id as 32 hex chars.
#[must_use]
pub fn trace_id(seed: u128) -> String {
    format!("{seed:032x}")
}

// SplitMix64 finaliser; spreads sequential inputs across the id space.
const fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Materialises a plan into an exportable [`Span`].
///
/// `base_epoch_ns` anchors offset zero; the engine's time offset is already
/// folded into it.
#[must_use]
pub fn materialize(plan: &SpanPlan, trace_hex: &str, trace_seed: u64, base_epoch_ns: u64) -> Span {
    let mut attributes =
        Vec::with_capacity(plan.start_attrs.len() + plan.post_attrs.len());
    attributes.extend(plan.start_attrs.iter().cloned());
    attributes.extend(plan.post_attrs.iter().cloned());

    Span {
        trace_id: trace_hex.to_string(),
        span_id: span_id(trace_seed, plan.index),
        parent_span_id: plan.parent.map(|p| span_id(trace_seed, p)),
        service: plan.service.clone(),
        name: plan.operation.clone(),
        kind: plan.kind,
        start_time_ns: base_epoch_ns.saturating_add(duration_ns(plan.start)),
        end_time_ns: base_epoch_ns.saturating_add(duration_ns(plan.end)),
        status: plan.status(),
        attributes,
    }
}

/// Nanoseconds of a duration, saturating at `u64::MAX`.
#[must_use]
pub fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
