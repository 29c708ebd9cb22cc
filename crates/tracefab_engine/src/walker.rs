//! The trace walker.
//!
//! One recursive, synchronous descent over the call graph produces a fully
//! timed span tree. The walk is generic over a [`SpanSink`]: collecting
//! plans and live emission share the exact same code path, so both modes
//! consume the RNG draw-for-draw identically for the same seed.

use crate::plan::{SpanPlan, REJECTION_DURATION};
use crate::state::{Admission, RejectionReason, SimulationState};
use crate::stats::StatsRecorder;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;
use tracefab_model::{AttrGenerator, AttributeValue, KeyValue, SpanKind};
use tracefab_topology::{Call, CallCondition, CallStyle, MergedOverride, OpId, Operation, Topology};

/// Default per-trace span ceiling.
pub const DEFAULT_SPAN_LIMIT: u32 = 10_000;

/// Receives spans as the walk produces them.
///
/// `reserve` hands out dense indices in descent (pre-order) order, so every
/// child index is greater than its parent's. `complete` delivers finished
/// spans in post-order, children before parents, mirroring how real
/// instrumentation ends spans.
pub trait SpanSink {
    /// Reserves the next dense span index.
    fn reserve(&mut self) -> usize;
    /// Delivers a finished span for the reserved index.
    fn complete(&mut self, plan: SpanPlan);
}

/// A sink that collects the full plan of one trace.
#[derive(Debug, Default)]
pub struct PlanSink {
    slots: Vec<Option<SpanPlan>>,
}

impl PlanSink {
    /// Creates an empty plan sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected plans, ordered by index.
    #[must_use]
    pub fn into_plans(self) -> Vec<SpanPlan> {
        debug_assert!(self.slots.iter().all(Option::is_some));
        self.slots.into_iter().flatten().collect()
    }
}

impl SpanSink for PlanSink {
    fn reserve(&mut self) -> usize {
        self.slots.push(None);
        self.slots.len() - 1
    }

    fn complete(&mut self, plan: SpanPlan) {
        let index = plan.index;
        self.slots[index] = Some(plan);
    }
}

/// Per-trace walk inputs resolved by the engine.
#[derive(Debug)]
pub struct WalkParams<'a> {
    /// Merged scenario overrides keyed by operation ref.
    pub overrides: &'a BTreeMap<&'a str, MergedOverride<'a>>,
    /// Names of the active scenarios, for labelling.
    pub scenario_labels: &'a [String],
    /// Whether to attach `synth.scenarios` to spans.
    pub label_scenarios: bool,
    /// Engine elapsed time at trace start; drives simulation state.
    pub elapsed: Duration,
    /// Per-trace span ceiling.
    pub span_limit: u32,
}

/// Result of walking one trace.
#[derive(Debug, Clone, Copy)]
pub struct WalkOutcome {
    /// Synthetic end offset of the root span.
    pub end: Duration,
    /// Whether the root span errored (after cascading).
    pub failed: bool,
    /// Spans produced.
    pub spans: u32,
    /// Whether the span limit short-circuited any recursion.
    pub bounded: bool,
}

/// The recursive synthetic-time walker.
pub struct Walker<'a> {
    topo: &'a Topology,
    sim: &'a mut SimulationState,
    rng: &'a mut ChaCha8Rng,
    stats: &'a StatsRecorder,
    params: WalkParams<'a>,
    span_count: u32,
    bounded: bool,
}

impl<'a> Walker<'a> {
    /// Creates a walker for one trace.
    pub fn new(
        topo: &'a Topology,
        sim: &'a mut SimulationState,
        rng: &'a mut ChaCha8Rng,
        stats: &'a StatsRecorder,
        params: WalkParams<'a>,
    ) -> Self {
        Self {
            topo,
            sim,
            rng,
            stats,
            params,
            span_count: 0,
            bounded: false,
        }
    }

    /// Walks one trace rooted at `root`, starting at synthetic offset
    /// `start`.
    pub fn walk_trace<S: SpanSink>(
        &mut self,
        root: OpId,
        start: Duration,
        sink: &mut S,
    ) -> WalkOutcome {
        let (end, failed) = self.walk(root, None, start, sink);
        WalkOutcome {
            end,
            failed,
            spans: self.span_count,
            bounded: self.bounded,
        }
    }

    /// Walks one operation; returns its (perceived) end offset and whether
    /// it failed.
    fn walk<S: SpanSink>(
        &mut self,
        id: OpId,
        parent: Option<usize>,
        start: Duration,
        sink: &mut S,
    ) -> (Duration, bool) {
        if self.span_count >= self.params.span_limit {
            self.bounded = true;
            return (start, false);
        }
        self.span_count += 1;
        let index = sink.reserve();

        let op = self.topo.op(id);
        let ov = self.params.overrides.get(op.op_ref.as_str());

        let mut duration = op.duration;
        let mut error_rate = op.error_rate;
        if let Some(ov) = ov {
            if let Some(d) = ov.duration {
                duration = d;
            }
            if let Some(e) = ov.error_rate {
                error_rate = e;
            }
        }

        let kind = if self.topo.is_root(id) {
            SpanKind::Server
        } else {
            SpanKind::Client
        };

        let mut tracked = false;
        match self.sim.evaluate(id, self.params.elapsed) {
            Some(Admission::Reject(reason)) => {
                return self.emit_rejection(index, parent, op, kind, start, reason, sink);
            }
            Some(Admission::Proceed {
                duration_multiplier,
                error_rate_add,
            }) => {
                if duration_multiplier > 1.0 {
                    duration = duration.scaled(duration_multiplier);
                }
                error_rate = (error_rate + error_rate_add).min(1.0);
                self.sim.enter(id);
                tracked = true;
            }
            None => {}
        }

        let own_error = self.rng.gen::<f64>() < error_rate;
        let own_duration = duration.sample(self.rng);
        let pre_call = own_duration / 2;
        let child_start = start + pre_call;

        // Effective call list: overrides may remove and append edges.
        let effective: Cow<'_, [Call]> = match ov {
            Some(ov) if ov.has_call_changes() => {
                let mut calls: Vec<Call> = op
                    .calls
                    .iter()
                    .filter(|call| {
                        !ov.remove_calls
                            .contains(self.topo.op(call.target).op_ref.as_str())
                    })
                    .copied()
                    .collect();
                calls.extend(ov.add_calls.iter().copied());
                Cow::Owned(calls)
            }
            _ => Cow::Borrowed(op.calls.as_slice()),
        };

        // Condition and probability filters. Conditions see the span's own
        // error draw, never the cascaded result.
        let mut selected: Vec<Call> = Vec::with_capacity(effective.len());
        for call in effective.iter() {
            match call.condition {
                CallCondition::OnError if !own_error => continue,
                CallCondition::OnSuccess if own_error => continue,
                _ => {}
            }
            if call.probability > 0.0 && self.rng.gen::<f64>() >= call.probability {
                continue;
            }
            selected.push(*call);
        }

        let mut latest_child_end = child_start;
        let mut any_child_failed = false;
        let mut cursor = child_start;
        for call in &selected {
            for _ in 0..call.count.max(1) {
                let attempt_start = match op.call_style {
                    CallStyle::Sequential => cursor,
                    CallStyle::Parallel => child_start,
                };
                let (perceived_end, failed) = self.execute_call(call, index, attempt_start, sink);
                if call.is_async {
                    // Fire-and-forget: nothing feeds back into the parent.
                    continue;
                }
                if op.call_style == CallStyle::Sequential {
                    cursor = perceived_end;
                }
                latest_child_end = latest_child_end.max(perceived_end);
                any_child_failed |= failed;
            }
        }

        let end = latest_child_end + (own_duration - pre_call);
        let is_error = own_error || any_child_failed;

        let post_attrs = self.post_attrs(id, op, ov);
        sink.complete(SpanPlan {
            index,
            parent,
            service: op.service.clone(),
            operation: op.name.clone(),
            kind,
            start,
            end,
            start_attrs: self.start_attrs(op),
            post_attrs,
            is_error,
            scenarios: self.params.scenario_labels.to_vec(),
            rejected: false,
            rejection_reason: None,
        });
        self.stats.record_span(is_error);

        if tracked {
            self.sim
                .exit(id, self.params.elapsed, end.saturating_sub(start), is_error);
        }

        (end, is_error)
    }

    /// Executes one call edge, with up to `1 + retries` attempts.
    fn execute_call<S: SpanSink>(
        &mut self,
        call: &Call,
        parent_index: usize,
        mut attempt_start: Duration,
        sink: &mut S,
    ) -> (Duration, bool) {
        let attempts = call.retries + 1;
        let mut attempt = 0;
        loop {
            let (child_end, mut failed) = self.walk(call.target, Some(parent_index), attempt_start, sink);
            let mut perceived_end = child_end;
            if !call.timeout.is_zero() && child_end.saturating_sub(attempt_start) > call.timeout {
                // The caller gives up; the child span keeps running to its
                // full sampled duration.
                perceived_end = attempt_start + call.timeout;
                failed = true;
                self.stats.record_timeout();
            }
            attempt += 1;
            if failed && attempt < attempts {
                self.stats.record_retry();
                attempt_start = perceived_end + call.retry_backoff;
                continue;
            }
            return (perceived_end, failed);
        }
    }

    fn emit_rejection<S: SpanSink>(
        &mut self,
        index: usize,
        parent: Option<usize>,
        op: &Operation,
        kind: SpanKind,
        start: Duration,
        reason: RejectionReason,
        sink: &mut S,
    ) -> (Duration, bool) {
        match reason {
            RejectionReason::QueueFull => self.stats.record_queue_rejection(),
            RejectionReason::CircuitOpen => self.stats.record_circuit_rejection(),
        }

        let mut start_attrs = self.start_attrs(op);
        start_attrs.push(KeyValue::new("synth.rejected", true));
        start_attrs.push(KeyValue::new("synth.rejection_reason", reason.as_str()));

        let end = start + REJECTION_DURATION;
        sink.complete(SpanPlan {
            index,
            parent,
            service: op.service.clone(),
            operation: op.name.clone(),
            kind,
            start,
            end,
            start_attrs,
            post_attrs: Vec::new(),
            is_error: true,
            scenarios: self.params.scenario_labels.to_vec(),
            rejected: true,
            rejection_reason: Some(reason),
        });
        self.stats.record_span(true);
        (end, true)
    }

    fn start_attrs(&self, op: &Operation) -> Vec<KeyValue> {
        let mut attrs = vec![
            KeyValue::new("synth.service", op.service.as_str()),
            KeyValue::new("synth.operation", op.name.as_str()),
        ];
        if self.params.label_scenarios && !self.params.scenario_labels.is_empty() {
            attrs.push(KeyValue::new(
                "synth.scenarios",
                AttributeValue::StringArray(self.params.scenario_labels.to_vec()),
            ));
        }
        attrs
    }

    fn post_attrs(
        &mut self,
        id: OpId,
        op: &'a Operation,
        ov: Option<&MergedOverride<'_>>,
    ) -> Vec<KeyValue> {
        let service_attrs = self.topo.service_attributes(id);
        let mut attrs = Vec::with_capacity(service_attrs.len() + op.attributes.len());
        for (key, value) in service_attrs {
            attrs.push(KeyValue::new(key.as_str(), value.as_str()));
        }

        match ov {
            Some(ov) if !ov.attributes.is_empty() => {
                let mut merged: BTreeMap<&str, &AttrGenerator> = op
                    .attributes
                    .iter()
                    .map(|(key, generator)| (key.as_str(), generator))
                    .collect();
                for (&key, &generator) in &ov.attributes {
                    merged.insert(key, generator);
                }
                for (key, generator) in merged {
                    attrs.push(KeyValue::new(key, generator.generate(self.rng)));
                }
            }
            _ => {
                for (key, generator) in &op.attributes {
                    attrs.push(KeyValue::new(key.as_str(), generator.generate(self.rng)));
                }
            }
        }

        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn topo_from(yaml: &str) -> Topology {
        let config = tracefab_config::from_str(yaml).expect("config should validate");
        tracefab_topology::build(&config).expect("topology should build")
    }

    struct Fixture {
        topo: Topology,
        sim: SimulationState,
        stats: StatsRecorder,
    }

    impl Fixture {
        fn new(yaml: &str) -> Self {
            let topo = topo_from(yaml);
            let sim = SimulationState::new(&topo);
            Self {
                topo,
                sim,
                stats: StatsRecorder::new(),
            }
        }

        fn walk_with_seed(&mut self, root_ref: &str, seed: u64) -> (Vec<SpanPlan>, WalkOutcome) {
            self.walk_at(root_ref, seed, Duration::ZERO)
        }

        fn walk_at(
            &mut self,
            root_ref: &str,
            seed: u64,
            elapsed: Duration,
        ) -> (Vec<SpanPlan>, WalkOutcome) {
            let empty = BTreeMap::new();
            let labels: Vec<String> = Vec::new();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut walker = Walker::new(
                &self.topo,
                &mut self.sim,
                &mut rng,
                &self.stats,
                WalkParams {
                    overrides: &empty,
                    scenario_labels: &labels,
                    label_scenarios: false,
                    elapsed,
                    span_limit: DEFAULT_SPAN_LIMIT,
                },
            );
            let root = self.topo.resolve(root_ref).expect("root resolves");
            let mut sink = PlanSink::new();
            let outcome = walker.walk_trace(root, elapsed, &mut sink);
            (sink.into_plans(), outcome)
        }
    }

    fn assert_containment(plans: &[SpanPlan]) {
        for plan in plans {
            if let Some(parent) = plan.parent {
                assert!(parent < plan.index, "parent index precedes child");
                let parent = &plans[parent];
                assert!(parent.start <= plan.start, "child starts after parent");
                assert!(plan.end <= parent.end, "child ends before parent");
            }
            assert!(plan.end >= plan.start, "non-negative duration");
        }
    }

    const CHAIN: &str = r#"
services:
  a:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "b.op"
  b:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "c.op"
  c:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "d.op"
  d:
    operations:
      op:
        duration: 10ms
"#;

    #[test]
    fn linear_chain_emits_four_successful_spans() {
        let mut fx = Fixture::new(CHAIN);
        let (plans, outcome) = fx.walk_with_seed("a.op", 1);
        assert_eq!(plans.len(), 4);
        assert!(!outcome.failed);
        assert!(plans.iter().all(|p| !p.is_error));
        assert_containment(&plans);

        // Root is a Server span; everything below is a Client span.
        assert_eq!(plans[0].kind, SpanKind::Server);
        assert!(plans[1..].iter().all(|p| p.kind == SpanKind::Client));

        let stats = fx.stats.snapshot(Duration::from_secs(1));
        assert_eq!(stats.spans, 4);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn diamond_emits_four_spans() {
        let mut fx = Fixture::new(
            r#"
services:
  a:
    operations:
      root:
        duration: 10ms
        calls:
          - target: "b.op"
          - target: "c.op"
  b:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "d.op"
  c:
    operations:
      op:
        duration: 10ms
  d:
    operations:
      op:
        duration: 10ms
"#,
        );
        let (plans, _) = fx.walk_with_seed("a.root", 2);
        assert_eq!(plans.len(), 4);
        assert_containment(&plans);
    }

    #[test]
    fn walks_are_deterministic_per_seed() {
        let mut fx = Fixture::new(CHAIN);
        let (a, _) = fx.walk_with_seed("a.op", 42);
        let (b, _) = fx.walk_with_seed("a.op", 42);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.start, y.start);
            assert_eq!(x.end, y.end);
            assert_eq!(x.is_error, y.is_error);
            assert_eq!(x.post_attrs, y.post_attrs);
        }

        let (c, _) = fx.walk_with_seed("a.op", 43);
        assert!(
            a.iter().zip(&c).any(|(x, y)| x.end != y.end),
            "different seeds should differ somewhere"
        );
    }

    #[test]
    fn retries_produce_extra_attempts_and_cascade() {
        let mut fx = Fixture::new(
            r#"
services:
  root:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "flaky.op"
            retries: 2
            retry_backoff: 1ms
  flaky:
    operations:
      op:
        duration: 5ms
        error_rate: "100%"
"#,
        );
        let (plans, outcome) = fx.walk_with_seed("root.op", 3);
        // Root plus three attempts at the flaky child.
        assert_eq!(plans.len(), 4);
        assert!(outcome.failed, "root errored via cascade");
        assert!(plans[0].is_error);

        let stats = fx.stats.snapshot(Duration::from_secs(1));
        assert_eq!(stats.retries, 2);

        // Attempts are spaced by backoff after each perceived failure.
        let attempts: Vec<_> = plans[1..].iter().collect();
        assert!(attempts.windows(2).all(|w| w[1].start > w[0].start));
    }

    #[test]
    fn timeout_caps_perceived_end_but_not_child_span() {
        let mut fx = Fixture::new(
            r#"
services:
  parent:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "slow.op"
            timeout: 50ms
  slow:
    operations:
      op:
        duration: 200ms
"#,
        );
        let (plans, outcome) = fx.walk_with_seed("parent.op", 4);
        assert_eq!(plans.len(), 2);
        assert!(outcome.failed);

        let parent = &plans[0];
        let child = &plans[1];
        // Parent perceives the timeout: 5ms pre-call + 50ms + 5ms post.
        assert!(parent.duration() <= Duration::from_millis(100));
        assert!(parent.is_error);
        // The child keeps running to its full sampled duration.
        assert!(child.duration() >= Duration::from_millis(100));

        let stats = fx.stats.snapshot(Duration::from_secs(1));
        assert_eq!(stats.timeouts, 1);
    }

    #[test]
    fn sequential_fanout_chains_starts() {
        let mut fx = Fixture::new(
            r#"
services:
  parent:
    operations:
      op:
        duration: 20ms
        call_style: sequential
        calls:
          - target: "child.op"
            count: 3
  child:
    operations:
      op:
        duration: 20ms
"#,
        );
        let (plans, _) = fx.walk_with_seed("parent.op", 5);
        assert_eq!(plans.len(), 4);

        let children: Vec<_> = plans[1..].iter().collect();
        for pair in children.windows(2) {
            assert_eq!(pair[1].start, pair[0].end, "next starts at previous end");
        }
        // 3 x 20ms of children plus the parent's own 20ms.
        assert!(plans[0].duration() >= Duration::from_millis(80));
    }

    #[test]
    fn parallel_fanout_shares_start() {
        let mut fx = Fixture::new(
            r#"
services:
  parent:
    operations:
      op:
        duration: 20ms
        calls:
          - target: "child.op"
            count: 3
  child:
    operations:
      op:
        duration: 20ms
"#,
        );
        let (plans, _) = fx.walk_with_seed("parent.op", 6);
        let starts: Vec<_> = plans[1..].iter().map(|p| p.start).collect();
        assert!(starts.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn queue_full_rejection_span() {
        let mut fx = Fixture::new(
            r"
services:
  busy:
    operations:
      op:
        duration: 10ms
        queue_depth: 1
",
        );
        let id = fx.topo.resolve("busy.op").unwrap();
        fx.sim.enter(id);

        let (plans, outcome) = fx.walk_with_seed("busy.op", 7);
        assert_eq!(plans.len(), 1);
        let span = &plans[0];
        assert!(span.rejected);
        assert!(span.is_error);
        assert_eq!(span.duration(), REJECTION_DURATION);
        assert_eq!(span.rejection_reason, Some(RejectionReason::QueueFull));
        let reason = span
            .start_attrs
            .iter()
            .find(|kv| kv.key == "synth.rejection_reason")
            .unwrap();
        assert_eq!(reason.value.as_string(), "queue_full");
        assert!(outcome.failed);

        let stats = fx.stats.snapshot(Duration::from_secs(1));
        assert_eq!(stats.queue_rejections, 1);
    }

    #[test]
    fn override_replaces_duration_and_error_rate() {
        let topo = topo_from(
            r"
services:
  api:
    operations:
      op:
        duration: 1ms
",
        );
        let mut sim = SimulationState::new(&topo);
        let stats = StatsRecorder::new();
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let mut overrides: BTreeMap<&str, MergedOverride<'_>> = BTreeMap::new();
        overrides.insert(
            "api.op",
            MergedOverride {
                duration: Some(tracefab_model::Distribution::constant(Duration::from_millis(
                    999,
                ))),
                error_rate: Some(1.0),
                ..MergedOverride::default()
            },
        );
        let labels = vec!["meltdown".to_string()];

        let mut walker = Walker::new(
            &topo,
            &mut sim,
            &mut rng,
            &stats,
            WalkParams {
                overrides: &overrides,
                scenario_labels: &labels,
                label_scenarios: true,
                elapsed: Duration::ZERO,
                span_limit: DEFAULT_SPAN_LIMIT,
            },
        );
        let root = topo.resolve("api.op").unwrap();
        let mut sink = PlanSink::new();
        let outcome = walker.walk_trace(root, Duration::ZERO, &mut sink);
        let plans = sink.into_plans();

        assert!(plans[0].duration() >= Duration::from_millis(500));
        assert!(plans[0].is_error);
        assert!(outcome.failed);
        let label = plans[0]
            .start_attrs
            .iter()
            .find(|kv| kv.key == "synth.scenarios")
            .unwrap();
        assert_eq!(label.value.as_string(), "meltdown");
    }

    #[test]
    fn conditions_use_own_error_not_cascaded() {
        // The parent never errors on its own; its child always does. The
        // on-error call must not fire even though the parent ends errored.
        let mut fx = Fixture::new(
            r#"
services:
  parent:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "failing.op"
          - target: "handler.op"
            condition: on-error
  failing:
    operations:
      op:
        duration: 5ms
        error_rate: "100%"
  handler:
    operations:
      op:
        duration: 5ms
"#,
        );
        let (plans, outcome) = fx.walk_with_seed("parent.op", 9);
        assert_eq!(plans.len(), 2, "handler must not fire");
        assert!(outcome.failed, "cascade still marks the parent");
        assert!(plans
            .iter()
            .all(|p| p.operation != "op" || p.service != "handler"));
    }

    #[test]
    fn on_success_fires_without_own_error() {
        let mut fx = Fixture::new(
            r#"
services:
  parent:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "next.op"
            condition: on-success
  next:
    operations:
      op:
        duration: 5ms
"#,
        );
        let (plans, _) = fx.walk_with_seed("parent.op", 10);
        assert_eq!(plans.len(), 2);
    }

    #[test]
    fn zero_probability_always_fires() {
        let mut fx = Fixture::new(
            r#"
services:
  parent:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "child.op"
            probability: 0
  child:
    operations:
      op:
        duration: 5ms
"#,
        );
        for seed in 0..20 {
            let (plans, _) = fx.walk_with_seed("parent.op", seed);
            assert_eq!(plans.len(), 2, "seed {seed}");
        }
    }

    #[test]
    fn low_probability_mostly_skips() {
        let mut fx = Fixture::new(
            r#"
services:
  parent:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "child.op"
            probability: 0.05
  child:
    operations:
      op:
        duration: 5ms
"#,
        );
        let mut fired = 0;
        for seed in 0..200 {
            let (plans, _) = fx.walk_with_seed("parent.op", seed);
            if plans.len() == 2 {
                fired += 1;
            }
        }
        assert!(fired < 40, "fired {fired} of 200");
    }

    #[test]
    fn async_failures_do_not_cascade() {
        let mut fx = Fixture::new(
            r#"
services:
  parent:
    operations:
      op:
        duration: 10ms
        calls:
          - target: "bg.op"
            async: true
  bg:
    operations:
      op:
        duration: 500ms
        error_rate: "100%"
"#,
        );
        let (plans, outcome) = fx.walk_with_seed("parent.op", 11);
        assert_eq!(plans.len(), 2);
        assert!(!outcome.failed, "async failure must not reach the parent");
        assert!(!plans[0].is_error);
        // The parent does not wait for the async child either.
        assert!(plans[0].duration() < Duration::from_millis(100));
    }

    #[test]
    fn span_limit_short_circuits() {
        let mut fx = Fixture::new(CHAIN);
        let empty = BTreeMap::new();
        let labels: Vec<String> = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut walker = Walker::new(
            &fx.topo,
            &mut fx.sim,
            &mut rng,
            &fx.stats,
            WalkParams {
                overrides: &empty,
                scenario_labels: &labels,
                label_scenarios: false,
                elapsed: Duration::ZERO,
                span_limit: 2,
            },
        );
        let root = fx.topo.resolve("a.op").unwrap();
        let mut sink = PlanSink::new();
        let outcome = walker.walk_trace(root, Duration::ZERO, &mut sink);
        let plans = sink.into_plans();
        assert_eq!(plans.len(), 2);
        assert!(outcome.bounded);
        assert_containment(&plans);
    }

    #[test]
    fn circuit_breaker_opens_rejects_and_probes() {
        let mut fx = Fixture::new(
            r#"
services:
  edge:
    operations:
      op:
        duration: 5ms
        calls:
          - target: "core.op"
  core:
    operations:
      op:
        duration: 5ms
        error_rate: "100%"
        circuit_breaker:
          failure_threshold: 2
          window: 60s
          cooldown: 30s
"#,
        );
        let secs = Duration::from_secs;

        // Two failing walks reach the threshold and open the breaker.
        for seed in 0..2 {
            let (plans, _) = fx.walk_at("edge.op", seed, secs(0));
            assert!(!plans[1].rejected, "still closed on walk {seed}");
            assert!(plans[1].is_error);
        }

        // Within the cooldown the core rejects outright.
        let (plans, outcome) = fx.walk_at("edge.op", 2, secs(10));
        assert_eq!(plans.len(), 2);
        let rejected = &plans[1];
        assert!(rejected.rejected);
        assert_eq!(rejected.rejection_reason, Some(RejectionReason::CircuitOpen));
        assert_eq!(rejected.duration(), REJECTION_DURATION);
        assert!(outcome.failed, "rejection cascades to the root");
        assert_eq!(fx.stats.snapshot(secs(1)).circuit_breaker_trips, 1);

        // After the cooldown a half-open probe is admitted; it fails and
        // reopens the breaker with a fresh cooldown.
        let (plans, _) = fx.walk_at("edge.op", 3, secs(30));
        assert!(!plans[1].rejected, "probe admitted");
        assert!(plans[1].is_error);

        let (plans, _) = fx.walk_at("edge.op", 4, secs(40));
        assert!(plans[1].rejected, "reopened breaker rejects again");
    }

    #[test]
    fn backpressure_amplifies_later_walks() {
        let mut fx = Fixture::new(
            r"
services:
  db:
    operations:
      op:
        duration: 100ms
        backpressure:
          latency_threshold: 50ms
          duration_multiplier: 4.0
          error_rate_add: 0
",
        );
        let (plans, _) = fx.walk_at("db.op", 0, Duration::ZERO);
        assert_eq!(plans[0].duration(), Duration::from_millis(100));

        // The 100ms sample exceeded the 50ms threshold, so the next walk
        // runs amplified.
        let (plans, _) = fx.walk_at("db.op", 1, Duration::from_secs(1));
        assert_eq!(plans[0].duration(), Duration::from_millis(400));
    }

    // Random layered topologies (always-firing synchronous calls, no
    // timeouts) drive the cascading and containment properties.
    fn layered_yaml(widths: &[usize], error_pcts: &[u8]) -> String {
        let mut yaml = String::from("services:\n");
        let mut error_iter = error_pcts.iter().cycle();
        for (layer, &width) in widths.iter().enumerate() {
            for slot in 0..width {
                let error = error_iter.next().copied().unwrap_or(0);
                yaml.push_str(&format!(
                    "  l{layer}s{slot}:\n    operations:\n      op:\n        duration: 2ms\n        error_rate: \"{error}%\"\n"
                ));
                if layer + 1 < widths.len() {
                    yaml.push_str("        calls:\n");
                    for target in 0..widths[layer + 1] {
                        yaml.push_str(&format!(
                            "          - target: \"l{}s{target}.op\"\n",
                            layer + 1
                        ));
                    }
                }
            }
        }
        yaml
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]
        #[test]
        fn cascading_and_containment_hold(
            widths in prop::collection::vec(1usize..3, 1..4),
            error_pcts in prop::collection::vec(0u8..=100, 1..6),
            seed in 0u64..10_000,
        ) {
            let mut fx = Fixture::new(&layered_yaml(&widths, &error_pcts));
            let roots: Vec<String> = fx
                .topo
                .roots()
                .iter()
                .map(|&r| fx.topo.op(r).op_ref.clone())
                .collect();
            let root = roots[seed as usize % roots.len()].clone();
            let (plans, outcome) = fx.walk_with_seed(&root, seed);

            // Containment and ordering.
            for plan in &plans {
                prop_assert!(plan.end >= plan.start);
                if let Some(parent) = plan.parent {
                    prop_assert!(parent < plan.index);
                    prop_assert!(plans[parent].start <= plan.start);
                    prop_assert!(plan.end <= plans[parent].end);
                }
            }

            // Cascading: an errored child marks its parent errored.
            for plan in &plans {
                if plan.is_error {
                    if let Some(parent) = plan.parent {
                        prop_assert!(plans[parent].is_error);
                    }
                }
            }

            // The trace fails exactly when the root errored.
            prop_assert_eq!(outcome.failed, plans[0].is_error);

            // Counters line up with what was emitted.
            let stats = fx.stats.snapshot(Duration::from_secs(1));
            let errors = plans.iter().filter(|p| p.is_error).count() as u64;
            prop_assert_eq!(stats.spans, plans.len() as u64);
            prop_assert_eq!(stats.errors, errors);
            prop_assert!(stats.errors <= stats.spans);
        }
    }

    #[test]
    fn attribute_generators_feed_post_attrs() {
        let mut fx = Fixture::new(
            r#"
services:
  api:
    attributes:
      env: prod
    operations:
      op:
        duration: 10ms
        attributes:
          region: { values: { eu: 1, us: 1 } }
          request: { sequence: "req-{n}" }
"#,
        );
        let (plans, _) = fx.walk_with_seed("api.op", 13);
        let post: HashMap<_, _> = plans[0]
            .post_attrs
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.as_string()))
            .collect();
        assert_eq!(post["env"], "prod");
        assert!(post["region"] == "eu" || post["region"] == "us");
        assert_eq!(post["request"], "req-0");
    }
}
