//! Sampled trace distributions.
//!
//! Runs the real walker a number of times with independently seeded RNGs
//! and records per-trace depth, span count and fan-out. The sampled maxima
//! can never exceed the static bounds; the test suite holds the two
//! against each other.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracefab_engine::{PlanSink, SimulationState, StatsRecorder, WalkParams, Walker};
use tracefab_topology::Topology;

/// Observations from one sampled trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSample {
    /// Deepest parent chain, in edges.
    pub depth: u32,
    /// Spans in the trace.
    pub spans: u32,
    /// Largest number of children under one span.
    pub fan_out: u32,
}

/// Aggregates over all sampled traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSummary {
    /// Raw per-trace samples, in sampling order.
    pub samples: Vec<TraceSample>,
    /// Largest observed depth.
    pub max_depth: u32,
    /// Largest observed span count.
    pub max_spans: u32,
    /// Largest observed fan-out.
    pub max_fan_out: u32,
    /// Mean span count.
    pub mean_spans: f64,
    /// Median span count.
    pub p50_spans: u32,
    /// 95th percentile span count.
    pub p95_spans: u32,
    /// 99th percentile span count.
    pub p99_spans: u32,
}

/// Walks `n` traces with RNGs seeded `seed`, `seed+1`, … and summarises
/// the observed structure.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_traces(topo: &Topology, n: usize, seed: u64, span_limit: u32) -> SampleSummary {
    let mut sim = SimulationState::new(topo);
    let stats = StatsRecorder::new();
    let overrides = BTreeMap::new();
    let labels: Vec<String> = Vec::new();

    let mut samples = Vec::with_capacity(n);
    for i in 0..n {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
        let root = topo.roots()[rng.gen_range(0..topo.roots().len())];

        let mut walker = Walker::new(
            topo,
            &mut sim,
            &mut rng,
            &stats,
            WalkParams {
                overrides: &overrides,
                scenario_labels: &labels,
                label_scenarios: false,
                elapsed: Duration::ZERO,
                span_limit,
            },
        );
        let mut sink = PlanSink::new();
        walker.walk_trace(root, Duration::ZERO, &mut sink);
        samples.push(measure(&sink.into_plans()));
    }

    let max_depth = samples.iter().map(|s| s.depth).max().unwrap_or(0);
    let max_spans = samples.iter().map(|s| s.spans).max().unwrap_or(0);
    let max_fan_out = samples.iter().map(|s| s.fan_out).max().unwrap_or(0);

    let mut span_counts: Vec<u32> = samples.iter().map(|s| s.spans).collect();
    span_counts.sort_unstable();
    let mean_spans = if span_counts.is_empty() {
        0.0
    } else {
        span_counts.iter().map(|&s| f64::from(s)).sum::<f64>() / span_counts.len() as f64
    };

    SampleSummary {
        max_depth,
        max_spans,
        max_fan_out,
        mean_spans,
        p50_spans: percentile(&span_counts, 0.50),
        p95_spans: percentile(&span_counts, 0.95),
        p99_spans: percentile(&span_counts, 0.99),
        samples,
    }
}

/// Structure of one planned trace.
fn measure(plans: &[tracefab_engine::SpanPlan]) -> TraceSample {
    let mut depths = vec![0u32; plans.len()];
    let mut children = vec![0u32; plans.len()];
    let mut max_depth = 0;

    for plan in plans {
        if let Some(parent) = plan.parent {
            depths[plan.index] = depths[parent] + 1;
            children[parent] += 1;
        }
        max_depth = max_depth.max(depths[plan.index]);
    }

    TraceSample {
        depth: max_depth,
        spans: u32::try_from(plans.len()).unwrap_or(u32::MAX),
        fan_out: children.iter().copied().max().unwrap_or(0),
    }
}

/// Nearest-rank percentile over a sorted slice.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn percentile(sorted: &[u32], q: f64) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
