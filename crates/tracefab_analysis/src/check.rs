//! Bound checks against caller-provided limits.

use crate::bounds::StaticBounds;
use crate::sample::SampleSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which structural metric a check covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Longest root-to-leaf chain.
    Depth,
    /// Largest per-operation fan-out.
    FanOut,
    /// Worst-case spans per trace.
    Spans,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Depth => write!(f, "max_depth"),
            Self::FanOut => write!(f, "max_fan_out"),
            Self::Spans => write!(f, "max_spans"),
        }
    }
}

/// Limits to check the static bounds against. Absent limits are skipped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum allowed depth.
    pub max_depth: Option<u32>,
    /// Maximum allowed fan-out.
    pub max_fan_out: Option<u64>,
    /// Maximum allowed spans per trace.
    pub max_spans: Option<u64>,
}

impl Limits {
    /// Whether no limit is set at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.max_depth.is_none() && self.max_fan_out.is_none() && self.max_spans.is_none()
    }
}

/// One metric checked against one limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// The metric checked.
    pub metric: Metric,
    /// The static bound.
    pub bound: u64,
    /// The caller's limit.
    pub limit: u64,
    /// Whether the bound fits the limit.
    pub passed: bool,
    /// The sampled observation, when sampling was requested.
    pub observed: Option<u64>,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        write!(
            f,
            "[{verdict}] {}: bound {} vs limit {}",
            self.metric, self.bound, self.limit
        )?;
        if let Some(observed) = self.observed {
            write!(f, " (observed {observed})")?;
        }
        Ok(())
    }
}

/// The full report of one check run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckReport {
    /// One result per provided limit.
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    /// Whether every checked metric passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "{result}")?;
        }
        Ok(())
    }
}

/// Checks the static bounds (and optional sampled observations) against
/// the limits.
#[must_use]
pub fn check(
    bounds: &StaticBounds,
    limits: &Limits,
    observed: Option<&SampleSummary>,
) -> CheckReport {
    let mut results = Vec::new();

    if let Some(limit) = limits.max_depth {
        results.push(CheckResult {
            metric: Metric::Depth,
            bound: u64::from(bounds.depth.depth),
            limit: u64::from(limit),
            passed: bounds.depth.depth <= limit,
            observed: observed.map(|s| u64::from(s.max_depth)),
        });
    }
    if let Some(limit) = limits.max_fan_out {
        results.push(CheckResult {
            metric: Metric::FanOut,
            bound: bounds.fan_out.fan_out,
            limit,
            passed: bounds.fan_out.fan_out <= limit,
            observed: observed.map(|s| u64::from(s.max_fan_out)),
        });
    }
    if let Some(limit) = limits.max_spans {
        results.push(CheckResult {
            metric: Metric::Spans,
            bound: bounds.spans,
            limit,
            passed: bounds.spans <= limit,
            observed: observed.map(|s| u64::from(s.max_spans)),
        });
    }

    CheckReport { results }
}
