//! Check command implementation.

use anyhow::{Context, Result};
use tracefab_analysis::{analyze, check, sample_traces, Limits};
use tracefab_engine::DEFAULT_SPAN_LIMIT;

/// Runs the check command.
pub fn run(file: &str, limits: Limits, samples: usize, seed: u64) -> Result<()> {
    let config = tracefab_config::from_path(file)
        .with_context(|| format!("invalid configuration: {file}"))?;
    let topo = tracefab_topology::build(&config)
        .with_context(|| format!("failed to resolve topology: {file}"))?;

    let bounds = analyze(&topo);
    println!(
        "max_depth: {} (path: {})",
        bounds.depth.depth,
        bounds.depth.path.join(" -> ")
    );
    println!(
        "max_fan_out: {} (at {})",
        bounds.fan_out.fan_out, bounds.fan_out.op_ref
    );
    println!("max_spans: {}", bounds.spans);

    let summary = if samples > 0 {
        let summary = sample_traces(&topo, samples, seed, DEFAULT_SPAN_LIMIT);
        println!(
            "sampled {samples} traces: depth <= {}, spans <= {} (p50 {}, p95 {}, p99 {}), fan-out <= {}",
            summary.max_depth,
            summary.max_spans,
            summary.p50_spans,
            summary.p95_spans,
            summary.p99_spans,
            summary.max_fan_out,
        );
        Some(summary)
    } else {
        None
    };

    if limits.is_empty() {
        return Ok(());
    }

    let report = check(&bounds, &limits, summary.as_ref());
    print!("{report}");
    if !report.all_passed() {
        anyhow::bail!("structural check failed");
    }
    Ok(())
}
