//! Validate command implementation.

use anyhow::{Context, Result};
use tracing::info;

/// Runs the validate command.
///
/// Loads, validates and fully resolves the config (topology and scenarios)
/// so every reference and cycle error surfaces here.
pub fn run(file: &str) -> Result<()> {
    let config = tracefab_config::from_path(file)
        .with_context(|| format!("invalid configuration: {file}"))?;

    let topo = tracefab_topology::build(&config)
        .with_context(|| format!("failed to resolve topology: {file}"))?;

    tracefab_topology::build_scenarios(&config.scenarios, &topo)
        .with_context(|| format!("failed to resolve scenarios: {file}"))?;

    if let Some(traffic) = &config.traffic {
        tracefab_topology::TrafficPattern::from_config(traffic)
            .with_context(|| format!("failed to resolve traffic pattern: {file}"))?;
    }

    info!(
        services = topo.service_count(),
        operations = topo.operation_count(),
        roots = topo.roots().len(),
        scenarios = config.scenarios.len(),
        "configuration valid"
    );
    println!("{file}: valid");
    Ok(())
}
