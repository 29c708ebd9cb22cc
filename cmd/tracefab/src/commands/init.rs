//! Init command implementation.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Starter topology written by `tracefab init`.
const STARTER_TOPOLOGY: &str = r#"version: 1

services:
  frontend:
    attributes:
      deployment.environment: demo
    operations:
      checkout:
        duration: "30ms +/- 10ms"
        error_rate: "1%"
        calls:
          - target: "cart.get"
          - target: "payment.charge"
            timeout: 250ms
            retries: 1
            retry_backoff: 50ms
        attributes:
          tenant: { values: { free: 8, pro: 2 } }
          request_id: { sequence: "req-{n}" }

  cart:
    operations:
      get:
        duration: "8ms +/- 3ms"
        calls:
          - target: "redis.get"
            count: 2

  payment:
    operations:
      charge:
        duration: "60ms +/- 20ms"
        error_rate: "2%"
        queue_depth: 32
        circuit_breaker:
          failure_threshold: 5
          window: 30s
          cooldown: 15s

  redis:
    operations:
      get:
        duration: 1ms

traffic:
  rate: 10/s
  pattern: diurnal
  period: 1h

scenarios:
  - name: payment-brownout
    at: "+2m"
    duration: 3m
    priority: 1
    override:
      "payment.charge":
        duration: "400ms +/- 100ms"
        error_rate: "25%"
"#;

/// Runs the init command: scaffolds a topology file and a README.
pub fn run(path: &str) -> Result<()> {
    let project_path = Path::new(path);

    info!("initializing tracefab project at: {}", project_path.display());

    fs::create_dir_all(project_path)
        .with_context(|| format!("failed to create directory: {path}"))?;

    let topology_path = project_path.join("topology.yaml");
    if topology_path.exists() {
        info!("skipped: {} (already exists)", topology_path.display());
    } else {
        fs::write(&topology_path, STARTER_TOPOLOGY)
            .with_context(|| "failed to create topology.yaml")?;
        info!("created: {}", topology_path.display());
    }

    let readme_content = r#"# Tracefab topology

This directory contains a Tracefab topology describing a synthetic
microservice fleet.

## Files

- `topology.yaml` - Services, operations, call graph, traffic and scenarios

## Commands

```bash
# Check the topology for errors
tracefab validate topology.yaml

# Inspect worst-case structure
tracefab check topology.yaml --max-depth 8 --max-spans 500 --samples 100

# Generate traces for a minute (spans on stdout, stats on stderr)
tracefab run topology.yaml --duration 1m

# Replay traces at wall-clock times with a fixed seed
tracefab run topology.yaml --realtime --seed 7
```

## Workflow

1. Edit `topology.yaml` to model your fleet
2. Run `tracefab validate` until it passes
3. Run `tracefab check` to keep trace shapes within budget
4. Run `tracefab run` and point the output at your pipeline
"#;

    let readme_path = project_path.join("README.md");
    if !readme_path.exists() {
        fs::write(&readme_path, readme_content)
            .with_context(|| "failed to create README.md")?;
        info!("created: {}", readme_path.display());
    }

    info!("tracefab project initialized");
    info!("");
    info!("next steps:");
    info!("  1. Edit topology.yaml to model your services");
    info!("  2. Run 'tracefab validate topology.yaml'");
    info!("  3. Run 'tracefab run topology.yaml --duration 30s'");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_topology_validates_and_builds() {
        let config = tracefab_config::from_str(STARTER_TOPOLOGY).expect("starter config valid");
        let topo = tracefab_topology::build(&config).expect("starter topology builds");
        assert!(topo.roots().len() == 1);
        tracefab_topology::build_scenarios(&config.scenarios, &topo)
            .expect("starter scenarios resolve");
    }
}
