//! Run command implementation.

use anyhow::{Context, Result};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracefab_engine::{Engine, EngineConfig, LogObserver, MetricObserver, StdoutExporter};
use tracefab_topology::TrafficPattern;
use tracing::info;

/// Arguments for the run command.
pub struct RunArgs {
    /// Path to the topology YAML file.
    pub file: String,
    /// Optional wall-clock run length.
    pub duration: Option<Duration>,
    /// RNG seed.
    pub seed: u64,
    /// Replay traces at wall clock.
    pub realtime: bool,
    /// Attach scenario labels to spans.
    pub label_scenarios: bool,
    /// Shift all timestamps this far into the past.
    pub backfill: Option<Duration>,
    /// Per-trace span ceiling.
    pub span_limit: u32,
    /// Warn-log threshold for slow spans.
    pub slow_threshold: Option<Duration>,
}

/// Runs the run command: spans to stdout, final stats JSON to stderr.
pub async fn run(args: RunArgs) -> Result<()> {
    let config = tracefab_config::from_path(&args.file)
        .with_context(|| format!("invalid configuration: {}", args.file))?;
    let topo = tracefab_topology::build(&config)
        .with_context(|| format!("failed to resolve topology: {}", args.file))?;
    let scenarios = tracefab_topology::build_scenarios(&config.scenarios, &topo)
        .with_context(|| format!("failed to resolve scenarios: {}", args.file))?;
    let traffic = config
        .traffic
        .as_ref()
        .map(TrafficPattern::from_config)
        .transpose()
        .with_context(|| format!("failed to resolve traffic pattern: {}", args.file))?
        .unwrap_or_else(|| TrafficPattern::uniform(1.0));

    let mut engine_config = EngineConfig::default()
        .with_seed(args.seed)
        .with_span_limit(args.span_limit);
    if args.realtime {
        engine_config = engine_config.with_realtime();
    }
    if args.label_scenarios {
        engine_config = engine_config.with_scenario_labels();
    }
    if let Some(duration) = args.duration {
        engine_config = engine_config.with_run_duration(duration);
    }
    if let Some(backfill) = args.backfill {
        engine_config = engine_config.with_base_time(SystemTime::now() - backfill);
    }

    let mut engine = Engine::new(topo, traffic, scenarios, engine_config, StdoutExporter::new());
    let mut log_observer = LogObserver::new();
    if let Some(threshold) = args.slow_threshold {
        log_observer = log_observer.with_slow_threshold(threshold);
    }
    engine.add_observer(log_observer);
    engine.add_observer(MetricObserver::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            let _ = shutdown_tx.send(true);
        }
    });

    let stats = engine.run(shutdown_rx).await;

    eprintln!(
        "{}",
        serde_json::to_string_pretty(&stats).context("failed to serialise stats")?
    );
    Ok(())
}
