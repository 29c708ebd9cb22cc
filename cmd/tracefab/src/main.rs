//! Tracefab CLI - synthetic distributed-tracing telemetry generator.
//!
//! Commands:
//! - `tracefab validate` - Check a topology config and exit 0/1
//! - `tracefab run` - Generate traces to stdout, stats to stderr
//! - `tracefab check` - Verify structural bounds against limits
//! - `tracefab init` - Scaffold a starter topology

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tracefab")]
#[command(about = "Synthetic distributed-tracing telemetry generator")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a topology config file
    Validate {
        /// Path to the topology YAML file
        #[arg(default_value = "topology.yaml")]
        file: String,
    },

    /// Generate traces from a topology config
    Run {
        /// Path to the topology YAML file
        #[arg(default_value = "topology.yaml")]
        file: String,

        /// Stop after this long (e.g. "30s", "5m"); runs until ctrl-c when
        /// absent
        #[arg(short, long)]
        duration: Option<humantime::Duration>,

        /// RNG seed; the same seed reproduces the same traces
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Replay each trace at wall-clock times instead of emitting
        /// immediately with synthetic timestamps
        #[arg(long)]
        realtime: bool,

        /// Attach active scenario names to spans
        #[arg(long)]
        label_scenarios: bool,

        /// Shift all emitted timestamps this far into the past
        #[arg(long)]
        backfill: Option<humantime::Duration>,

        /// Per-trace span ceiling
        #[arg(long, default_value_t = tracefab_engine::DEFAULT_SPAN_LIMIT)]
        span_limit: u32,

        /// Log spans slower than this as warnings (e.g. "500ms")
        #[arg(long)]
        slow_threshold: Option<humantime::Duration>,
    },

    /// Check structural bounds against limits
    Check {
        /// Path to the topology YAML file
        #[arg(default_value = "topology.yaml")]
        file: String,

        /// Maximum allowed call depth
        #[arg(long)]
        max_depth: Option<u32>,

        /// Maximum allowed per-operation fan-out
        #[arg(long)]
        max_fan_out: Option<u64>,

        /// Maximum allowed spans per trace
        #[arg(long)]
        max_spans: Option<u64>,

        /// Also sample this many walks and report the observed structure
        #[arg(long, default_value_t = 0)]
        samples: usize,

        /// RNG seed for sampling
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Initialize a new Tracefab project
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for span output.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { file } => commands::validate::run(&file),
        Commands::Run {
            file,
            duration,
            seed,
            realtime,
            label_scenarios,
            backfill,
            span_limit,
            slow_threshold,
        } => {
            commands::run::run(commands::run::RunArgs {
                file,
                duration: duration.map(|d| *d),
                seed,
                realtime,
                label_scenarios,
                backfill: backfill.map(|d| *d),
                span_limit,
                slow_threshold: slow_threshold.map(|d| *d),
            })
            .await
        }
        Commands::Check {
            file,
            max_depth,
            max_fan_out,
            max_spans,
            samples,
            seed,
        } => commands::check::run(
            &file,
            tracefab_analysis::Limits {
                max_depth,
                max_fan_out,
                max_spans,
            },
            samples,
            seed,
        ),
        Commands::Init { path } => commands::init::run(&path),
    }
}
