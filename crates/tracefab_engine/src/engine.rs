//! The trace-generation engine.
//!
//! One engine instance owns the topology, the scenarios, the simulation
//! state and a single seeded RNG. Its driving loop resolves active
//! scenarios at the current elapsed time, walks one trace, and paces the
//! next one by the traffic curve. All walking is synchronous; the only
//! suspension points are the pacing sleep and, in realtime mode, the
//! per-trace emitter tasks.

use crate::emitter::{emit_plan, wait_for_shutdown, SharedExporter, SharedObservers};
use crate::export::{lock, SpanExporter};
use crate::observer::Observer;
use crate::plan::{duration_ns, materialize, trace_id, SpanPlan};
use crate::state::SimulationState;
use crate::stats::{Stats, StatsRecorder};
use crate::walker::{PlanSink, SpanSink, WalkOutcome, WalkParams, Walker, DEFAULT_SPAN_LIMIT};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracefab_topology::{
    active_scenarios, resolve_overrides, resolve_traffic, Scenario, Topology, TrafficPattern,
};

/// How long the loop idles when the traffic curve drops to zero.
const IDLE_INTERVAL: Duration = Duration::from_millis(250);

/// Engine options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Master seed for all randomness.
    pub seed: u64,
    /// Per-trace span ceiling.
    pub span_limit: u32,
    /// Attach `synth.scenarios` labels to spans.
    pub label_scenarios: bool,
    /// Replay each trace at wall clock instead of emitting synthetically.
    pub realtime: bool,
    /// Stop after this much wall-clock time; `None` runs until cancelled.
    pub run_duration: Option<Duration>,
    /// Timestamp anchor for offset zero; defaults to engine start. Setting
    /// it into the past backfills historical traces, and the shift reaches
    /// observer timestamps too.
    pub base_time: Option<SystemTime>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            span_limit: DEFAULT_SPAN_LIMIT,
            label_scenarios: false,
            realtime: false,
            run_duration: None,
            base_time: None,
        }
    }
}

impl EngineConfig {
    /// Sets the RNG seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the per-trace span ceiling.
    #[must_use]
    pub const fn with_span_limit(mut self, limit: u32) -> Self {
        self.span_limit = limit;
        self
    }

    /// Enables scenario labels on spans.
    #[must_use]
    pub const fn with_scenario_labels(mut self) -> Self {
        self.label_scenarios = true;
        self
    }

    /// Enables realtime replay.
    #[must_use]
    pub const fn with_realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Sets the run duration.
    #[must_use]
    pub const fn with_run_duration(mut self, duration: Duration) -> Self {
        self.run_duration = Some(duration);
        self
    }

    /// Sets the timestamp anchor.
    #[must_use]
    pub const fn with_base_time(mut self, base: SystemTime) -> Self {
        self.base_time = Some(base);
        self
    }
}

/// The trace-generation engine.
pub struct Engine {
    topo: Topology,
    traffic: TrafficPattern,
    scenarios: Vec<Scenario>,
    sim: SimulationState,
    rng: ChaCha8Rng,
    config: EngineConfig,
    stats: Arc<StatsRecorder>,
    exporter: SharedExporter,
    observers: SharedObservers,
}

impl Engine {
    /// Creates an engine over a built topology.
    #[must_use]
    pub fn new(
        topo: Topology,
        traffic: TrafficPattern,
        scenarios: Vec<Scenario>,
        config: EngineConfig,
        exporter: impl SpanExporter + 'static,
    ) -> Self {
        let sim = SimulationState::new(&topo);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            topo,
            traffic,
            scenarios,
            sim,
            rng,
            config,
            stats: Arc::new(StatsRecorder::new()),
            exporter: Arc::new(Mutex::new(exporter)),
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers an observer for span fan-out.
    pub fn add_observer(&mut self, observer: impl Observer + 'static) {
        lock(&self.observers).push(Box::new(observer));
    }

    /// The topology this engine runs.
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topo
    }

    /// A snapshot of the accumulated statistics.
    #[must_use]
    pub fn stats(&self, elapsed: Duration) -> Stats {
        self.stats.snapshot(elapsed)
    }

    /// Runs the engine until the configured duration elapses or `shutdown`
    /// signals `true`. Returns the accumulated statistics; cancellation is
    /// not an error.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Stats {
        let anchor = tokio::time::Instant::now();
        let base_epoch_ns = epoch_ns(self.config.base_time.unwrap_or_else(SystemTime::now));
        let mut emitters: Vec<JoinHandle<()>> = Vec::new();

        if self.topo.roots().is_empty() {
            tracing::warn!("topology has no root operations; nothing to generate");
            return self.stats.snapshot(anchor.elapsed());
        }

        tracing::info!(
            realtime = self.config.realtime,
            seed = self.config.seed,
            "engine started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let elapsed = anchor.elapsed();
            if let Some(limit) = self.config.run_duration {
                if elapsed >= limit {
                    break;
                }
            }

            let active = active_scenarios(&self.scenarios, elapsed);
            let rate = resolve_traffic(&active)
                .unwrap_or(&self.traffic)
                .rate(elapsed);
            if rate <= 0.0 {
                let stop = tokio::select! {
                    () = tokio::time::sleep(IDLE_INTERVAL) => false,
                    () = wait_for_shutdown(&mut shutdown) => true,
                };
                if stop {
                    break;
                }
                continue;
            }

            let labels: Vec<String> = active.iter().map(|s| s.name.clone()).collect();
            let overrides = resolve_overrides(&active);

            // One trace. The root pick and the trace id are the only draws
            // outside the walk itself.
            let root = self.topo.roots()[self.rng.gen_range(0..self.topo.roots().len())];
            let trace_seed: u128 = self.rng.gen();
            let trace_hex = trace_id(trace_seed);
            #[allow(clippy::cast_possible_truncation)]
            let span_seed = trace_seed as u64;

            let params = WalkParams {
                overrides: &overrides,
                scenario_labels: &labels,
                label_scenarios: self.config.label_scenarios,
                elapsed,
                span_limit: self.config.span_limit,
            };
            let mut walker = Walker::new(
                &self.topo,
                &mut self.sim,
                &mut self.rng,
                &self.stats,
                params,
            );

            let outcome = if self.config.realtime {
                let mut sink = PlanSink::new();
                let outcome = walker.walk_trace(root, elapsed, &mut sink);
                emitters.push(tokio::spawn(emit_plan(
                    sink.into_plans(),
                    trace_hex,
                    span_seed,
                    base_epoch_ns,
                    anchor,
                    Arc::clone(&self.exporter),
                    Arc::clone(&self.observers),
                    shutdown.clone(),
                )));
                outcome
            } else {
                let mut sink = LiveSink {
                    next: 0,
                    trace_hex: &trace_hex,
                    trace_seed: span_seed,
                    base_epoch_ns,
                    exporter: &self.exporter,
                    observers: &self.observers,
                };
                walker.walk_trace(root, elapsed, &mut sink)
            };
            self.stats.record_trace(outcome.failed, outcome.bounded);
            emitters.retain(|handle| !handle.is_finished());

            let interval = Duration::from_secs_f64(1.0 / rate);
            let stop = tokio::select! {
                () = tokio::time::sleep(interval) => false,
                () = wait_for_shutdown(&mut shutdown) => true,
            };
            if stop {
                break;
            }
        }

        for handle in emitters {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "realtime emitter task failed");
            }
        }

        let stats = self.stats.snapshot(anchor.elapsed());
        tracing::info!(traces = stats.traces, spans = stats.spans, "engine stopped");
        stats
    }

    /// Walks exactly one trace at the given elapsed offset, emitting live.
    ///
    /// Used by tests and callers that drive trace production themselves
    /// instead of running the paced loop.
    pub fn emit_one(&mut self, elapsed: Duration) -> WalkOutcome {
        let base_epoch_ns = epoch_ns(self.config.base_time.unwrap_or_else(SystemTime::now));
        let active = active_scenarios(&self.scenarios, elapsed);
        let labels: Vec<String> = active.iter().map(|s| s.name.clone()).collect();
        let overrides = resolve_overrides(&active);

        let root = self.topo.roots()[self.rng.gen_range(0..self.topo.roots().len())];
        let trace_seed: u128 = self.rng.gen();
        let trace_hex = trace_id(trace_seed);
        #[allow(clippy::cast_possible_truncation)]
        let span_seed = trace_seed as u64;

        let params = WalkParams {
            overrides: &overrides,
            scenario_labels: &labels,
            label_scenarios: self.config.label_scenarios,
            elapsed,
            span_limit: self.config.span_limit,
        };
        let mut walker = Walker::new(
            &self.topo,
            &mut self.sim,
            &mut self.rng,
            &self.stats,
            params,
        );
        let mut sink = LiveSink {
            next: 0,
            trace_hex: &trace_hex,
            trace_seed: span_seed,
            base_epoch_ns,
            exporter: &self.exporter,
            observers: &self.observers,
        };
        let outcome = walker.walk_trace(root, elapsed, &mut sink);
        self.stats.record_trace(outcome.failed, outcome.bounded);
        outcome
    }
}

/// Emits spans the moment the walk completes them, children before parents.
struct LiveSink<'a> {
    next: usize,
    trace_hex: &'a str,
    trace_seed: u64,
    base_epoch_ns: u64,
    exporter: &'a SharedExporter,
    observers: &'a SharedObservers,
}

impl SpanSink for LiveSink<'_> {
    fn reserve(&mut self) -> usize {
        let index = self.next;
        self.next += 1;
        index
    }

    fn complete(&mut self, plan: SpanPlan) {
        let span = materialize(&plan, self.trace_hex, self.trace_seed, self.base_epoch_ns);
        let info = crate::emitter::span_info(&plan, &span);
        for observer in lock(self.observers).iter_mut() {
            observer.on_span(&info);
        }
        lock(self.exporter).export(span);
    }
}

/// Nanoseconds since the Unix epoch, saturating for pre-epoch anchors.
fn epoch_ns(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(duration_ns)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemoryExporter;
    use crate::observer::RecordingObserver;
    use std::collections::HashSet;

    const TOPOLOGY: &str = r#"
services:
  frontend:
    operations:
      request:
        duration: 10ms +/- 2ms
        error_rate: "5%"
        calls:
          - target: "backend.handle"
  backend:
    operations:
      handle:
        duration: 5ms +/- 1ms
        calls:
          - target: "db.query"
            count: 2
  db:
    operations:
      query:
        duration: 2ms
"#;

    fn build_engine(config: EngineConfig, exporter: InMemoryExporter) -> Engine {
        let cfg = tracefab_config::from_str(TOPOLOGY).unwrap();
        let topo = tracefab_topology::build(&cfg).unwrap();
        let scenarios = tracefab_topology::build_scenarios(&cfg.scenarios, &topo).unwrap();
        Engine::new(
            topo,
            TrafficPattern::uniform(20.0),
            scenarios,
            config,
            exporter,
        )
    }

    #[test]
    fn emit_one_exports_all_spans_of_the_trace() {
        let exporter = InMemoryExporter::new();
        let recorder = RecordingObserver::new();
        let mut engine = build_engine(EngineConfig::default(), exporter.clone());
        engine.add_observer(recorder.clone());

        let outcome = engine.emit_one(Duration::ZERO);
        assert_eq!(exporter.len() as u32, outcome.spans);
        assert_eq!(recorder.len() as u32, outcome.spans);

        let spans = exporter.snapshot();
        let trace_ids: HashSet<_> = spans.iter().map(|s| s.trace_id.clone()).collect();
        assert_eq!(trace_ids.len(), 1, "all spans share one trace id");
        assert_eq!(spans.iter().filter(|s| s.is_root()).count(), 1);
    }

    #[test]
    fn same_seed_same_trace_shape() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let run = |seed: u64| {
            let exporter = InMemoryExporter::new();
            let mut engine = build_engine(
                EngineConfig::default().with_seed(seed).with_base_time(base),
                exporter.clone(),
            );
            engine.emit_one(Duration::ZERO);
            exporter.snapshot()
        };
        let a = run(7);
        let b = run(7);
        assert_eq!(a, b);

        let c = run(8);
        assert_ne!(a, c);
    }

    #[test]
    fn live_and_plan_walks_are_equivalent() {
        // Drive the same seed through the live sink and the plan sink; the
        // materialised spans must be identical, byte for byte.
        let cfg = tracefab_config::from_str(TOPOLOGY).unwrap();
        let topo = tracefab_topology::build(&cfg).unwrap();
        let base_time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let live_exporter = InMemoryExporter::new();
        let mut live_engine = Engine::new(
            tracefab_topology::build(&cfg).unwrap(),
            TrafficPattern::uniform(1.0),
            Vec::new(),
            EngineConfig::default().with_seed(11).with_base_time(base_time),
            live_exporter.clone(),
        );
        live_engine.emit_one(Duration::ZERO);

        // Planner path with the identical RNG stream.
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut sim = SimulationState::new(&topo);
        let stats = StatsRecorder::new();
        let root = topo.roots()[rng.gen_range(0..topo.roots().len())];
        let trace_seed: u128 = rng.gen();
        let overrides = BTreeMap::new();
        let labels: Vec<String> = Vec::new();
        let mut walker = Walker::new(
            &topo,
            &mut sim,
            &mut rng,
            &stats,
            WalkParams {
                overrides: &overrides,
                scenario_labels: &labels,
                label_scenarios: false,
                elapsed: Duration::ZERO,
                span_limit: DEFAULT_SPAN_LIMIT,
            },
        );
        let mut sink = PlanSink::new();
        walker.walk_trace(root, Duration::ZERO, &mut sink);

        let trace_hex = trace_id(trace_seed);
        #[allow(clippy::cast_possible_truncation)]
        let span_seed = trace_seed as u64;
        let mut planned: Vec<_> = sink
            .into_plans()
            .iter()
            .map(|p| materialize(p, &trace_hex, span_seed, epoch_ns(base_time)))
            .collect();

        let mut live = live_exporter.snapshot();
        planned.sort_by(|a, b| a.span_id.cmp(&b.span_id));
        live.sort_by(|a, b| a.span_id.cmp(&b.span_id));
        assert_eq!(planned, live);
    }

    #[tokio::test(start_paused = true)]
    async fn run_paces_by_rate_and_honours_duration() {
        let exporter = InMemoryExporter::new();
        let mut engine = build_engine(
            EngineConfig::default().with_run_duration(Duration::from_secs(1)),
            exporter.clone(),
        );
        let (_tx, rx) = watch::channel(false);
        let stats = engine.run(rx).await;

        // 20/s over 1s of virtual time.
        assert!(stats.traces >= 15, "traces = {}", stats.traces);
        assert!(stats.traces <= 25, "traces = {}", stats.traces);
        assert_eq!(exporter.len() as u64, stats.spans);
        assert!(stats.spans >= stats.traces * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown_with_partial_stats() {
        let exporter = InMemoryExporter::new();
        let mut engine = build_engine(EngineConfig::default(), exporter.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { engine.run(rx).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).expect("engine alive");
        let stats = handle.await.expect("engine completes");

        assert!(stats.traces > 0);
        assert_eq!(exporter.len() as u64, stats.spans);
    }

    #[tokio::test(start_paused = true)]
    async fn realtime_mode_replays_every_planned_span() {
        let exporter = InMemoryExporter::new();
        let mut engine = build_engine(
            EngineConfig::default()
                .with_realtime()
                .with_run_duration(Duration::from_millis(500)),
            exporter.clone(),
        );
        let (_tx, rx) = watch::channel(false);
        let stats = engine.run(rx).await;

        assert!(stats.traces > 0);
        // Every planned span is eventually replayed and exported.
        assert_eq!(exporter.len() as u64, stats.spans);
        assert!(exporter.snapshot().iter().all(|s| s.end_time_ns >= s.start_time_ns));
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_traffic_override_drives_pacing() {
        let yaml = r#"
services:
  api:
    operations:
      ping:
        duration: 1ms
traffic:
  rate: 2/s
scenarios:
  - name: surge
    at: "+0s"
    duration: 10m
    priority: 1
    traffic:
      rate: 50/s
"#;
        let cfg = tracefab_config::from_str(yaml).unwrap();
        let topo = tracefab_topology::build(&cfg).unwrap();
        let scenarios = tracefab_topology::build_scenarios(&cfg.scenarios, &topo).unwrap();
        let traffic =
            TrafficPattern::from_config(cfg.traffic.as_ref().unwrap()).unwrap();

        let exporter = InMemoryExporter::new();
        let mut engine = Engine::new(
            topo,
            traffic,
            scenarios,
            EngineConfig::default().with_run_duration(Duration::from_secs(1)),
            exporter,
        );
        let (_tx, rx) = watch::channel(false);
        let stats = engine.run(rx).await;

        // The scenario's 50/s replaces the base 2/s while active.
        assert!(stats.traces >= 40, "traces = {}", stats.traces);
    }

    #[test]
    fn active_scenario_labels_reach_spans() {
        let yaml = r#"
services:
  api:
    operations:
      ping:
        duration: 1ms
scenarios:
  - name: brownout
    at: "+0s"
    duration: 10m
    override:
      "api.ping":
        error_rate: "100%"
"#;
        let cfg = tracefab_config::from_str(yaml).unwrap();
        let topo = tracefab_topology::build(&cfg).unwrap();
        let scenarios = tracefab_topology::build_scenarios(&cfg.scenarios, &topo).unwrap();

        let exporter = InMemoryExporter::new();
        let mut engine = Engine::new(
            topo,
            TrafficPattern::uniform(1.0),
            scenarios,
            EngineConfig::default().with_scenario_labels(),
            exporter.clone(),
        );
        let outcome = engine.emit_one(Duration::from_secs(1));
        assert!(outcome.failed, "override forces an error");

        let spans = exporter.snapshot();
        let label = spans[0]
            .attribute("synth.scenarios")
            .expect("scenario label attached");
        assert_eq!(label.as_string(), "brownout");
        assert!(spans[0].is_error());
        assert_eq!(
            spans[0].status.message.as_deref(),
            Some(crate::plan::SYNTHETIC_ERROR)
        );
    }

    #[test]
    fn backfill_base_time_shifts_all_timestamps() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let exporter = InMemoryExporter::new();
        let recorder = RecordingObserver::new();
        let mut engine = build_engine(
            EngineConfig::default().with_base_time(base),
            exporter.clone(),
        );
        engine.add_observer(recorder.clone());
        engine.emit_one(Duration::from_secs(5));

        let expected_floor = 1_000_000u64 * 1_000_000_000 + 5_000_000_000;
        for span in exporter.snapshot() {
            assert!(span.start_time_ns >= expected_floor);
            assert!(span.start_time_ns < expected_floor + 10_000_000_000);
        }
        // Observer timestamps carry the same shift.
        for info in recorder.snapshot() {
            assert!(info.timestamp >= base);
        }
    }
}
