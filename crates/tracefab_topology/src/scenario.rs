//! Time-windowed scenarios.
//!
//! A scenario is active during `[start, end)` and contributes per-operation
//! overrides plus an optional traffic pattern. Overlapping scenarios merge
//! in priority order: later (higher-priority) non-empty fields win, absent
//! fields preserve earlier values, attribute maps merge key-by-key, and
//! call changes compose.

use crate::error::{Error, Result};
use crate::graph::{Call, Topology};
use crate::traffic::TrafficPattern;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracefab_config::{parse_offset, ScenarioConfig};
use tracefab_model::{parse_duration, parse_error_rate, AttrGenerator, Distribution};

/// A per-operation patch applied while its scenario is active.
#[derive(Debug, Default)]
pub struct Override {
    /// Replacement duration distribution, when present.
    pub duration: Option<Distribution>,
    /// Replacement error rate, when present. `Some(0.0)` is meaningful.
    pub error_rate: Option<f64>,
    /// Attribute generators merged over the operation's own.
    pub attributes: BTreeMap<String, AttrGenerator>,
    /// Calls appended to the operation's call list.
    pub add_calls: Vec<Call>,
    /// Call target refs filtered out of the operation's call list.
    pub remove_calls: BTreeSet<String>,
}

/// A named, time-windowed override set resolved against the topology.
#[derive(Debug)]
pub struct Scenario {
    /// Scenario name, also used for span labelling.
    pub name: String,
    /// Activation offset relative to engine start.
    pub start: Duration,
    /// Deactivation offset; the window is half-open `[start, end)`.
    pub end: Duration,
    /// Merge priority; higher priorities apply later and win conflicts.
    pub priority: i32,
    /// Traffic pattern replacing the base one while active.
    pub traffic: Option<TrafficPattern>,
    /// Per-operation overrides keyed by canonical `service.operation` ref.
    pub overrides: BTreeMap<String, Override>,
}

impl Scenario {
    /// Whether the scenario is active at the given elapsed time.
    #[must_use]
    pub fn is_active(&self, elapsed: Duration) -> bool {
        elapsed >= self.start && elapsed < self.end
    }
}

/// The merged view of every active override for one operation.
///
/// Borrows attribute generators from the scenarios it was merged from; the
/// input scenarios are never mutated.
#[derive(Debug, Default)]
pub struct MergedOverride<'a> {
    /// Effective replacement duration.
    pub duration: Option<Distribution>,
    /// Effective replacement error rate.
    pub error_rate: Option<f64>,
    /// Effective attribute generators, later scenarios winning per key.
    pub attributes: BTreeMap<&'a str, &'a AttrGenerator>,
    /// Concatenated added calls.
    pub add_calls: Vec<Call>,
    /// Union of removed call target refs.
    pub remove_calls: BTreeSet<&'a str>,
}

impl MergedOverride<'_> {
    /// Whether the override changes the effective call list.
    #[must_use]
    pub fn has_call_changes(&self) -> bool {
        !self.add_calls.is_empty() || !self.remove_calls.is_empty()
    }
}

/// Resolves scenario configs against the topology.
///
/// # Errors
///
/// Returns an error on unknown operation refs or unparseable fields.
pub fn build_scenarios(configs: &[ScenarioConfig], topo: &Topology) -> Result<Vec<Scenario>> {
    configs.iter().map(|cfg| build_scenario(cfg, topo)).collect()
}

fn build_scenario(cfg: &ScenarioConfig, topo: &Topology) -> Result<Scenario> {
    let scenario_err = |reason: String| Error::Scenario {
        scenario: cfg.name.clone(),
        reason,
    };

    let start = parse_offset(&cfg.at).map_err(|e| scenario_err(e.to_string()))?;
    let length = parse_duration(&cfg.duration).map_err(|e| scenario_err(e.to_string()))?;

    let traffic = cfg
        .traffic
        .as_ref()
        .map(TrafficPattern::from_config)
        .transpose()?;

    let mut overrides = BTreeMap::new();
    for (op_ref, ov_cfg) in &cfg.overrides {
        let Some(id) = topo.resolve(op_ref) else {
            return Err(Error::UnknownScenarioRef {
                scenario: cfg.name.clone(),
                op_ref: op_ref.clone(),
            });
        };
        let canonical = topo.op(id).op_ref.clone();

        let duration = ov_cfg
            .duration
            .as_deref()
            .map(Distribution::parse)
            .transpose()
            .map_err(|e| scenario_err(e.to_string()))?;
        let error_rate = ov_cfg
            .error_rate
            .as_deref()
            .map(parse_error_rate)
            .transpose()
            .map_err(|e| scenario_err(e.to_string()))?;

        let mut attributes = BTreeMap::new();
        for (key, attr_cfg) in &ov_cfg.attributes {
            let generator = crate::build::build_attr_generator(attr_cfg)
                .map_err(|e| scenario_err(format!("attribute '{key}': {e}")))?;
            attributes.insert(key.clone(), generator);
        }

        let add_calls = ov_cfg
            .add_calls
            .iter()
            .map(|call_cfg| topo.resolve_call(&canonical, call_cfg))
            .collect::<Result<Vec<_>>>()?;

        let mut remove_calls = BTreeSet::new();
        for target in &ov_cfg.remove_calls {
            let Some(removed) = topo.resolve(target) else {
                return Err(Error::UnknownScenarioRef {
                    scenario: cfg.name.clone(),
                    op_ref: target.clone(),
                });
            };
            remove_calls.insert(topo.op(removed).op_ref.clone());
        }

        overrides.insert(
            canonical,
            Override {
                duration,
                error_rate,
                attributes,
                add_calls,
                remove_calls,
            },
        );
    }

    Ok(Scenario {
        name: cfg.name.clone(),
        start,
        end: start + length,
        priority: cfg.priority,
        traffic,
        overrides,
    })
}

/// Returns the scenarios active at `elapsed`, sorted by priority ascending.
///
/// The sort is stable, so equal priorities keep declaration order, and
/// repeated calls return the identical sequence. Inputs are borrowed, never
/// mutated.
#[must_use]
pub fn active_scenarios(scenarios: &[Scenario], elapsed: Duration) -> Vec<&Scenario> {
    let mut active: Vec<&Scenario> = scenarios.iter().filter(|s| s.is_active(elapsed)).collect();
    active.sort_by_key(|s| s.priority);
    active
}

/// Folds the active scenarios into one merged override per operation ref.
///
/// Later scenarios in the (priority-ascending) input replace scalar fields
/// they set, merge attribute maps key-by-key, append their added calls and
/// union their removed refs. Input scenarios are not mutated.
#[must_use]
pub fn resolve_overrides<'a>(active: &[&'a Scenario]) -> BTreeMap<&'a str, MergedOverride<'a>> {
    let mut merged: BTreeMap<&str, MergedOverride<'_>> = BTreeMap::new();

    for scenario in active {
        for (op_ref, ov) in &scenario.overrides {
            let entry = merged.entry(op_ref.as_str()).or_default();
            if let Some(duration) = ov.duration {
                entry.duration = Some(duration);
            }
            if let Some(error_rate) = ov.error_rate {
                entry.error_rate = Some(error_rate);
            }
            for (key, generator) in &ov.attributes {
                entry.attributes.insert(key.as_str(), generator);
            }
            entry.add_calls.extend(ov.add_calls.iter().copied());
            entry
                .remove_calls
                .extend(ov.remove_calls.iter().map(String::as_str));
        }
    }

    merged
}

/// The traffic pattern of the last active scenario that carries one.
#[must_use]
pub fn resolve_traffic<'a>(active: &[&'a Scenario]) -> Option<&'a TrafficPattern> {
    active.iter().rev().find_map(|s| s.traffic.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;

    fn topo() -> Topology {
        let config = tracefab_config::from_str(
            r#"
services:
  api:
    operations:
      root:
        duration: 10ms
        calls:
          - target: "db.query"
  db:
    operations:
      query:
        duration: 5ms
  cache:
    operations:
      get:
        duration: 1ms
"#,
        )
        .unwrap();
        build(&config).unwrap()
    }

    fn scenarios_from(yaml: &str, topo: &Topology) -> Vec<Scenario> {
        let configs: Vec<ScenarioConfig> = serde_yaml::from_str(yaml).unwrap();
        build_scenarios(&configs, topo).unwrap()
    }

    const OVERLAPPING: &str = r#"
- name: low
  at: "+1m"
  duration: 10m
  priority: 1
  override:
    "api.root":
      duration: 100ms
      error_rate: "10%"
- name: high
  at: "+5m"
  duration: 10m
  priority: 5
  override:
    "api.root":
      duration: 500ms
"#;

    #[test]
    fn window_is_half_open() {
        let topo = topo();
        let scenarios = scenarios_from(OVERLAPPING, &topo);
        let low = &scenarios[0];
        assert!(!low.is_active(Duration::from_secs(59)));
        assert!(low.is_active(Duration::from_secs(60)));
        assert!(low.is_active(Duration::from_secs(659)));
        assert!(!low.is_active(Duration::from_secs(660)));
    }

    #[test]
    fn active_sorted_by_priority_ascending() {
        let topo = topo();
        let mut scenarios = scenarios_from(OVERLAPPING, &topo);
        // Reverse declaration order so sorting is observable.
        scenarios.reverse();
        let active = active_scenarios(&scenarios, Duration::from_secs(360));
        let names: Vec<_> = active.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["low", "high"]);
    }

    #[test]
    fn active_is_deterministic_and_stable() {
        let topo = topo();
        let scenarios = scenarios_from(
            r#"
- name: first
  at: "+0s"
  duration: 10m
  priority: 3
- name: second
  at: "+0s"
  duration: 10m
  priority: 3
"#,
            &topo,
        );
        for _ in 0..5 {
            let active = active_scenarios(&scenarios, Duration::from_secs(1));
            let names: Vec<_> = active.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, vec!["first", "second"]);
        }
    }

    #[test]
    fn later_scenario_wins_scalars_absent_preserves() {
        let topo = topo();
        let scenarios = scenarios_from(OVERLAPPING, &topo);
        let active = active_scenarios(&scenarios, Duration::from_secs(360));
        let merged = resolve_overrides(&active);
        let ov = &merged["api.root"];
        // "high" replaced the duration but set no error rate, so "low"'s
        // error rate survives.
        assert_eq!(ov.duration.unwrap().mean, Duration::from_millis(500));
        assert!((ov.error_rate.unwrap() - 0.10).abs() < f64::EPSILON);
    }

    #[test]
    fn attribute_maps_merge_key_by_key() {
        let topo = topo();
        let scenarios = scenarios_from(
            r#"
- name: one
  at: "+0s"
  duration: 10m
  priority: 1
  override:
    "api.root":
      attributes:
        shared: { value: from-one }
        only_one: { value: alpha }
- name: two
  at: "+0s"
  duration: 10m
  priority: 2
  override:
    "api.root":
      attributes:
        shared: { value: from-two }
        only_two: { value: beta }
"#,
            &topo,
        );
        let active = active_scenarios(&scenarios, Duration::ZERO);
        let merged = resolve_overrides(&active);
        let attrs = &merged["api.root"].attributes;
        assert_eq!(attrs.len(), 3);
        let mut rng = rand::thread_rng();
        assert_eq!(attrs["shared"].generate(&mut rng).as_string(), "from-two");
        assert_eq!(attrs["only_one"].generate(&mut rng).as_string(), "alpha");
    }

    #[test]
    fn call_changes_compose() {
        let topo = topo();
        let scenarios = scenarios_from(
            r#"
- name: one
  at: "+0s"
  duration: 10m
  priority: 1
  override:
    "api.root":
      add_calls:
        - target: "cache.get"
      remove_calls: ["db.query"]
- name: two
  at: "+0s"
  duration: 10m
  priority: 2
  override:
    "api.root":
      add_calls:
        - target: "db.query"
"#,
            &topo,
        );
        let active = active_scenarios(&scenarios, Duration::ZERO);
        let merged = resolve_overrides(&active);
        let ov = &merged["api.root"];
        assert!(ov.has_call_changes());
        assert_eq!(ov.add_calls.len(), 2);
        assert!(ov.remove_calls.contains("db.query"));
    }

    #[test]
    fn resolve_does_not_mutate_inputs() {
        let topo = topo();
        let scenarios = scenarios_from(OVERLAPPING, &topo);
        let before: Vec<_> = scenarios
            .iter()
            .map(|s| (s.overrides["api.root"].duration, s.overrides["api.root"].error_rate))
            .collect();

        let active = active_scenarios(&scenarios, Duration::from_secs(360));
        let _ = resolve_overrides(&active);
        let _ = resolve_overrides(&active);

        let after: Vec<_> = scenarios
            .iter()
            .map(|s| (s.overrides["api.root"].duration, s.overrides["api.root"].error_rate))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn resolve_traffic_picks_last_in_priority_order() {
        let topo = topo();
        let scenarios = scenarios_from(
            r#"
- name: low
  at: "+0s"
  duration: 10m
  priority: 1
  traffic:
    rate: 5/s
- name: high
  at: "+0s"
  duration: 10m
  priority: 9
  traffic:
    rate: 50/s
- name: highest-no-traffic
  at: "+0s"
  duration: 10m
  priority: 10
"#,
            &topo,
        );
        let active = active_scenarios(&scenarios, Duration::ZERO);
        let traffic = resolve_traffic(&active).unwrap();
        assert!((traffic.rate(Duration::ZERO) - 50.0).abs() < f64::EPSILON);

        assert!(resolve_traffic(&[]).is_none());
    }

    #[test]
    fn unknown_ref_rejected() {
        let topo = topo();
        let configs: Vec<ScenarioConfig> = serde_yaml::from_str(
            r#"
- name: broken
  at: "+0s"
  duration: 1m
  override:
    "ghost.op":
      duration: 1ms
"#,
        )
        .unwrap();
        let err = build_scenarios(&configs, &topo).unwrap_err();
        assert!(matches!(err, Error::UnknownScenarioRef { .. }), "{err}");
    }

    proptest::proptest! {
        // Activation over arbitrary windows: exactly the scenarios whose
        // half-open window contains t, in priority-ascending order.
        #[test]
        fn activation_windows_and_order(
            windows in proptest::collection::vec((0u64..600, 1u64..600, -5i32..5), 1..8),
            t in 0u64..1200,
        ) {
            let scenarios: Vec<Scenario> = windows
                .iter()
                .enumerate()
                .map(|(i, &(at, len, priority))| Scenario {
                    name: format!("s{i}"),
                    start: Duration::from_secs(at),
                    end: Duration::from_secs(at + len),
                    priority,
                    traffic: None,
                    overrides: BTreeMap::new(),
                })
                .collect();

            let elapsed = Duration::from_secs(t);
            let active = active_scenarios(&scenarios, elapsed);

            for scenario in &scenarios {
                let contained = elapsed >= scenario.start && elapsed < scenario.end;
                let listed = active.iter().any(|a| a.name == scenario.name);
                proptest::prop_assert_eq!(contained, listed);
            }
            proptest::prop_assert!(active.windows(2).all(|w| w[0].priority <= w[1].priority));

            // Repeated resolution returns the identical order.
            let again = active_scenarios(&scenarios, elapsed);
            let names: Vec<_> = active.iter().map(|s| s.name.as_str()).collect();
            let names_again: Vec<_> = again.iter().map(|s| s.name.as_str()).collect();
            proptest::prop_assert_eq!(names, names_again);
        }
    }

    #[test]
    fn inactive_scenarios_resolve_to_empty() {
        let topo = topo();
        let scenarios = scenarios_from(OVERLAPPING, &topo);
        let active = active_scenarios(&scenarios, Duration::ZERO);
        assert!(active.is_empty());
        assert!(resolve_overrides(&active).is_empty());
    }
}
