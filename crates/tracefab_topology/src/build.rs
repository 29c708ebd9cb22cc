//! Topology construction from a validated configuration.
//!
//! Two passes: create every service and operation (parsing durations, error
//! rates and attribute generators), then resolve call targets to arena
//! indices. Construction fails on unknown references and on any cycle.

use crate::error::{Error, Result};
use crate::graph::{
    BackpressureParams, Call, CallCondition, CircuitBreakerParams, OpId, Operation, Service,
    Topology,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracefab_config::{AttributeValueConfig, CallConfig, Config, RangeConfig, StaticValueConfig};
use tracefab_model::{parse_duration, parse_error_rate, AttrGenerator, AttributeValue, Distribution};

/// Builds the resolved topology from a validated configuration.
///
/// # Errors
///
/// Returns an error on unknown call targets, unparseable fields, or a cycle
/// in the call graph.
pub fn build(config: &Config) -> Result<Topology> {
    // Pass 1: create services and operations; the arena order is the sorted
    // (service, operation) order of the config maps.
    let mut services: BTreeMap<String, Service> = BTreeMap::new();
    let mut ops: Vec<Operation> = Vec::new();

    for (service_name, service_cfg) in &config.services {
        let mut operations = BTreeMap::new();
        for (op_name, op_cfg) in &service_cfg.operations {
            let op_ref = format!("{service_name}.{op_name}");
            let id = OpId(ops.len());

            let duration = Distribution::parse(&op_cfg.duration)
                .map_err(|source| Error::Operation { op_ref: op_ref.clone(), source })?;
            let error_rate = match &op_cfg.error_rate {
                Some(rate) => parse_error_rate(rate)
                    .map_err(|source| Error::Operation { op_ref: op_ref.clone(), source })?,
                None => 0.0,
            };

            let mut attributes = BTreeMap::new();
            for (key, attr_cfg) in &op_cfg.attributes {
                let generator = build_attr_generator(attr_cfg)
                    .map_err(|source| Error::Operation { op_ref: op_ref.clone(), source })?;
                attributes.insert(key.clone(), generator);
            }

            let backpressure = op_cfg
                .backpressure
                .as_ref()
                .map(|bp| {
                    Ok(BackpressureParams {
                        latency_threshold: parse_duration(&bp.latency_threshold)?,
                        duration_multiplier: bp.duration_multiplier,
                        error_rate_add: bp.error_rate_add,
                    })
                })
                .transpose()
                .map_err(|source| Error::Operation { op_ref: op_ref.clone(), source })?;

            let circuit_breaker = op_cfg
                .circuit_breaker
                .as_ref()
                .map(|cb| {
                    Ok(CircuitBreakerParams {
                        failure_threshold: cb.failure_threshold,
                        window: parse_duration(&cb.window)?,
                        cooldown: parse_duration(&cb.cooldown)?,
                    })
                })
                .transpose()
                .map_err(|source| Error::Operation { op_ref: op_ref.clone(), source })?;

            ops.push(Operation {
                service: service_name.clone(),
                name: op_name.clone(),
                op_ref,
                duration,
                error_rate,
                call_style: op_cfg.call_style.into(),
                calls: Vec::new(),
                attributes,
                queue_depth: op_cfg.queue_depth,
                backpressure,
                circuit_breaker,
            });
            operations.insert(op_name.clone(), id);
        }

        services.insert(
            service_name.clone(),
            Service {
                name: service_name.clone(),
                attributes: service_cfg.attributes.clone(),
                operations,
            },
        );
    }

    let op_count = ops.len();
    let mut topo = Topology {
        services,
        ops,
        roots: Vec::new(),
        root_flags: vec![false; op_count],
    };

    // Pass 2: resolve call targets against the completed arena.
    let mut resolved_calls: Vec<Vec<Call>> = Vec::with_capacity(op_count);
    for id in 0..op_count {
        let op_cfg = &config.services[&topo.ops[id].service].operations[&topo.ops[id].name];
        let from = topo.ops[id].op_ref.clone();
        let calls = op_cfg
            .calls
            .iter()
            .map(|call_cfg| topo.resolve_call(&from, call_cfg))
            .collect::<Result<Vec<_>>>()?;
        resolved_calls.push(calls);
    }
    for (id, calls) in resolved_calls.into_iter().enumerate() {
        topo.ops[id].calls = calls;
    }

    detect_cycles(&topo)?;

    // Roots: operations never referenced as a call target. Arena order is
    // already sorted by (service, operation), so the collected ids are too.
    let mut called = vec![false; op_count];
    for op in &topo.ops {
        for call in &op.calls {
            called[call.target.0] = true;
        }
    }
    topo.roots = (0..op_count).filter(|&i| !called[i]).map(OpId).collect();
    topo.root_flags = called.iter().map(|&c| !c).collect();

    tracing::debug!(
        services = topo.services.len(),
        operations = op_count,
        roots = topo.roots.len(),
        "topology built"
    );

    Ok(topo)
}

impl Topology {
    /// Resolves one call config against the arena.
    pub(crate) fn resolve_call(&self, from: &str, cfg: &CallConfig) -> Result<Call> {
        let Some((service, operation)) = cfg.target.split_once('.') else {
            return Err(Error::MalformedRef {
                from: from.to_string(),
                target: cfg.target.clone(),
            });
        };
        let Some(service) = self.services.get(service) else {
            return Err(Error::UnknownService {
                from: from.to_string(),
                target: cfg.target.clone(),
            });
        };
        let Some(&target) = service.operations.get(operation) else {
            return Err(Error::UnknownOperation {
                from: from.to_string(),
                target: cfg.target.clone(),
            });
        };

        let timeout = match &cfg.timeout {
            Some(t) => parse_duration(t)
                .map_err(|source| Error::Operation { op_ref: from.to_string(), source })?,
            None => Duration::ZERO,
        };
        let retry_backoff = match &cfg.retry_backoff {
            Some(b) => parse_duration(b)
                .map_err(|source| Error::Operation { op_ref: from.to_string(), source })?,
            None => Duration::ZERO,
        };

        let condition = match cfg.condition.as_deref() {
            None | Some("") => CallCondition::Always,
            Some("on-error") => CallCondition::OnError,
            Some("on-success") => CallCondition::OnSuccess,
            Some(other) => {
                return Err(Error::InvalidCall {
                    from: from.to_string(),
                    reason: format!("unknown call condition '{other}'"),
                })
            }
        };

        Ok(Call {
            target,
            probability: cfg.probability,
            condition,
            count: cfg.count.unwrap_or(1).max(1),
            timeout,
            retries: cfg.retries,
            retry_backoff,
            is_async: cfg.is_async,
        })
    }
}

/// Builds one attribute generator from its config union.
pub(crate) fn build_attr_generator(
    cfg: &AttributeValueConfig,
) -> tracefab_model::Result<AttrGenerator> {
    if let Some(value) = &cfg.value {
        let value = match value {
            StaticValueConfig::Bool(b) => AttributeValue::Bool(*b),
            StaticValueConfig::Int(i) => AttributeValue::Int(*i),
            StaticValueConfig::Float(f) => AttributeValue::Float(*f),
            StaticValueConfig::String(s) => AttributeValue::String(s.clone()),
        };
        return Ok(AttrGenerator::Static(value));
    }
    if let Some(values) = &cfg.values {
        return AttrGenerator::weighted(
            values.iter().map(|(v, w)| (v.clone(), *w)).collect(),
        );
    }
    if let Some(sequence) = &cfg.sequence {
        return AttrGenerator::sequence(sequence.clone());
    }
    if let Some(probability) = cfg.probability {
        return AttrGenerator::bool_with(probability);
    }
    if let Some(range) = &cfg.range {
        return match range {
            RangeConfig::Int([min, max]) => AttrGenerator::int_range(*min, *max),
            RangeConfig::Float([min, max]) => AttrGenerator::float_range(*min, *max),
        };
    }
    if let Some(dist) = &cfg.distribution {
        return AttrGenerator::normal(dist.mean, dist.stddev);
    }
    Err(tracefab_model::Error::InvalidGenerator(
        "exactly one of value, values, sequence, probability, range, distribution must be set"
            .to_string(),
    ))
}

/// Three-colour DFS cycle detection over every operation.
fn detect_cycles(topo: &Topology) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Colour {
        White,
        Grey,
        Black,
    }

    fn visit(topo: &Topology, id: OpId, colour: &mut [Colour]) -> Result<()> {
        colour[id.0] = Colour::Grey;
        for call in &topo.ops[id.0].calls {
            match colour[call.target.0] {
                Colour::Grey => {
                    return Err(Error::Cycle {
                        op_ref: topo.ops[call.target.0].op_ref.clone(),
                    })
                }
                Colour::White => visit(topo, call.target, colour)?,
                Colour::Black => {}
            }
        }
        colour[id.0] = Colour::Black;
        Ok(())
    }

    let mut colour = vec![Colour::White; topo.ops.len()];
    for id in 0..topo.ops.len() {
        if colour[id] == Colour::White {
            visit(topo, OpId(id), &mut colour)?;
        }
    }
    Ok(())
}
