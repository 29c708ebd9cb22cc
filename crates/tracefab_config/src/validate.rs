//! Structural validation of a parsed configuration.
//!
//! Every failure names the offending service / operation / field via a
//! dotted path. Cross-reference checks (unknown call targets) belong to the
//! topology builder, which owns the resolved graph.

use crate::error::{Error, Result};
use crate::model::{
    AttributeValueConfig, BackpressureConfig, CallConfig, CircuitBreakerConfig, Config,
    OverrideConfig, PatternKind, RangeConfig, TrafficConfig, SUPPORTED_VERSION,
};
use tracefab_model::{parse_duration, parse_error_rate, Distribution, Rate};

/// Validates a configuration document.
///
/// # Errors
///
/// Returns the first validation failure found, with a path naming the
/// offending field.
pub fn validate(config: &Config) -> Result<()> {
    if config.version != SUPPORTED_VERSION {
        return Err(Error::Version(config.version));
    }

    if config.services.is_empty() {
        return Err(Error::validation("services", "at least one service is required"));
    }

    for (service_name, service) in &config.services {
        let service_path = format!("services.{service_name}");
        if service.operations.is_empty() {
            return Err(Error::validation(
                service_path.clone(),
                "service has no operations",
            ));
        }
        for (op_name, op) in &service.operations {
            let op_path = format!("{service_path}.operations.{op_name}");

            Distribution::parse(&op.duration)
                .map_err(|e| Error::validation(format!("{op_path}.duration"), e.to_string()))?;

            if let Some(rate) = &op.error_rate {
                parse_error_rate(rate).map_err(|e| {
                    Error::validation(format!("{op_path}.error_rate"), e.to_string())
                })?;
            }

            for (index, call) in op.calls.iter().enumerate() {
                validate_call(call, &format!("{op_path}.calls[{index}]"))?;
            }

            for (key, attr) in &op.attributes {
                validate_attribute(attr, &format!("{op_path}.attributes.{key}"))?;
            }

            if let Some(bp) = &op.backpressure {
                validate_backpressure(bp, &format!("{op_path}.backpressure"))?;
            }

            if let Some(cb) = &op.circuit_breaker {
                validate_circuit_breaker(cb, &format!("{op_path}.circuit_breaker"))?;
            }
        }
    }

    if let Some(traffic) = &config.traffic {
        validate_traffic(traffic, "traffic")?;
    }

    for (index, scenario) in config.scenarios.iter().enumerate() {
        let path = format!("scenarios[{index}]");
        if scenario.name.is_empty() {
            return Err(Error::validation(format!("{path}.name"), "name is required"));
        }

        parse_offset(&scenario.at)
            .map_err(|e| Error::validation(format!("{path}.at"), e.to_string()))?;
        parse_duration(&scenario.duration)
            .map_err(|e| Error::validation(format!("{path}.duration"), e.to_string()))?;

        for (op_ref, ov) in &scenario.overrides {
            validate_ref(op_ref, &format!("{path}.override.{op_ref}"))?;
            validate_override(ov, &format!("{path}.override.{op_ref}"))?;
        }

        if let Some(traffic) = &scenario.traffic {
            validate_traffic(traffic, &format!("{path}.traffic"))?;
        }
    }

    Ok(())
}

/// Parses a `"+5m"`-style offset; the leading `+` is optional.
///
/// # Errors
///
/// Returns an error if the remainder is not a valid duration.
pub fn parse_offset(input: &str) -> tracefab_model::Result<std::time::Duration> {
    let trimmed = input.trim();
    let stripped = trimmed.strip_prefix('+').unwrap_or(trimmed);
    parse_duration(stripped)
}

fn validate_ref(op_ref: &str, path: &str) -> Result<()> {
    match op_ref.split_once('.') {
        Some((service, op)) if !service.is_empty() && !op.is_empty() => Ok(()),
        _ => Err(Error::validation(
            path,
            format!("'{op_ref}' is not a 'service.operation' reference"),
        )),
    }
}

fn validate_call(call: &CallConfig, path: &str) -> Result<()> {
    validate_ref(&call.target, &format!("{path}.target"))?;

    if call.count == Some(0) {
        return Err(Error::validation(
            format!("{path}.count"),
            "count must be at least 1",
        ));
    }

    if !(0.0..=1.0).contains(&call.probability) {
        return Err(Error::validation(
            format!("{path}.probability"),
            "must be between 0 and 1",
        ));
    }

    if let Some(condition) = call.condition.as_deref() {
        if !matches!(condition, "" | "on-error" | "on-success") {
            return Err(Error::validation(
                format!("{path}.condition"),
                format!("'{condition}' is not one of '', 'on-error', 'on-success'"),
            ));
        }
    }

    if let Some(timeout) = &call.timeout {
        parse_duration(timeout)
            .map_err(|e| Error::validation(format!("{path}.timeout"), e.to_string()))?;
    }

    if let Some(backoff) = &call.retry_backoff {
        parse_duration(backoff)
            .map_err(|e| Error::validation(format!("{path}.retry_backoff"), e.to_string()))?;
    }

    Ok(())
}

fn validate_attribute(attr: &AttributeValueConfig, path: &str) -> Result<()> {
    match attr.set_count() {
        1 => {}
        0 => {
            return Err(Error::validation(
                path,
                "one of value, values, sequence, probability, range, distribution is required",
            ))
        }
        n => {
            return Err(Error::validation(
                path,
                format!("exactly one variant field expected, found {n}"),
            ))
        }
    }

    if let Some(values) = &attr.values {
        if values.is_empty() {
            return Err(Error::validation(
                format!("{path}.values"),
                "at least one weighted value is required",
            ));
        }
        if let Some((value, _)) = values.iter().find(|(_, weight)| **weight == 0) {
            return Err(Error::validation(
                format!("{path}.values.{value}"),
                "weight must be positive",
            ));
        }
    }

    if let Some(sequence) = &attr.sequence {
        if !sequence.contains("{n}") {
            return Err(Error::validation(
                format!("{path}.sequence"),
                "pattern must contain '{n}'",
            ));
        }
    }

    if let Some(probability) = attr.probability {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::validation(
                format!("{path}.probability"),
                "must be between 0 and 1",
            ));
        }
    }

    if let Some(range) = &attr.range {
        let bad = match range {
            RangeConfig::Int([min, max]) => min > max,
            RangeConfig::Float([min, max]) => {
                !min.is_finite() || !max.is_finite() || min > max
            }
        };
        if bad {
            return Err(Error::validation(
                format!("{path}.range"),
                "min must not exceed max",
            ));
        }
    }

    if let Some(dist) = &attr.distribution {
        if dist.stddev < 0.0 {
            return Err(Error::validation(
                format!("{path}.distribution.stddev"),
                "must be non-negative",
            ));
        }
    }

    Ok(())
}

fn validate_backpressure(bp: &BackpressureConfig, path: &str) -> Result<()> {
    let threshold = parse_duration(&bp.latency_threshold)
        .map_err(|e| Error::validation(format!("{path}.latency_threshold"), e.to_string()))?;
    if threshold.is_zero() {
        return Err(Error::validation(
            format!("{path}.latency_threshold"),
            "must be positive",
        ));
    }
    if bp.duration_multiplier < 0.0 {
        return Err(Error::validation(
            format!("{path}.duration_multiplier"),
            "must be non-negative",
        ));
    }
    if !(0.0..=1.0).contains(&bp.error_rate_add) {
        return Err(Error::validation(
            format!("{path}.error_rate_add"),
            "must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_circuit_breaker(cb: &CircuitBreakerConfig, path: &str) -> Result<()> {
    if cb.failure_threshold == 0 {
        return Err(Error::validation(
            format!("{path}.failure_threshold"),
            "must be at least 1",
        ));
    }
    parse_duration(&cb.window)
        .map_err(|e| Error::validation(format!("{path}.window"), e.to_string()))?;
    parse_duration(&cb.cooldown)
        .map_err(|e| Error::validation(format!("{path}.cooldown"), e.to_string()))?;
    Ok(())
}

fn validate_override(ov: &OverrideConfig, path: &str) -> Result<()> {
    if let Some(duration) = &ov.duration {
        Distribution::parse(duration)
            .map_err(|e| Error::validation(format!("{path}.duration"), e.to_string()))?;
    }
    if let Some(rate) = &ov.error_rate {
        parse_error_rate(rate)
            .map_err(|e| Error::validation(format!("{path}.error_rate"), e.to_string()))?;
    }
    for (key, attr) in &ov.attributes {
        validate_attribute(attr, &format!("{path}.attributes.{key}"))?;
    }
    for (index, call) in ov.add_calls.iter().enumerate() {
        validate_call(call, &format!("{path}.add_calls[{index}]"))?;
    }
    for (index, target) in ov.remove_calls.iter().enumerate() {
        validate_ref(target, &format!("{path}.remove_calls[{index}]"))?;
    }
    Ok(())
}

fn validate_traffic(traffic: &TrafficConfig, path: &str) -> Result<()> {
    Rate::parse(&traffic.rate)
        .map_err(|e| Error::validation(format!("{path}.rate"), e.to_string()))?;

    match traffic.pattern {
        PatternKind::Uniform => {}
        PatternKind::Diurnal => {
            let peak = traffic.peak_multiplier.unwrap_or(1.5);
            let trough = traffic.trough_multiplier.unwrap_or(0.5);
            if trough < 0.0 || peak < trough {
                return Err(Error::validation(
                    format!("{path}.peak_multiplier"),
                    "peak must be >= trough and trough must be >= 0",
                ));
            }
            if let Some(period) = &traffic.period {
                let period = parse_duration(period)
                    .map_err(|e| Error::validation(format!("{path}.period"), e.to_string()))?;
                if period.is_zero() {
                    return Err(Error::validation(
                        format!("{path}.period"),
                        "must be positive",
                    ));
                }
            }
        }
        PatternKind::Bursty => {
            let multiplier = traffic.burst_multiplier.unwrap_or(1.0);
            if multiplier < 0.0 {
                return Err(Error::validation(
                    format!("{path}.burst_multiplier"),
                    "must be non-negative",
                ));
            }
            let interval = traffic.burst_interval.as_deref().ok_or_else(|| {
                Error::validation(format!("{path}.burst_interval"), "required for bursty")
            })?;
            let duration = traffic.burst_duration.as_deref().ok_or_else(|| {
                Error::validation(format!("{path}.burst_duration"), "required for bursty")
            })?;
            let interval = parse_duration(interval)
                .map_err(|e| Error::validation(format!("{path}.burst_interval"), e.to_string()))?;
            let duration = parse_duration(duration)
                .map_err(|e| Error::validation(format!("{path}.burst_duration"), e.to_string()))?;
            if duration.is_zero() || duration >= interval {
                return Err(Error::validation(
                    format!("{path}.burst_duration"),
                    "must satisfy 0 < burst_duration < burst_interval",
                ));
            }
        }
        PatternKind::Custom => {
            if traffic.segments.is_empty() {
                return Err(Error::validation(
                    format!("{path}.segments"),
                    "custom pattern needs at least one segment",
                ));
            }
            let mut untils = Vec::with_capacity(traffic.segments.len());
            for (index, segment) in traffic.segments.iter().enumerate() {
                let until = parse_duration(&segment.until).map_err(|e| {
                    Error::validation(format!("{path}.segments[{index}].until"), e.to_string())
                })?;
                Rate::parse(&segment.rate).map_err(|e| {
                    Error::validation(format!("{path}.segments[{index}].rate"), e.to_string())
                })?;
                if untils.contains(&until) {
                    return Err(Error::validation(
                        format!("{path}.segments[{index}].until"),
                        "duplicate segment boundary",
                    ));
                }
                untils.push(until);
            }
        }
    }

    if let Some(overlay) = &traffic.overlay {
        validate_traffic(overlay, &format!("{path}.overlay"))?;
    }

    Ok(())
}
