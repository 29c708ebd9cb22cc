//! Traffic patterns: requests-per-second curves over elapsed time.

use crate::error::{Error, Result};
use std::f64::consts::TAU;
use std::time::Duration;
use tracefab_config::{PatternKind, TrafficConfig};
use tracefab_model::{parse_duration, Rate};

const DEFAULT_PEAK: f64 = 1.5;
const DEFAULT_TROUGH: f64 = 0.5;
const DEFAULT_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// One `(until, rate)` segment of a custom pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// The segment applies while elapsed time is below this offset.
    pub until: Duration,
    /// Requests per second during the segment.
    pub rate: f64,
}

/// A requests-per-second curve over elapsed time.
#[derive(Debug, Clone, PartialEq)]
pub enum TrafficPattern {
    /// Constant base rate.
    Uniform {
        /// Requests per second.
        base: f64,
    },
    /// Sinusoidal day/night cycle over the base rate.
    Diurnal {
        /// Requests per second at multiplier 1.
        base: f64,
        /// Multiplier at the peak of the cycle.
        peak: f64,
        /// Multiplier at the trough of the cycle.
        trough: f64,
        /// Length of one full cycle.
        period: Duration,
    },
    /// Periodic bursts over the base rate.
    Bursty {
        /// Requests per second outside bursts.
        base: f64,
        /// Rate multiplier during a burst.
        multiplier: f64,
        /// Length of one burst cycle.
        interval: Duration,
        /// Burst length at the start of each cycle.
        burst: Duration,
    },
    /// Piecewise segments, falling back to the base rate after the last.
    Custom {
        /// Requests per second after the last segment.
        base: f64,
        /// Segments sorted by `until`.
        segments: Vec<Segment>,
    },
    /// Base curve scaled by a normalised overlay curve.
    Composite {
        /// The underlying curve.
        base: Box<TrafficPattern>,
        /// The modulating curve.
        overlay: Box<TrafficPattern>,
        /// The overlay's own base rate, used for normalisation.
        overlay_base: f64,
    },
}

impl TrafficPattern {
    /// A constant pattern, useful as the default traffic shape.
    #[must_use]
    pub const fn uniform(base: f64) -> Self {
        Self::Uniform { base }
    }

    /// The configured base rate in requests per second.
    #[must_use]
    pub fn base_rate(&self) -> f64 {
        match self {
            Self::Uniform { base }
            | Self::Diurnal { base, .. }
            | Self::Bursty { base, .. }
            | Self::Custom { base, .. } => *base,
            Self::Composite { base, .. } => base.base_rate(),
        }
    }

    /// Requests per second at the given elapsed time.
    #[must_use]
    pub fn rate(&self, elapsed: Duration) -> f64 {
        match self {
            Self::Uniform { base } => *base,
            Self::Diurnal {
                base,
                peak,
                trough,
                period,
            } => {
                let phase = TAU * elapsed.as_secs_f64() / period.as_secs_f64();
                let swing = (peak - trough) * (1.0 + phase.sin()) / 2.0;
                base * (trough + swing)
            }
            Self::Bursty {
                base,
                multiplier,
                interval,
                burst,
            } => {
                let into_cycle = elapsed.as_secs_f64() % interval.as_secs_f64();
                if into_cycle < burst.as_secs_f64() {
                    base * multiplier
                } else {
                    *base
                }
            }
            Self::Custom { base, segments } => segments
                .iter()
                .find(|segment| segment.until > elapsed)
                .map_or(*base, |segment| segment.rate),
            Self::Composite {
                base,
                overlay,
                overlay_base,
            } => {
                let base_rate = base.rate(elapsed);
                if *overlay_base <= 0.0 {
                    return base_rate;
                }
                base_rate * (overlay.rate(elapsed) / overlay_base)
            }
        }
    }

    /// Builds a pattern from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate or any pattern parameter fails to parse
    /// or violates the pattern's bounds.
    pub fn from_config(cfg: &TrafficConfig) -> Result<Self> {
        let base = Rate::parse(&cfg.rate)
            .map_err(|e| Error::Traffic(e.to_string()))?
            .per_second();

        let pattern = match cfg.pattern {
            PatternKind::Uniform => Self::Uniform { base },
            PatternKind::Diurnal => {
                let peak = cfg.peak_multiplier.unwrap_or(DEFAULT_PEAK);
                let trough = cfg.trough_multiplier.unwrap_or(DEFAULT_TROUGH);
                let period = match &cfg.period {
                    Some(p) => parse_duration(p).map_err(|e| Error::Traffic(e.to_string()))?,
                    None => DEFAULT_PERIOD,
                };
                if period.is_zero() {
                    return Err(Error::Traffic("diurnal period must be positive".to_string()));
                }
                if trough < 0.0 || peak < trough {
                    return Err(Error::Traffic(
                        "diurnal multipliers must satisfy peak >= trough >= 0".to_string(),
                    ));
                }
                Self::Diurnal {
                    base,
                    peak,
                    trough,
                    period,
                }
            }
            PatternKind::Bursty => {
                let multiplier = cfg.burst_multiplier.unwrap_or(1.0);
                if multiplier < 0.0 {
                    return Err(Error::Traffic(
                        "burst multiplier must be non-negative".to_string(),
                    ));
                }
                let interval = cfg
                    .burst_interval
                    .as_deref()
                    .ok_or_else(|| Error::Traffic("bursty pattern needs burst_interval".to_string()))
                    .and_then(|s| parse_duration(s).map_err(|e| Error::Traffic(e.to_string())))?;
                let burst = cfg
                    .burst_duration
                    .as_deref()
                    .ok_or_else(|| Error::Traffic("bursty pattern needs burst_duration".to_string()))
                    .and_then(|s| parse_duration(s).map_err(|e| Error::Traffic(e.to_string())))?;
                if burst.is_zero() || burst >= interval {
                    return Err(Error::Traffic(
                        "must satisfy 0 < burst_duration < burst_interval".to_string(),
                    ));
                }
                Self::Bursty {
                    base,
                    multiplier,
                    interval,
                    burst,
                }
            }
            PatternKind::Custom => {
                let mut segments = Vec::with_capacity(cfg.segments.len());
                for segment in &cfg.segments {
                    let until = parse_duration(&segment.until)
                        .map_err(|e| Error::Traffic(e.to_string()))?;
                    let rate = Rate::parse(&segment.rate)
                        .map_err(|e| Error::Traffic(e.to_string()))?
                        .per_second();
                    if segments.iter().any(|s: &Segment| s.until == until) {
                        return Err(Error::Traffic(format!(
                            "duplicate segment boundary '{}'",
                            segment.until
                        )));
                    }
                    segments.push(Segment { until, rate });
                }
                if segments.is_empty() {
                    return Err(Error::Traffic(
                        "custom pattern needs at least one segment".to_string(),
                    ));
                }
                segments.sort_by_key(|segment| segment.until);
                Self::Custom { base, segments }
            }
        };

        match &cfg.overlay {
            Some(overlay_cfg) => {
                let overlay = Self::from_config(overlay_cfg)?;
                let overlay_base = overlay.base_rate();
                Ok(Self::Composite {
                    base: Box::new(pattern),
                    overlay: Box::new(overlay),
                    overlay_base,
                })
            }
            None => Ok(pattern),
        }
    }
}
