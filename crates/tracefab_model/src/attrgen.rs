//! Attribute generators.
//!
//! Each operation carries a map of generators that synthesise typed span
//! attributes from the engine's RNG. The set of variants is closed: static,
//! weighted choice, sequence, uniform range, normal distribution, boolean.

use crate::error::{Error, Result};
use crate::span::AttributeValue;
use rand::Rng;
use rand_distr::StandardNormal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Placeholder interpolated by [`AttrGenerator::Sequence`].
const SEQUENCE_PLACEHOLDER: &str = "{n}";

/// A generator producing one typed attribute value per span.
#[derive(Debug)]
pub enum AttrGenerator {
    /// Always the same value.
    Static(AttributeValue),
    /// One of a fixed set of strings, picked by cumulative weight.
    WeightedChoice {
        /// Choices with their positive integer weights, in sorted key order.
        choices: Vec<(String, u64)>,
        /// Sum of all weights.
        total: u64,
    },
    /// A monotonic counter interpolated into a pattern at `{n}`.
    Sequence {
        /// Pattern containing the `{n}` placeholder.
        pattern: String,
        /// Counter state. Mutated through `&self`; the engine is the single
        /// writer.
        counter: AtomicU64,
    },
    /// A uniform integer in `[min, max]`.
    IntRange {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// A uniform float in `[min, max)`.
    FloatRange {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// A normally-distributed float.
    Normal {
        /// Mean of the distribution.
        mean: f64,
        /// Standard deviation of the distribution.
        stddev: f64,
    },
    /// A boolean that is true with the given probability.
    Bool {
        /// Probability of `true`, in `[0, 1]`.
        probability: f64,
    },
}

impl AttrGenerator {
    /// Creates a weighted-choice generator from `(value, weight)` pairs.
    ///
    /// Pairs are sorted by value so the cumulative lookup is deterministic
    /// regardless of input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the set is empty or any weight is zero.
    pub fn weighted(mut choices: Vec<(String, u64)>) -> Result<Self> {
        if choices.is_empty() {
            return Err(Error::InvalidGenerator(
                "weighted choice needs at least one value".to_string(),
            ));
        }
        if let Some((value, _)) = choices.iter().find(|(_, w)| *w == 0) {
            return Err(Error::InvalidGenerator(format!(
                "weight for '{value}' must be positive"
            )));
        }
        choices.sort_by(|a, b| a.0.cmp(&b.0));
        let total = choices.iter().map(|(_, w)| w).sum();
        Ok(Self::WeightedChoice { choices, total })
    }

    /// Creates a sequence generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not contain `{n}`.
    pub fn sequence(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if !pattern.contains(SEQUENCE_PLACEHOLDER) {
            return Err(Error::InvalidGenerator(format!(
                "sequence pattern '{pattern}' must contain '{SEQUENCE_PLACEHOLDER}'"
            )));
        }
        Ok(Self::Sequence {
            pattern,
            counter: AtomicU64::new(0),
        })
    }

    /// Creates a uniform integer range generator.
    ///
    /// # Errors
    ///
    /// Returns an error if `min > max`.
    pub fn int_range(min: i64, max: i64) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidGenerator(format!(
                "range min {min} exceeds max {max}"
            )));
        }
        Ok(Self::IntRange { min, max })
    }

    /// Creates a uniform float range generator.
    ///
    /// # Errors
    ///
    /// Returns an error if `min > max` or either bound is not finite.
    pub fn float_range(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(Error::InvalidGenerator(format!(
                "invalid float range [{min}, {max}]"
            )));
        }
        Ok(Self::FloatRange { min, max })
    }

    /// Creates a normal-distribution generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the standard deviation is negative.
    pub fn normal(mean: f64, stddev: f64) -> Result<Self> {
        if stddev < 0.0 {
            return Err(Error::InvalidGenerator(format!(
                "stddev {stddev} must be non-negative"
            )));
        }
        Ok(Self::Normal { mean, stddev })
    }

    /// Creates a boolean generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the probability is outside `[0, 1]`.
    pub fn bool_with(probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::InvalidGenerator(format!(
                "probability {probability} must be in [0, 1]"
            )));
        }
        Ok(Self::Bool { probability })
    }

    /// Generates one attribute value.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> AttributeValue {
        match self {
            Self::Static(value) => value.clone(),
            Self::WeightedChoice { choices, total } => {
                let draw = rng.gen_range(0..*total);
                let mut cumulative = 0;
                for (value, weight) in choices {
                    cumulative += weight;
                    if draw < cumulative {
                        return AttributeValue::String(value.clone());
                    }
                }
                // Unreachable while total == sum(weights); keep the last
                // value as the fallback.
                AttributeValue::String(choices[choices.len() - 1].0.clone())
            }
            Self::Sequence { pattern, counter } => {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                AttributeValue::String(pattern.replace(SEQUENCE_PLACEHOLDER, &n.to_string()))
            }
            Self::IntRange { min, max } => AttributeValue::Int(rng.gen_range(*min..=*max)),
            Self::FloatRange { min, max } => {
                if (*max - *min).abs() < f64::EPSILON {
                    AttributeValue::Float(*min)
                } else {
                    AttributeValue::Float(rng.gen_range(*min..*max))
                }
            }
            Self::Normal { mean, stddev } => {
                let z: f64 = rng.sample(StandardNormal);
                AttributeValue::Float(stddev.mul_add(z, *mean))
            }
            Self::Bool { probability } => AttributeValue::Bool(rng.gen_bool(*probability)),
        }
    }
}
