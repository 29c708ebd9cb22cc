//! Duration distributions.
//!
//! A [`Distribution`] is a mean duration with an optional standard deviation,
//! written as `"100ms"` or `"100ms +/- 20ms"`. Sampling draws from a normal
//! distribution and floors at zero.

use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Parses a single duration string such as `"250ms"` or `"5m"`.
///
/// # Errors
///
/// Returns an error if the string is not a valid humantime duration.
pub fn parse_duration(input: &str) -> Result<Duration> {
    humantime::parse_duration(input.trim()).map_err(|e| Error::InvalidDuration {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// A normally-distributed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Distribution {
    /// Mean duration.
    pub mean: Duration,
    /// Standard deviation. Zero means a constant duration.
    pub stddev: Duration,
}

impl Distribution {
    /// Creates a new distribution.
    #[must_use]
    pub const fn new(mean: Duration, stddev: Duration) -> Self {
        Self { mean, stddev }
    }

    /// Creates a constant distribution with zero standard deviation.
    #[must_use]
    pub const fn constant(mean: Duration) -> Self {
        Self {
            mean,
            stddev: Duration::ZERO,
        }
    }

    /// Parses a distribution string.
    ///
    /// Accepted forms: `"<d>"`, `"<d> +/- <d>"`, `"<d> ± <d>"`. The mean must
    /// be strictly positive and the standard deviation non-negative.
    ///
    /// # Errors
    ///
    /// Returns an error if either component fails to parse or the mean is
    /// zero.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        let (mean_str, stddev_str) = if let Some((m, s)) = trimmed.split_once("+/-") {
            (m, Some(s))
        } else if let Some((m, s)) = trimmed.split_once('±') {
            (m, Some(s))
        } else {
            (trimmed, None)
        };

        let mean = parse_duration(mean_str).map_err(|e| Error::InvalidDistribution {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        if mean.is_zero() {
            return Err(Error::InvalidDistribution {
                input: input.to_string(),
                reason: "mean must be positive".to_string(),
            });
        }

        let stddev = match stddev_str {
            Some(s) => parse_duration(s).map_err(|e| Error::InvalidDistribution {
                input: input.to_string(),
                reason: e.to_string(),
            })?,
            None => Duration::ZERO,
        };

        Ok(Self { mean, stddev })
    }

    /// Samples a duration: `max(0, mean + N(0,1) * stddev)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.stddev.is_zero() {
            return self.mean;
        }
        let z: f64 = rng.sample(StandardNormal);
        let secs = self.stddev.as_secs_f64().mul_add(z, self.mean.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Returns true if the mean is zero (the "no value" marker for
    /// overrides).
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.mean.is_zero()
    }

    /// Returns a copy with the mean scaled by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            mean: self.mean.mul_f64(factor),
            stddev: self.stddev,
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stddev.is_zero() {
            write!(f, "{}", humantime::format_duration(self.mean))
        } else {
            write!(
                f,
                "{} +/- {}",
                humantime::format_duration(self.mean),
                humantime::format_duration(self.stddev)
            )
        }
    }
}

impl FromStr for Distribution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
