//! Traffic rate and error-rate parsing.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Upper bound on the count component of a [`Rate`].
pub const MAX_RATE_COUNT: u64 = 1_000_000;

/// Time unit of a rate denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    /// Per second.
    Second,
    /// Per minute.
    Minute,
    /// Per hour.
    Hour,
}

impl RateUnit {
    /// Number of seconds in this unit.
    #[must_use]
    pub const fn seconds(self) -> u64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 3600,
        }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Self::Second => "s",
            Self::Minute => "m",
            Self::Hour => "h",
        }
    }
}

/// A request rate written as `<count>/<unit>`, e.g. `"100/s"` or `"5000/m"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    /// Number of requests per unit.
    pub count: u64,
    /// The unit of time.
    pub unit: RateUnit,
}

impl Rate {
    /// Creates a new rate.
    #[must_use]
    pub const fn new(count: u64, unit: RateUnit) -> Self {
        Self { count, unit }
    }

    /// Parses a rate string of the form `<count>/<unit>` with unit one of
    /// `s`, `m`, `h`.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is wrong, the count is zero, or the
    /// count exceeds [`MAX_RATE_COUNT`].
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let (count_str, unit_str) = trimmed.split_once('/').ok_or_else(|| Error::InvalidRate {
            input: input.to_string(),
            reason: "expected '<count>/<unit>'".to_string(),
        })?;

        let count: u64 = count_str.trim().parse().map_err(|_| Error::InvalidRate {
            input: input.to_string(),
            reason: format!("invalid count '{}'", count_str.trim()),
        })?;
        if count == 0 {
            return Err(Error::InvalidRate {
                input: input.to_string(),
                reason: "count must be positive".to_string(),
            });
        }
        if count > MAX_RATE_COUNT {
            return Err(Error::InvalidRate {
                input: input.to_string(),
                reason: format!("count exceeds maximum of {MAX_RATE_COUNT}"),
            });
        }

        let unit = match unit_str.trim() {
            "s" => RateUnit::Second,
            "m" => RateUnit::Minute,
            "h" => RateUnit::Hour,
            other => {
                return Err(Error::InvalidRate {
                    input: input.to_string(),
                    reason: format!("unknown unit '{other}', expected s, m or h"),
                })
            }
        };

        Ok(Self { count, unit })
    }

    /// Converts this rate to requests per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn per_second(self) -> f64 {
        self.count as f64 / self.unit.seconds() as f64
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.count, self.unit.suffix())
    }
}

impl FromStr for Rate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parses an error rate written as `"<float>%"` or a bare float.
///
/// The result must be in `[0, 1]` (a percentage is divided by 100 first).
///
/// # Errors
///
/// Returns an error if the number fails to parse or falls outside `[0, 1]`.
pub fn parse_error_rate(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    let (number_str, divisor) = trimmed.strip_suffix('%').map_or((trimmed, 1.0), |pct| (pct, 100.0));

    let value: f64 = number_str.trim().parse().map_err(|_| Error::InvalidErrorRate {
        input: input.to_string(),
        reason: format!("invalid number '{}'", number_str.trim()),
    })?;

    let rate = value / divisor;
    if !(0.0..=1.0).contains(&rate) {
        return Err(Error::InvalidErrorRate {
            input: input.to_string(),
            reason: "must be between 0 and 1".to_string(),
        });
    }

    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_per_second() {
        let r = Rate::parse("100/s").unwrap();
        assert_eq!(r.count, 100);
        assert_eq!(r.unit, RateUnit::Second);
        assert!((r.per_second() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_per_minute_and_hour() {
        assert!((Rate::parse("60/m").unwrap().per_second() - 1.0).abs() < f64::EPSILON);
        assert!((Rate::parse("3600/h").unwrap().per_second() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_rejects_zero_count() {
        assert!(Rate::parse("0/s").is_err());
    }

    #[test]
    fn parse_enforces_max_count() {
        assert!(Rate::parse("1000000/s").is_ok());
        assert!(Rate::parse("1000001/s").is_err());
    }

    #[test]
    fn parse_rejects_bad_unit() {
        assert!(Rate::parse("10/d").is_err());
        assert!(Rate::parse("10").is_err());
        assert!(Rate::parse("ten/s").is_err());
    }

    #[test]
    fn rate_display() {
        assert_eq!(Rate::parse("250/m").unwrap().to_string(), "250/m");
    }

    #[test]
    fn error_rate_percent() {
        assert!((parse_error_rate("5%").unwrap() - 0.05).abs() < f64::EPSILON);
        assert!((parse_error_rate("100%").unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((parse_error_rate("0%").unwrap()).abs() < f64::EPSILON);
    }

    #[test]
    fn error_rate_bare_float() {
        assert!((parse_error_rate("0.25").unwrap() - 0.25).abs() < f64::EPSILON);
        assert!((parse_error_rate("1.0").unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn error_rate_out_of_range() {
        assert!(parse_error_rate("150%").is_err());
        assert!(parse_error_rate("1.5").is_err());
        assert!(parse_error_rate("-0.1").is_err());
    }

    #[test]
    fn error_rate_garbage() {
        assert!(parse_error_rate("lots").is_err());
        assert!(parse_error_rate("%").is_err());
    }
}
