//! Error types for model parsing and construction.

use thiserror::Error;

/// Errors that can occur while parsing or constructing model values.
#[derive(Debug, Error)]
pub enum Error {
    /// A duration string could not be parsed.
    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration {
        /// The offending input string.
        input: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A duration distribution string could not be parsed.
    #[error("invalid distribution '{input}': {reason}")]
    InvalidDistribution {
        /// The offending input string.
        input: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A rate string could not be parsed.
    #[error("invalid rate '{input}': {reason}")]
    InvalidRate {
        /// The offending input string.
        input: String,
        /// Reason for the failure.
        reason: String,
    },

    /// An error-rate string could not be parsed.
    #[error("invalid error rate '{input}': {reason}")]
    InvalidErrorRate {
        /// The offending input string.
        input: String,
        /// Reason for the failure.
        reason: String,
    },

    /// An attribute generator was mis-configured.
    #[error("invalid attribute generator: {0}")]
    InvalidGenerator(String),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;
