//! Error types for configuration loading and validation.

use thiserror::Error;

/// Errors that can occur while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML for the config model.
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The config version is not supported.
    #[error("unsupported config version {0} (expected 1)")]
    Version(u32),

    /// The document parsed but a field is semantically invalid.
    #[error("invalid config at {path}: {reason}")]
    Validation {
        /// Dotted path naming the offending service / operation / field.
        path: String,
        /// Reason for the failure.
        reason: String,
    },
}

impl Error {
    /// Creates a validation error for the given config path.
    #[must_use]
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;
