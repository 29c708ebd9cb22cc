//! Config loading helpers.

use crate::error::{Error, Result};
use crate::model::Config;
use crate::validate::validate;
use std::path::Path;

/// Parses and validates a YAML config document.
///
/// # Errors
///
/// Returns an error if the YAML fails to parse or validation fails.
pub fn from_str(yaml: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(yaml)?;
    validate(&config)?;
    Ok(config)
}

/// Reads, parses and validates a YAML config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the YAML fails to parse, or
/// validation fails.
pub fn from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_str(&contents)
}
