// src/config.rs

//! Configuration loading utilities.

use std::path::Path;

use crate::error::{AuditError, Result};
use crate::models::Config;

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "storage/auditor.toml";

/// Load and validate the configuration.
///
/// An explicit `path` must load. Without one, the default file is used when
/// it loads, otherwise the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path).map_err(|e| {
            AuditError::config(format!("Failed to load config from {path:?}: {e}"))
        })?,
        None => Config::load_or_default(DEFAULT_CONFIG_PATH),
    };

    config
        .validate()
        .map_err(|e| AuditError::config(format!("Invalid configuration: {e}")))?;
    Ok(config)
}
