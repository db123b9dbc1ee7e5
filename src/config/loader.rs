// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ConvoyError, Result};

/// Read and deserialize a config file without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConvoyError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        containers = config.container.len(),
        tasks = config.task.len(),
        "loaded config file"
    );

    Ok(config)
}

/// Load a config file and validate it.
///
/// Container references and dependency cycles are not checked here; they are
/// checked per task when the dependency graph is built, so that a broken
/// container that no task uses does not block other tasks.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_path(path)?)
}
