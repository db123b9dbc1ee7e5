// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::dag::{GraphError, TaskOrderError};
use crate::engine::StateMachineError;

#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Could not read config file '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    TaskOrder(#[from] TaskOrderError),

    #[error("Execution engine error: {0}")]
    Engine(#[from] StateMachineError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConvoyError {
    /// Errors caused by the user's configuration rather than by running it.
    ///
    /// These are reported with [`CONFIGURATION_ERROR_EXIT_CODE`] so callers
    /// can tell them apart from a failing task.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ConvoyError::ConfigError(_)
                | ConvoyError::ConfigRead { .. }
                | ConvoyError::TaskNotFound(_)
                | ConvoyError::TomlError(_)
                | ConvoyError::Graph(_)
                | ConvoyError::TaskOrder(_)
        )
    }

    /// Process exit code to report this error with.
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration_error() {
            CONFIGURATION_ERROR_EXIT_CODE
        } else {
            1
        }
    }
}

/// Exit code for configuration and dependency graph errors.
pub const CONFIGURATION_ERROR_EXIT_CODE: i32 = 253;

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ConvoyError>;
