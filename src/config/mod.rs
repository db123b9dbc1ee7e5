// src/config/mod.rs

//! Configuration file handling.
//!
//! - [`model`] holds the serde types for the TOML file.
//! - [`loader`] reads a file from disk.
//! - [`validate`] turns a [`RawConfigFile`] into a checked [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, ContainerConfig, ProjectSection, RawConfigFile, TaskConfig};
