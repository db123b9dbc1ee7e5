// src/types.rs

use std::fmt;

use serde::Deserialize;

/// Canonical container name type used throughout the engine.
pub type ContainerName = String;

/// What to do with created resources when the task fails.
///
/// - `Cleanup`: stop and remove everything that was created (default).
/// - `DontCleanup`: leave containers as they are so they can be inspected;
///   the failure report then carries the commands to remove them by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    #[default]
    Cleanup,
    DontCleanup,
}

/// Image identifier as reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef(pub String);

/// Container identifier as reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(pub String);

/// Network identifier as reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkHandle(pub String);

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
