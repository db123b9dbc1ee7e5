// src/dag/container.rs

//! Container and task definitions as seen by the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::types::ContainerName;

/// Where a container's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Build from a directory containing a Dockerfile.
    Build { directory: PathBuf },
    /// Pull an existing image.
    Pull { image: String },
}

/// A named, configured container with declared dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: ContainerName,
    pub image_source: ImageSource,
    /// Names of containers that must be healthy before this one is created.
    pub dependencies: BTreeSet<ContainerName>,
    pub command: Option<String>,
    pub environment: BTreeMap<String, String>,
}

impl Container {
    /// Container pulling `image`, with no dependencies.
    pub fn from_image(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self::with_source(
            name,
            ImageSource::Pull {
                image: image.into(),
            },
        )
    }

    /// Container built from `directory`, with no dependencies.
    pub fn from_build_directory(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self::with_source(
            name,
            ImageSource::Build {
                directory: directory.into(),
            },
        )
    }

    fn with_source(name: impl Into<String>, image_source: ImageSource) -> Self {
        Self {
            name: name.into(),
            image_source,
            dependencies: BTreeSet::new(),
            command: None,
            environment: BTreeMap::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }
}

/// A task: run `container` after starting its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    /// The main container.
    pub container: ContainerName,
    /// Replaces the main container's own command when set.
    pub command: Option<String>,
    /// Containers started by the task in addition to the main container's
    /// own dependencies.
    pub dependencies: BTreeSet<ContainerName>,
    /// Tasks to run to completion first. Entries may contain `*` wildcards.
    pub prerequisites: Vec<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: container.into(),
            command: None,
            dependencies: BTreeSet::new(),
            prerequisites: Vec::new(),
        }
    }

    pub fn with_prerequisites<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }
}
