// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;

use crate::dag::{Container, ImageSource, Task};
use crate::types::{CleanupPolicy, ContainerName};

fn default_max_parallelism() -> usize {
    8
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Used to name images and the task network. Defaults to the directory
    /// holding the config file.
    #[serde(default)]
    pub name: Option<String>,

    /// Upper bound on concurrently executing steps.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    #[serde(default)]
    pub cleanup_after_failure: CleanupPolicy,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            max_parallelism: default_max_parallelism(),
            cleanup_after_failure: CleanupPolicy::default(),
        }
    }
}

/// `[container.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    /// Image to pull. Mutually exclusive with `build_directory`.
    #[serde(default)]
    pub image: Option<String>,

    /// Directory containing a Dockerfile. Mutually exclusive with `image`.
    #[serde(default)]
    pub build_directory: Option<PathBuf>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl ContainerConfig {
    /// Resolved image source. Only meaningful on validated configs.
    pub fn image_source(&self) -> Option<ImageSource> {
        match (&self.image, &self.build_directory) {
            (Some(image), None) => Some(ImageSource::Pull {
                image: image.clone(),
            }),
            (None, Some(dir)) => Some(ImageSource::Build {
                directory: dir.clone(),
            }),
            _ => None,
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// The main container: started attached, its exit code is the task's.
    pub container: String,

    /// Overrides the main container's command.
    #[serde(default)]
    pub command: Option<String>,

    /// Extra containers to start before the main container.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Tasks to run before this one, e.g. `["build", "lint:*"]`.
    #[serde(default)]
    pub prerequisites: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Raw, unvalidated config as deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub container: BTreeMap<String, ContainerConfig>,

    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Construct via `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project: ProjectSection,
    pub container: BTreeMap<String, ContainerConfig>,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        project: ProjectSection,
        container: BTreeMap<String, ContainerConfig>,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            project,
            container,
            task,
        }
    }

    /// All container definitions, keyed by name.
    pub fn containers(&self) -> BTreeMap<ContainerName, Container> {
        self.container
            .iter()
            .filter_map(|(name, cc)| {
                let source = cc.image_source()?;
                Some((
                    name.clone(),
                    Container {
                        name: name.clone(),
                        image_source: source,
                        dependencies: cc.dependencies.iter().cloned().collect(),
                        command: cc.command.clone(),
                        environment: cc.environment.clone(),
                    },
                ))
            })
            .collect()
    }

    /// Look up a task definition by name.
    pub fn task(&self, name: &str) -> Option<Task> {
        let tc = self.task.get(name)?;
        Some(Task {
            name: name.to_string(),
            container: tc.container.clone(),
            command: tc.command.clone(),
            dependencies: tc.dependencies.iter().cloned().collect::<BTreeSet<_>>(),
            prerequisites: tc.prerequisites.clone(),
        })
    }

    /// All task definitions, keyed by name.
    pub fn tasks(&self) -> BTreeMap<String, Task> {
        self.task
            .keys()
            .filter_map(|name| Some((name.clone(), self.task(name)?)))
            .collect()
    }
}
