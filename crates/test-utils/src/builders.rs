#![allow(dead_code)]

use std::collections::BTreeMap;

use convoy::config::{ConfigFile, ContainerConfig, ProjectSection, RawConfigFile, TaskConfig};
use convoy::dag::{Container, DependencyGraph, Task};
use convoy::types::CleanupPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                project: ProjectSection::default(),
                container: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_container(mut self, name: &str, container: ContainerConfig) -> Self {
        self.config.container.insert(name.to_string(), container);
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_max_parallelism(mut self, n: usize) -> Self {
        self.config.project.max_parallelism = n;
        self
    }

    pub fn with_cleanup_after_failure(mut self, policy: CleanupPolicy) -> Self {
        self.config.project.cleanup_after_failure = policy;
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ContainerConfig`.
pub struct ContainerConfigBuilder {
    container: ContainerConfig,
}

impl ContainerConfigBuilder {
    pub fn image(image: &str) -> Self {
        Self {
            container: ContainerConfig {
                image: Some(image.to_string()),
                ..ContainerConfig::default()
            },
        }
    }

    pub fn build_directory(dir: &str) -> Self {
        Self {
            container: ContainerConfig {
                build_directory: Some(dir.into()),
                ..ContainerConfig::default()
            },
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.container.dependencies.push(dep.to_string());
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.container.command = Some(command.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.container
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> ContainerConfig {
        self.container
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(container: &str) -> Self {
        Self {
            task: TaskConfig {
                container: container.to_string(),
                ..TaskConfig::default()
            },
        }
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.dependencies.push(dep.to_string());
        self
    }

    pub fn prerequisite(mut self, task: &str) -> Self {
        self.task.prerequisites.push(task.to_string());
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.task.command = Some(command.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Graph for running `main` with the given containers, without going
/// through a config file.
pub fn graph_for(main: &str, containers: Vec<Container>) -> DependencyGraph {
    task_graph("test", main, containers)
}

/// Like [`graph_for`], for a task called `task`.
pub fn task_graph(task: &str, main: &str, containers: Vec<Container>) -> DependencyGraph {
    let map: BTreeMap<_, _> = containers
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();
    DependencyGraph::build(&Task::new(task, main), &map).expect("valid graph")
}

/// `db ← api ← web`, with `web` as the main container.
pub fn linear_chain() -> DependencyGraph {
    graph_for(
        "web",
        vec![
            Container::from_image("db", "postgres:16"),
            Container::from_build_directory("api", "api").depends_on(["db"]),
            Container::from_image("web", "nginx").depends_on(["api"]),
        ],
    )
}

/// `a → {b, c} → d`, with `a` as the main container.
pub fn diamond() -> DependencyGraph {
    graph_for(
        "a",
        vec![
            Container::from_image("a", "a").depends_on(["b", "c"]),
            Container::from_image("b", "b").depends_on(["d"]),
            Container::from_image("c", "c").depends_on(["d"]),
            Container::from_image("d", "d"),
        ],
    )
}
