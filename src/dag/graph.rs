// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;
use tracing::debug;

use crate::dag::container::{Container, Task};
use crate::types::ContainerName;

/// Why a dependency graph could not be built for a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error(
        "The task '{task}' cannot have the container '{container}' as both the main task container and also a dependency."
    )]
    MainContainerIsDependency {
        task: String,
        container: ContainerName,
    },

    #[error("The container '{container}' referenced by {referenced_by} does not exist.")]
    ContainerDoesNotExist {
        container: ContainerName,
        referenced_by: String,
    },

    #[error("The container '{container}' cannot depend on itself.")]
    SelfDependency { container: ContainerName },

    #[error("There is a dependency cycle in task '{task}'. {description}")]
    DependencyCycle { task: String, description: String },
}

/// One container in the graph with its resolved dependencies.
#[derive(Debug, Clone)]
pub struct GraphNode {
    container: Container,
    depends_on: BTreeSet<ContainerName>,
    is_root: bool,
}

impl GraphNode {
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.container.name
    }

    /// Containers that must be healthy before this one is created.
    ///
    /// For the root this includes the task-level dependencies.
    pub fn depends_on(&self) -> &BTreeSet<ContainerName> {
        &self.depends_on
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }
}

/// Work item for the iterative depth-first walk.
struct Frame {
    container: Container,
    depends_on: BTreeSet<ContainerName>,
    pending: Vec<ContainerName>,
    next: usize,
    is_root: bool,
}

impl Frame {
    fn new(container: Container, depends_on: BTreeSet<ContainerName>, is_root: bool) -> Self {
        let pending = depends_on.iter().cloned().collect();
        Self {
            container,
            depends_on,
            pending,
            next: 0,
            is_root,
        }
    }
}

/// Resolved, cycle-free container dependencies for one task run.
///
/// Built once, never mutated. Only containers reachable from the task's main
/// container are part of the graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    task_name: String,
    root: ContainerName,
    nodes: BTreeMap<ContainerName, GraphNode>,
}

impl DependencyGraph {
    /// Resolve the containers needed by `task`.
    pub fn build(
        task: &Task,
        containers: &BTreeMap<ContainerName, Container>,
    ) -> Result<Self, GraphError> {
        if task.dependencies.contains(&task.container) {
            return Err(GraphError::MainContainerIsDependency {
                task: task.name.clone(),
                container: task.container.clone(),
            });
        }

        let task_description = format!("task '{}'", task.name);
        let main = find_container(containers, &task.container, &task_description)?;

        let mut root_container = main.clone();
        if let Some(command) = &task.command {
            root_container.command = Some(command.clone());
        }

        let mut root_dependencies = BTreeSet::new();
        for name in &task.dependencies {
            find_container(containers, name, &task_description)?;
            root_dependencies.insert(name.clone());
        }
        root_dependencies.extend(resolve_dependencies(main, containers)?);

        let mut nodes: BTreeMap<ContainerName, GraphNode> = BTreeMap::new();
        let mut path: Vec<ContainerName> = vec![main.name.clone()];
        let mut stack = vec![Frame::new(root_container, root_dependencies, true)];

        loop {
            let next = match stack.last_mut() {
                None => break,
                Some(frame) => {
                    let next = frame.pending.get(frame.next).cloned();
                    if next.is_some() {
                        frame.next += 1;
                    }
                    next
                }
            };

            match next {
                Some(name) => {
                    if nodes.contains_key(&name) {
                        continue;
                    }

                    if path.contains(&name) {
                        path.push(name);
                        return Err(cycle_error(task, &path));
                    }

                    let container = find_container(containers, &name, &task_description)?;
                    let depends_on = resolve_dependencies(container, containers)?;
                    path.push(name);
                    stack.push(Frame::new(container.clone(), depends_on, false));
                }
                None => {
                    if let Some(frame) = stack.pop() {
                        path.pop();
                        debug!(
                            task = %task.name,
                            container = %frame.container.name,
                            dependencies = ?frame.depends_on,
                            "resolved container in dependency graph"
                        );
                        nodes.insert(
                            frame.container.name.clone(),
                            GraphNode {
                                container: frame.container,
                                depends_on: frame.depends_on,
                                is_root: frame.is_root,
                            },
                        );
                    }
                }
            }
        }

        Ok(Self {
            task_name: task.name.clone(),
            root: task.container.clone(),
            nodes,
        })
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// The task's main container.
    pub fn root_node(&self) -> &GraphNode {
        &self.nodes[&self.root]
    }

    pub fn is_root(&self, name: &str) -> bool {
        self.root == name
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn node_for(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate dependencies of a container.
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<ContainerName> {
        self.nodes
            .get(name)
            .map(|n| n.depends_on.clone())
            .unwrap_or_default()
    }

    /// Immediate dependents of a container: every node whose `depends_on`
    /// contains `name`. Derived on demand from the other nodes.
    pub fn dependents_of(&self, name: &str) -> BTreeSet<ContainerName> {
        self.nodes
            .values()
            .filter(|n| n.depends_on.contains(name))
            .map(|n| n.container.name.clone())
            .collect()
    }

    /// One valid startup order: every container after all its dependencies.
    pub fn startup_order(&self) -> Vec<ContainerName> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }

        for node in self.nodes.values() {
            for dep in node.depends_on.iter() {
                graph.add_edge(dep.as_str(), node.name(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(str::to_string).collect(),
            // Unreachable: construction rejects cycles.
            Err(_) => self.nodes.keys().cloned().collect(),
        }
    }
}

fn find_container<'a>(
    containers: &'a BTreeMap<ContainerName, Container>,
    name: &str,
    referenced_by: &str,
) -> Result<&'a Container, GraphError> {
    containers
        .get(name)
        .ok_or_else(|| GraphError::ContainerDoesNotExist {
            container: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })
}

fn resolve_dependencies(
    container: &Container,
    containers: &BTreeMap<ContainerName, Container>,
) -> Result<BTreeSet<ContainerName>, GraphError> {
    if container.dependencies.contains(&container.name) {
        return Err(GraphError::SelfDependency {
            container: container.name.clone(),
        });
    }

    let referenced_by = format!("container '{}'", container.name);
    for name in &container.dependencies {
        find_container(containers, name, &referenced_by)?;
    }

    Ok(container.dependencies.clone())
}

/// `path` starts at the main container and ends with the container that
/// closed the cycle.
fn cycle_error(task: &Task, path: &[ContainerName]) -> GraphError {
    let via_task_dependency = path
        .get(1)
        .is_some_and(|first| task.dependencies.contains(first));

    let description = if via_task_dependency {
        describe_task_dependency_cycle(task, path)
    } else {
        describe_container_dependency_cycle(path)
    };

    GraphError::DependencyCycle {
        task: task.name.clone(),
        description,
    }
}

fn describe_task_dependency_cycle(task: &Task, path: &[ContainerName]) -> String {
    let names: Vec<String> = path[1..].iter().map(|n| format!("'{n}'")).collect();
    let last_index = names.len() - 1;

    let first = format!(
        "Container {} (which is explicitly started by the task)",
        names[0]
    );
    let last = if path[path.len() - 1] == task.container {
        format!("the task container {}", names[last_index])
    } else {
        names[last_index].clone()
    };

    let middle = &names[1..last_index];

    let outgoing = std::iter::once(first).chain(middle.iter().cloned());
    let incoming = middle.iter().cloned().chain(std::iter::once(last));

    let clauses: Vec<String> = outgoing
        .zip(incoming)
        .map(|(from, to)| format!("{from} depends on {to}"))
        .collect();

    format!("{}.", clauses.join(", and "))
}

fn describe_container_dependency_cycle(path: &[ContainerName]) -> String {
    let names: Vec<String> = path.iter().map(|n| format!("'{n}'")).collect();
    format!(
        "Container {} depends on {}.",
        names[0],
        names[1..].join(", which depends on ")
    )
}
