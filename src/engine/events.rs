// src/engine/events.rs

//! Facts reported back by executed steps, and the history they accumulate in.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::types::{ContainerHandle, ContainerName, ImageRef, NetworkHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    ImageBuilt {
        container: ContainerName,
        image: ImageRef,
    },
    ImageBuildFailed {
        container: ContainerName,
        message: String,
    },
    ImagePulled {
        container: ContainerName,
        image: ImageRef,
    },
    ImagePullFailed {
        container: ContainerName,
        message: String,
    },
    NetworkCreated {
        network: NetworkHandle,
    },
    NetworkCreationFailed {
        message: String,
    },
    ContainerCreated {
        container: ContainerName,
        handle: ContainerHandle,
    },
    ContainerCreationFailed {
        container: ContainerName,
        message: String,
    },
    ContainerStarted {
        container: ContainerName,
    },
    ContainerStartFailed {
        container: ContainerName,
        message: String,
    },
    ContainerBecameHealthy {
        container: ContainerName,
    },
    ContainerDidNotBecomeHealthy {
        container: ContainerName,
        message: String,
    },
    ContainerExited {
        container: ContainerName,
        exit_code: i32,
    },
    ContainerRunFailed {
        container: ContainerName,
        message: String,
    },
    ContainerStopped {
        container: ContainerName,
    },
    ContainerStopFailed {
        container: ContainerName,
        message: String,
    },
    ContainerRemoved {
        container: ContainerName,
    },
    ContainerRemovalFailed {
        container: ContainerName,
        message: String,
    },
    NetworkDeleted,
    NetworkDeletionFailed {
        message: String,
    },
    TemporaryFileCreated {
        container: ContainerName,
        path: PathBuf,
    },
    TemporaryFileDeleted {
        path: PathBuf,
    },
    TemporaryFileDeletionFailed {
        path: PathBuf,
        message: String,
    },
    TemporaryDirectoryCreated {
        container: ContainerName,
        path: PathBuf,
    },
    TemporaryDirectoryDeleted {
        path: PathBuf,
    },
    TemporaryDirectoryDeletionFailed {
        path: PathBuf,
        message: String,
    },
    /// A step failed in a way no more specific event describes (for example
    /// the worker running it panicked).
    StepFailed {
        step: String,
        message: String,
    },
    /// The user asked for the task to be cancelled.
    UserInterrupted,
}

impl TaskEvent {
    pub fn is_failure(&self) -> bool {
        self.failure_description().is_some()
    }

    /// Human-readable explanation for failure events.
    pub fn failure_description(&self) -> Option<String> {
        let description = match self {
            TaskEvent::ImageBuildFailed { container, message } => {
                format!("Could not build image for container '{container}': {message}")
            }
            TaskEvent::ImagePullFailed { container, message } => {
                format!("Could not pull image for container '{container}': {message}")
            }
            TaskEvent::NetworkCreationFailed { message } => {
                format!("Could not create network for task: {message}")
            }
            TaskEvent::ContainerCreationFailed { container, message } => {
                format!("Could not create container '{container}': {message}")
            }
            TaskEvent::ContainerStartFailed { container, message } => {
                format!("Could not start container '{container}': {message}")
            }
            TaskEvent::ContainerDidNotBecomeHealthy { container, message } => {
                format!("Container '{container}' did not become healthy: {message}")
            }
            TaskEvent::ContainerRunFailed { container, message } => {
                format!("Could not run container '{container}': {message}")
            }
            TaskEvent::ContainerStopFailed { container, message } => {
                format!("Could not stop container '{container}': {message}")
            }
            TaskEvent::ContainerRemovalFailed { container, message } => {
                format!("Could not remove container '{container}': {message}")
            }
            TaskEvent::NetworkDeletionFailed { message } => {
                format!("Could not delete the task network: {message}")
            }
            TaskEvent::TemporaryFileDeletionFailed { path, message } => format!(
                "Could not delete temporary file '{}': {message}",
                path.display()
            ),
            TaskEvent::TemporaryDirectoryDeletionFailed { path, message } => format!(
                "Could not delete temporary directory '{}': {message}",
                path.display()
            ),
            TaskEvent::StepFailed { step, message } => {
                format!("Step '{step}' failed: {message}")
            }
            TaskEvent::UserInterrupted => "The task was interrupted by the user.".to_string(),
            _ => return None,
        };
        Some(description)
    }
}

/// Ordered, append-only record of everything that has happened in a task run.
#[derive(Debug, Clone, Default)]
pub struct EventHistory {
    events: Vec<TaskEvent>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TaskEvent) {
        self.events.push(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, event: &TaskEvent) -> bool {
        self.events.contains(event)
    }

    pub fn network(&self) -> Option<&NetworkHandle> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::NetworkCreated { network } => Some(network),
            _ => None,
        })
    }

    pub fn image_for(&self, name: &str) -> Option<&ImageRef> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::ImageBuilt { container, image }
            | TaskEvent::ImagePulled { container, image }
                if container == name =>
            {
                Some(image)
            }
            _ => None,
        })
    }

    pub fn container_handle(&self, name: &str) -> Option<&ContainerHandle> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::ContainerCreated { container, handle } if container == name => Some(handle),
            _ => None,
        })
    }

    pub fn has_started(&self, name: &str) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TaskEvent::ContainerStarted { container } if container == name))
    }

    pub fn has_become_healthy(&self, name: &str) -> bool {
        self.events.iter().any(
            |e| matches!(e, TaskEvent::ContainerBecameHealthy { container } if container == name),
        )
    }

    pub fn exit_code_of(&self, name: &str) -> Option<i32> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::ContainerExited {
                container,
                exit_code,
            } if container == name => Some(*exit_code),
            _ => None,
        })
    }

    pub fn has_exited(&self, name: &str) -> bool {
        self.exit_code_of(name).is_some()
    }

    /// Whether the container is known to no longer be running: it was
    /// stopped, or it ran to completion.
    pub fn has_stopped(&self, name: &str) -> bool {
        self.events.iter().any(|e| match e {
            TaskEvent::ContainerStopped { container } | TaskEvent::ContainerExited { container, .. } => {
                container == name
            }
            _ => false,
        })
    }

    pub fn has_been_removed(&self, name: &str) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TaskEvent::ContainerRemoved { container } if container == name))
    }

    /// Removal of the container was attempted, whatever the outcome.
    pub fn removal_attempted(&self, name: &str) -> bool {
        self.events.iter().any(|e| match e {
            TaskEvent::ContainerRemoved { container }
            | TaskEvent::ContainerRemovalFailed { container, .. } => container == name,
            _ => false,
        })
    }

    pub fn network_deleted(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TaskEvent::NetworkDeleted))
    }

    pub fn temporary_file_deleted(&self, path: &Path) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TaskEvent::TemporaryFileDeleted { path: p } if p == path))
    }

    pub fn temporary_directory_deleted(&self, path: &Path) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TaskEvent::TemporaryDirectoryDeleted { path: p } if p == path))
    }

    /// Containers that were created, in creation order.
    pub fn created_containers(&self) -> Vec<(&ContainerName, &ContainerHandle)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::ContainerCreated { container, handle } => Some((container, handle)),
                _ => None,
            })
            .collect()
    }

    pub fn started_containers(&self) -> BTreeSet<&ContainerName> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::ContainerStarted { container } => Some(container),
                _ => None,
            })
            .collect()
    }

    pub fn temporary_files(&self) -> Vec<(&ContainerName, &PathBuf)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::TemporaryFileCreated { container, path } => Some((container, path)),
                _ => None,
            })
            .collect()
    }

    pub fn temporary_directories(&self) -> Vec<(&ContainerName, &PathBuf)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::TemporaryDirectoryCreated { container, path } => Some((container, path)),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskEvent> {
        self.events.iter().filter(|e| e.is_failure())
    }

    pub fn has_failure(&self) -> bool {
        self.failures().next().is_some()
    }
}

impl FromIterator<TaskEvent> for EventHistory {
    fn from_iter<T: IntoIterator<Item = TaskEvent>>(iter: T) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}
