// src/engine/steps.rs

//! Units of orchestration work.
//!
//! A [`TaskStep`] only describes what to do. The state machine decides when a
//! step may run; an [`crate::exec::StepExecutor`] performs it.

use std::fmt;
use std::path::PathBuf;

use crate::dag::Container;
use crate::engine::events::TaskEvent;
use crate::types::{ContainerHandle, ContainerName, ImageRef, NetworkHandle};

/// Which part of the task a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Setup,
    Cleanup,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStep {
    BuildImage {
        container: ContainerName,
        directory: PathBuf,
    },
    PullImage {
        container: ContainerName,
        image: String,
    },
    CreateNetwork,
    CreateContainer {
        container: Container,
        image: ImageRef,
        network: NetworkHandle,
    },
    StartContainer {
        container: ContainerName,
        handle: ContainerHandle,
    },
    /// Start the main container attached to the console and block until it
    /// exits.
    RunMainContainer {
        container: ContainerName,
        handle: ContainerHandle,
    },
    WaitForHealthy {
        container: ContainerName,
        handle: ContainerHandle,
    },
    StopContainer {
        container: ContainerName,
        handle: ContainerHandle,
    },
    RemoveContainer {
        container: ContainerName,
        handle: ContainerHandle,
    },
    DeleteNetwork {
        network: NetworkHandle,
    },
    DeleteTemporaryFile {
        path: PathBuf,
    },
    DeleteTemporaryDirectory {
        path: PathBuf,
    },
    FinishTask {
        exit_code: i32,
    },
    ReportFailure {
        message: String,
        manual_cleanup_instructions: Vec<String>,
    },
}

impl TaskStep {
    pub fn phase(&self) -> StepPhase {
        match self {
            TaskStep::BuildImage { .. }
            | TaskStep::PullImage { .. }
            | TaskStep::CreateNetwork
            | TaskStep::CreateContainer { .. }
            | TaskStep::StartContainer { .. }
            | TaskStep::RunMainContainer { .. }
            | TaskStep::WaitForHealthy { .. } => StepPhase::Setup,
            TaskStep::StopContainer { .. }
            | TaskStep::RemoveContainer { .. }
            | TaskStep::DeleteNetwork { .. }
            | TaskStep::DeleteTemporaryFile { .. }
            | TaskStep::DeleteTemporaryDirectory { .. } => StepPhase::Cleanup,
            TaskStep::FinishTask { .. } | TaskStep::ReportFailure { .. } => StepPhase::Terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase() == StepPhase::Terminal
    }

    /// Exit code the task ends with once this step runs, for terminal steps.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskStep::FinishTask { exit_code } => Some(*exit_code),
            TaskStep::ReportFailure { .. } => Some(1),
            _ => None,
        }
    }

    /// Short machine-friendly name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskStep::BuildImage { .. } => "build-image",
            TaskStep::PullImage { .. } => "pull-image",
            TaskStep::CreateNetwork => "create-network",
            TaskStep::CreateContainer { .. } => "create-container",
            TaskStep::StartContainer { .. } => "start-container",
            TaskStep::RunMainContainer { .. } => "run-main-container",
            TaskStep::WaitForHealthy { .. } => "wait-for-healthy",
            TaskStep::StopContainer { .. } => "stop-container",
            TaskStep::RemoveContainer { .. } => "remove-container",
            TaskStep::DeleteNetwork { .. } => "delete-network",
            TaskStep::DeleteTemporaryFile { .. } => "delete-temporary-file",
            TaskStep::DeleteTemporaryDirectory { .. } => "delete-temporary-directory",
            TaskStep::FinishTask { .. } => "finish-task",
            TaskStep::ReportFailure { .. } => "report-failure",
        }
    }

    /// The container this step acts on, if any.
    pub fn container(&self) -> Option<&str> {
        match self {
            TaskStep::BuildImage { container, .. }
            | TaskStep::PullImage { container, .. }
            | TaskStep::StartContainer { container, .. }
            | TaskStep::RunMainContainer { container, .. }
            | TaskStep::WaitForHealthy { container, .. }
            | TaskStep::StopContainer { container, .. }
            | TaskStep::RemoveContainer { container, .. } => Some(container),
            TaskStep::CreateContainer { container, .. } => Some(&container.name),
            _ => None,
        }
    }

    /// The event to post when executing this step failed with `message`.
    pub fn failure_event(&self, message: impl Into<String>) -> TaskEvent {
        let message = message.into();
        match self {
            TaskStep::BuildImage { container, .. } => TaskEvent::ImageBuildFailed {
                container: container.clone(),
                message,
            },
            TaskStep::PullImage { container, .. } => TaskEvent::ImagePullFailed {
                container: container.clone(),
                message,
            },
            TaskStep::CreateNetwork => TaskEvent::NetworkCreationFailed { message },
            TaskStep::CreateContainer { container, .. } => TaskEvent::ContainerCreationFailed {
                container: container.name.clone(),
                message,
            },
            TaskStep::StartContainer { container, .. } => TaskEvent::ContainerStartFailed {
                container: container.clone(),
                message,
            },
            TaskStep::RunMainContainer { container, .. } => TaskEvent::ContainerRunFailed {
                container: container.clone(),
                message,
            },
            TaskStep::WaitForHealthy { container, .. } => {
                TaskEvent::ContainerDidNotBecomeHealthy {
                    container: container.clone(),
                    message,
                }
            }
            TaskStep::StopContainer { container, .. } => TaskEvent::ContainerStopFailed {
                container: container.clone(),
                message,
            },
            TaskStep::RemoveContainer { container, .. } => TaskEvent::ContainerRemovalFailed {
                container: container.clone(),
                message,
            },
            TaskStep::DeleteNetwork { .. } => TaskEvent::NetworkDeletionFailed { message },
            TaskStep::DeleteTemporaryFile { path } => TaskEvent::TemporaryFileDeletionFailed {
                path: path.clone(),
                message,
            },
            TaskStep::DeleteTemporaryDirectory { path } => {
                TaskEvent::TemporaryDirectoryDeletionFailed {
                    path: path.clone(),
                    message,
                }
            }
            TaskStep::FinishTask { .. } | TaskStep::ReportFailure { .. } => {
                TaskEvent::StepFailed {
                    step: self.to_string(),
                    message,
                }
            }
        }
    }
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStep::CreateNetwork => f.write_str("create-network"),
            TaskStep::DeleteNetwork { network } => write!(f, "delete-network({network})"),
            TaskStep::DeleteTemporaryFile { path } | TaskStep::DeleteTemporaryDirectory { path } => {
                write!(f, "{}({})", self.kind(), path.display())
            }
            TaskStep::FinishTask { exit_code } => write!(f, "finish-task({exit_code})"),
            TaskStep::ReportFailure { .. } => f.write_str("report-failure"),
            _ => match self.container() {
                Some(container) => write!(f, "{}({container})", self.kind()),
                None => f.write_str(self.kind()),
            },
        }
    }
}
