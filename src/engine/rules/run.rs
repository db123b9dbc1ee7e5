// src/engine/rules/run.rs

//! Rules for the setup half of a task: images, network, containers.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::dag::Container;
use crate::engine::events::EventHistory;
use crate::engine::rules::RuleEvaluation;
use crate::engine::steps::TaskStep;
use crate::types::{ContainerHandle, ContainerName, ImageRef};

fn all_healthy(history: &EventHistory, containers: &BTreeSet<ContainerName>) -> bool {
    containers.iter().all(|c| history.has_become_healthy(c))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildImageStepRule {
    pub container: ContainerName,
    pub directory: PathBuf,
}

impl BuildImageStepRule {
    pub fn evaluate(&self, _history: &EventHistory) -> RuleEvaluation {
        RuleEvaluation::Ready(TaskStep::BuildImage {
            container: self.container.clone(),
            directory: self.directory.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullImageStepRule {
    pub container: ContainerName,
    pub image: String,
}

impl PullImageStepRule {
    pub fn evaluate(&self, _history: &EventHistory) -> RuleEvaluation {
        RuleEvaluation::Ready(TaskStep::PullImage {
            container: self.container.clone(),
            image: self.image.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateNetworkStepRule;

impl CreateNetworkStepRule {
    pub fn evaluate(&self, _history: &EventHistory) -> RuleEvaluation {
        RuleEvaluation::Ready(TaskStep::CreateNetwork)
    }
}

/// Create a container once the task network exists and every dependency is
/// healthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateContainerStepRule {
    pub container: Container,
    pub image: ImageRef,
    pub dependencies: BTreeSet<ContainerName>,
}

impl CreateContainerStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        let Some(network) = history.network() else {
            return RuleEvaluation::NotReady;
        };

        if !all_healthy(history, &self.dependencies) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::CreateContainer {
            container: self.container.clone(),
            image: self.image.clone(),
            network: network.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartContainerStepRule {
    pub container: ContainerName,
    pub handle: ContainerHandle,
    pub dependencies: BTreeSet<ContainerName>,
}

impl StartContainerStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        if !all_healthy(history, &self.dependencies) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::StartContainer {
            container: self.container.clone(),
            handle: self.handle.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitForHealthyStepRule {
    pub container: ContainerName,
    pub handle: ContainerHandle,
}

impl WaitForHealthyStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        if !history.has_started(&self.container) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::WaitForHealthy {
            container: self.container.clone(),
            handle: self.handle.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMainContainerStepRule {
    pub container: ContainerName,
    pub handle: ContainerHandle,
    pub dependencies: BTreeSet<ContainerName>,
}

impl RunMainContainerStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        if !all_healthy(history, &self.dependencies) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::RunMainContainer {
            container: self.container.clone(),
            handle: self.handle.clone(),
        })
    }
}
