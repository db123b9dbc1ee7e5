// src/engine/rules/mod.rs

//! Step rules: pending work waiting for its preconditions.
//!
//! A rule looks at the [`EventHistory`] and either hands back the step it
//! guards or reports that it is not ready yet. Evaluation never mutates
//! anything, and since history only grows, a rule that became ready stays
//! ready.

use std::fmt;

use crate::engine::events::EventHistory;
use crate::engine::steps::TaskStep;

pub mod cleanup;
pub mod run;

pub use cleanup::{
    DeleteNetworkStepRule, DeleteTemporaryDirectoryStepRule, DeleteTemporaryFileStepRule,
    RemoveContainerStepRule, StopContainerStepRule,
};
pub use run::{
    BuildImageStepRule, CreateContainerStepRule, CreateNetworkStepRule, PullImageStepRule,
    RunMainContainerStepRule, StartContainerStepRule, WaitForHealthyStepRule,
};

/// Result of evaluating a rule against the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEvaluation {
    Ready(TaskStep),
    NotReady,
}

impl RuleEvaluation {
    pub fn is_ready(&self) -> bool {
        matches!(self, RuleEvaluation::Ready(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRule {
    BuildImage(BuildImageStepRule),
    PullImage(PullImageStepRule),
    CreateNetwork(CreateNetworkStepRule),
    CreateContainer(CreateContainerStepRule),
    StartContainer(StartContainerStepRule),
    WaitForHealthy(WaitForHealthyStepRule),
    RunMainContainer(RunMainContainerStepRule),
    StopContainer(StopContainerStepRule),
    RemoveContainer(RemoveContainerStepRule),
    DeleteNetwork(DeleteNetworkStepRule),
    DeleteTemporaryFile(DeleteTemporaryFileStepRule),
    DeleteTemporaryDirectory(DeleteTemporaryDirectoryStepRule),
}

impl StepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        match self {
            StepRule::BuildImage(rule) => rule.evaluate(history),
            StepRule::PullImage(rule) => rule.evaluate(history),
            StepRule::CreateNetwork(rule) => rule.evaluate(history),
            StepRule::CreateContainer(rule) => rule.evaluate(history),
            StepRule::StartContainer(rule) => rule.evaluate(history),
            StepRule::WaitForHealthy(rule) => rule.evaluate(history),
            StepRule::RunMainContainer(rule) => rule.evaluate(history),
            StepRule::StopContainer(rule) => rule.evaluate(history),
            StepRule::RemoveContainer(rule) => rule.evaluate(history),
            StepRule::DeleteNetwork(rule) => rule.evaluate(history),
            StepRule::DeleteTemporaryFile(rule) => rule.evaluate(history),
            StepRule::DeleteTemporaryDirectory(rule) => rule.evaluate(history),
        }
    }
}

impl fmt::Display for StepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepRule::BuildImage(rule) => write!(f, "build-image({})", rule.container),
            StepRule::PullImage(rule) => write!(f, "pull-image({})", rule.container),
            StepRule::CreateNetwork(_) => f.write_str("create-network"),
            StepRule::CreateContainer(rule) => {
                write!(f, "create-container({})", rule.container.name)
            }
            StepRule::StartContainer(rule) => write!(f, "start-container({})", rule.container),
            StepRule::WaitForHealthy(rule) => write!(f, "wait-for-healthy({})", rule.container),
            StepRule::RunMainContainer(rule) => {
                write!(f, "run-main-container({})", rule.container)
            }
            StepRule::StopContainer(rule) => write!(f, "stop-container({})", rule.container),
            StepRule::RemoveContainer(rule) => write!(f, "remove-container({})", rule.container),
            StepRule::DeleteNetwork(rule) => write!(f, "delete-network({})", rule.network),
            StepRule::DeleteTemporaryFile(rule) => {
                write!(f, "delete-temporary-file({})", rule.path.display())
            }
            StepRule::DeleteTemporaryDirectory(rule) => {
                write!(f, "delete-temporary-directory({})", rule.path.display())
            }
        }
    }
}

macro_rules! impl_from_rule {
    ($($variant:ident => $rule:ty),* $(,)?) => {
        $(
            impl From<$rule> for StepRule {
                fn from(rule: $rule) -> Self {
                    StepRule::$variant(rule)
                }
            }
        )*
    };
}

impl_from_rule! {
    BuildImage => BuildImageStepRule,
    PullImage => PullImageStepRule,
    CreateNetwork => CreateNetworkStepRule,
    CreateContainer => CreateContainerStepRule,
    StartContainer => StartContainerStepRule,
    WaitForHealthy => WaitForHealthyStepRule,
    RunMainContainer => RunMainContainerStepRule,
    StopContainer => StopContainerStepRule,
    RemoveContainer => RemoveContainerStepRule,
    DeleteNetwork => DeleteNetworkStepRule,
    DeleteTemporaryFile => DeleteTemporaryFileStepRule,
    DeleteTemporaryDirectory => DeleteTemporaryDirectoryStepRule,
}
