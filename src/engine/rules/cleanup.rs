// src/engine/rules/cleanup.rs

//! Rules for tearing down what the task created.
//!
//! Ordering between cleanup steps comes entirely from these preconditions:
//! dependents stop before their dependencies, containers are removed before
//! the containers they depend on, and the network goes last.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::engine::events::EventHistory;
use crate::engine::rules::RuleEvaluation;
use crate::engine::steps::TaskStep;
use crate::types::{ContainerHandle, ContainerName, NetworkHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopContainerStepRule {
    pub container: ContainerName,
    pub handle: ContainerHandle,
    /// Started dependents of this container.
    pub must_stop_first: BTreeSet<ContainerName>,
}

impl StopContainerStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        if !self.must_stop_first.iter().all(|c| history.has_stopped(c)) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::StopContainer {
            container: self.container.clone(),
            handle: self.handle.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveContainerStepRule {
    pub container: ContainerName,
    pub handle: ContainerHandle,
    pub was_started: bool,
    /// Created dependents of this container.
    pub must_be_removed_first: BTreeSet<ContainerName>,
}

impl RemoveContainerStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        if self.was_started && !history.has_stopped(&self.container) {
            return RuleEvaluation::NotReady;
        }

        // A failed removal of a dependent must not strand its dependencies.
        if !self
            .must_be_removed_first
            .iter()
            .all(|c| history.removal_attempted(c))
        {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::RemoveContainer {
            container: self.container.clone(),
            handle: self.handle.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNetworkStepRule {
    pub network: NetworkHandle,
    pub must_be_removed_first: BTreeSet<ContainerName>,
}

impl DeleteNetworkStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        if !self
            .must_be_removed_first
            .iter()
            .all(|c| history.has_been_removed(c))
        {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::DeleteNetwork {
            network: self.network.clone(),
        })
    }
}

fn removed_if_needed(history: &EventHistory, container: Option<&ContainerName>) -> bool {
    container.is_none_or(|c| history.has_been_removed(c))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTemporaryFileStepRule {
    pub path: PathBuf,
    pub must_be_removed_first: Option<ContainerName>,
}

impl DeleteTemporaryFileStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        if !removed_if_needed(history, self.must_be_removed_first.as_ref()) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::DeleteTemporaryFile {
            path: self.path.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTemporaryDirectoryStepRule {
    pub path: PathBuf,
    pub must_be_removed_first: Option<ContainerName>,
}

impl DeleteTemporaryDirectoryStepRule {
    pub fn evaluate(&self, history: &EventHistory) -> RuleEvaluation {
        if !removed_if_needed(history, self.must_be_removed_first.as_ref()) {
            return RuleEvaluation::NotReady;
        }

        RuleEvaluation::Ready(TaskStep::DeleteTemporaryDirectory {
            path: self.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::TaskEvent;

    fn names(items: &[&str]) -> BTreeSet<ContainerName> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn stopped(name: &str) -> TaskEvent {
        TaskEvent::ContainerStopped {
            container: name.to_string(),
        }
    }

    fn removed(name: &str) -> TaskEvent {
        TaskEvent::ContainerRemoved {
            container: name.to_string(),
        }
    }

    #[test]
    fn stop_waits_for_dependents() {
        let rule = StopContainerStepRule {
            container: "db".to_string(),
            handle: ContainerHandle("c-db".to_string()),
            must_stop_first: names(&["api"]),
        };

        assert_eq!(rule.evaluate(&EventHistory::new()), RuleEvaluation::NotReady);

        let history: EventHistory = [stopped("api")].into_iter().collect();
        assert!(rule.evaluate(&history).is_ready());
    }

    #[test]
    fn exited_dependent_counts_as_stopped() {
        let rule = StopContainerStepRule {
            container: "api".to_string(),
            handle: ContainerHandle("c-api".to_string()),
            must_stop_first: names(&["web"]),
        };
        let history: EventHistory = [TaskEvent::ContainerExited {
            container: "web".to_string(),
            exit_code: 2,
        }]
        .into_iter()
        .collect();

        assert!(rule.evaluate(&history).is_ready());
    }

    #[test]
    fn remove_of_unstarted_container_does_not_wait_for_stop() {
        let rule = RemoveContainerStepRule {
            container: "db".to_string(),
            handle: ContainerHandle("c-db".to_string()),
            was_started: false,
            must_be_removed_first: BTreeSet::new(),
        };

        assert!(rule.evaluate(&EventHistory::new()).is_ready());
    }

    #[test]
    fn remove_of_started_container_waits_for_stop_and_dependents() {
        let rule = RemoveContainerStepRule {
            container: "db".to_string(),
            handle: ContainerHandle("c-db".to_string()),
            was_started: true,
            must_be_removed_first: names(&["api"]),
        };
        let mut history = EventHistory::new();
        assert!(!rule.evaluate(&history).is_ready());

        history.push(stopped("db"));
        assert!(!rule.evaluate(&history).is_ready());

        history.push(TaskEvent::ContainerRemovalFailed {
            container: "api".to_string(),
            message: "in use".to_string(),
        });
        assert!(rule.evaluate(&history).is_ready());
    }

    #[test]
    fn network_waits_for_every_container() {
        let rule = DeleteNetworkStepRule {
            network: NetworkHandle("net".to_string()),
            must_be_removed_first: names(&["api", "db"]),
        };
        let mut history: EventHistory = [removed("api")].into_iter().collect();
        assert!(!rule.evaluate(&history).is_ready());

        history.push(removed("db"));
        assert_eq!(
            rule.evaluate(&history),
            RuleEvaluation::Ready(TaskStep::DeleteNetwork {
                network: NetworkHandle("net".to_string()),
            })
        );
    }

    #[test]
    fn temporary_file_waits_for_owning_container() {
        let rule = DeleteTemporaryFileStepRule {
            path: PathBuf::from("/tmp/env-api"),
            must_be_removed_first: Some("api".to_string()),
        };
        assert!(!rule.evaluate(&EventHistory::new()).is_ready());

        let history: EventHistory = [removed("api")].into_iter().collect();
        assert!(rule.evaluate(&history).is_ready());

        let unowned = DeleteTemporaryDirectoryStepRule {
            path: PathBuf::from("/tmp/dir"),
            must_be_removed_first: None,
        };
        assert!(unowned.evaluate(&EventHistory::new()).is_ready());
    }
}
