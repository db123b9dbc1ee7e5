// src/engine/cleanup_planner.rs

//! Turns what the history says was created into the rules that tear it down,
//! and into the commands a user needs when it could not be torn down.

use std::collections::BTreeSet;

use crate::dag::DependencyGraph;
use crate::engine::events::EventHistory;
use crate::engine::rules::{
    DeleteNetworkStepRule, DeleteTemporaryDirectoryStepRule, DeleteTemporaryFileStepRule,
    RemoveContainerStepRule, StepRule, StopContainerStepRule,
};
use crate::types::ContainerName;

/// Rules that clean up every resource recorded in `history`.
///
/// Containers that already stopped (including a main container that ran to
/// completion) get no stop rule.
pub fn plan_cleanup(graph: &DependencyGraph, history: &EventHistory) -> Vec<StepRule> {
    let created: BTreeSet<ContainerName> = history
        .created_containers()
        .into_iter()
        .map(|(name, _)| name.clone())
        .collect();
    let started: BTreeSet<ContainerName> =
        history.started_containers().into_iter().cloned().collect();

    let mut rules = Vec::new();

    for (name, handle) in history.created_containers() {
        let dependents = graph.dependents_of(name);
        let was_started = started.contains(name);

        if was_started && !history.has_stopped(name) {
            rules.push(
                StopContainerStepRule {
                    container: name.clone(),
                    handle: handle.clone(),
                    must_stop_first: dependents.intersection(&started).cloned().collect(),
                }
                .into(),
            );
        }

        rules.push(
            RemoveContainerStepRule {
                container: name.clone(),
                handle: handle.clone(),
                was_started,
                must_be_removed_first: dependents.intersection(&created).cloned().collect(),
            }
            .into(),
        );
    }

    for (owner, path) in history.temporary_files() {
        rules.push(
            DeleteTemporaryFileStepRule {
                path: path.clone(),
                must_be_removed_first: created.contains(owner).then(|| owner.clone()),
            }
            .into(),
        );
    }

    for (owner, path) in history.temporary_directories() {
        rules.push(
            DeleteTemporaryDirectoryStepRule {
                path: path.clone(),
                must_be_removed_first: created.contains(owner).then(|| owner.clone()),
            }
            .into(),
        );
    }

    if let Some(network) = history.network() {
        rules.push(
            DeleteNetworkStepRule {
                network: network.clone(),
                must_be_removed_first: created,
            }
            .into(),
        );
    }

    rules
}

/// Commands that remove whatever `history` says is still left over.
pub fn manual_cleanup_instructions(history: &EventHistory) -> Vec<String> {
    let mut instructions = Vec::new();

    for (name, handle) in history.created_containers() {
        if !history.has_been_removed(name) {
            instructions.push(format!("docker rm --force {handle}"));
        }
    }

    for (_, path) in history.temporary_files() {
        if !history.temporary_file_deleted(path) {
            instructions.push(format!("rm {}", path.display()));
        }
    }

    for (_, path) in history.temporary_directories() {
        if !history.temporary_directory_deleted(path) {
            instructions.push(format!("rm -rf {}", path.display()));
        }
    }

    if let Some(network) = history.network() {
        if !history.network_deleted() {
            instructions.push(format!("docker network rm {network}"));
        }
    }

    instructions
}
