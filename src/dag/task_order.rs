// src/dag/task_order.rs

//! Which tasks run, and in which order, when the user asks for one task.
//!
//! A task's prerequisites run to completion before it, each at most once,
//! depth first in the order they are listed. Prerequisite names may contain
//! `*`, which matches any run of characters; matching tasks are taken in
//! name order.

use std::collections::BTreeMap;

use globset::{Glob, GlobMatcher};
use thiserror::Error;
use tracing::debug;

use crate::dag::Task;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskOrderError {
    #[error("The task '{prerequisite}' given as a prerequisite of '{task}' does not exist.")]
    PrerequisiteDoesNotExist { task: String, prerequisite: String },

    #[error("There is a dependency cycle between tasks: {description}.")]
    DependencyCycle { description: String },

    #[error("The prerequisite '{pattern}' of task '{task}' is not a valid pattern: {message}")]
    InvalidPattern {
        task: String,
        pattern: String,
        message: String,
    },
}

/// Tasks to run for `root`, ending with `root` itself.
pub fn resolve_execution_order(
    tasks: &BTreeMap<String, Task>,
    root: &Task,
) -> Result<Vec<Task>, TaskOrderError> {
    let mut order = Vec::new();
    let mut path = vec![root.name.clone()];
    visit(tasks, root, &mut path, &mut order)?;

    debug!(
        task = %root.name,
        order = ?order.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "resolved task execution order"
    );
    Ok(order)
}

fn visit(
    tasks: &BTreeMap<String, Task>,
    task: &Task,
    path: &mut Vec<String>,
    order: &mut Vec<Task>,
) -> Result<(), TaskOrderError> {
    // Every prerequisite is checked before any of them is visited, so a
    // missing task is reported ahead of problems further down.
    let mut prerequisites = Vec::new();
    for name in expand_wildcards(tasks, task)? {
        let Some(prerequisite) = tasks.get(&name) else {
            return Err(TaskOrderError::PrerequisiteDoesNotExist {
                task: task.name.clone(),
                prerequisite: name,
            });
        };
        if path.contains(&name) {
            let mut cycle = path.clone();
            cycle.push(name);
            return Err(TaskOrderError::DependencyCycle {
                description: describe_cycle(&cycle),
            });
        }
        prerequisites.push(prerequisite);
    }

    for prerequisite in prerequisites {
        if order.iter().any(|t| t.name == prerequisite.name) {
            continue;
        }
        path.push(prerequisite.name.clone());
        visit(tasks, prerequisite, path, order)?;
        path.pop();
    }

    order.push(task.clone());
    Ok(())
}

fn expand_wildcards(
    tasks: &BTreeMap<String, Task>,
    task: &Task,
) -> Result<Vec<String>, TaskOrderError> {
    let mut names = Vec::new();
    for entry in &task.prerequisites {
        if !entry.contains('*') {
            names.push(entry.clone());
            continue;
        }

        let matcher = wildcard_matcher(entry).map_err(|err| TaskOrderError::InvalidPattern {
            task: task.name.clone(),
            pattern: entry.clone(),
            message: err.to_string(),
        })?;
        // BTreeMap keys are already sorted.
        names.extend(tasks.keys().filter(|name| matcher.is_match(name.as_str())).cloned());
    }
    Ok(names)
}

/// Only `*` is special; everything else matches literally.
fn wildcard_matcher(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    let escaped: Vec<String> = pattern.split('*').map(globset::escape).collect();
    Ok(Glob::new(&escaped.join("*"))?.compile_matcher())
}

fn describe_cycle(path: &[String]) -> String {
    let mut description = format!("task '{}' has '{}' as a prerequisite", path[0], path[1]);
    for name in &path[2..] {
        description.push_str(&format!(", which has '{name}' as a prerequisite"));
    }
    description
}
