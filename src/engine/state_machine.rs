// src/engine/state_machine.rs

//! Pure task state machine.
//!
//! Consumes [`TaskEvent`]s and hands out [`TaskStep`]s. It owns the event
//! history, the pending rules and the ready queue, and performs no IO; the
//! async runner (`engine::runner`) is the only thing that drives it.

use std::collections::{BTreeSet, VecDeque};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dag::{DependencyGraph, ImageSource};
use crate::engine::cleanup_planner::{manual_cleanup_instructions, plan_cleanup};
use crate::engine::events::{EventHistory, TaskEvent};
use crate::engine::reactions::{ReactionContext, ReactionRegistry};
use crate::engine::rules::{
    BuildImageStepRule, CreateNetworkStepRule, PullImageStepRule, RuleEvaluation, StepRule,
};
use crate::engine::steps::{StepPhase, TaskStep};
use crate::types::CleanupPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    /// Nothing is ready, nothing is running, and the task is not over.
    #[error(
        "No steps are ready to run and no steps are running, but the task has not finished (pending: {})",
        pending.join(", ")
    )]
    NoStepsReady { pending: Vec<String> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateMachineOptions {
    pub cleanup_after_failure: CleanupPolicy,
}

/// Where the task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Run,
    Cleanup,
    Finished,
}

#[derive(Debug)]
pub struct TaskStateMachine {
    graph: DependencyGraph,
    options: StateMachineOptions,
    reactions: ReactionRegistry,
    history: EventHistory,
    pending: Vec<StepRule>,
    ready: VecDeque<TaskStep>,
    /// Rules ever added, by display name; a rule is only ever added once.
    issued: BTreeSet<String>,
    stage: Stage,
    failed: bool,
    cleanup_skipped: bool,
}

impl TaskStateMachine {
    pub fn new(graph: DependencyGraph, options: StateMachineOptions) -> Self {
        Self::with_reactions(graph, options, ReactionRegistry::default())
    }

    pub fn with_reactions(
        graph: DependencyGraph,
        options: StateMachineOptions,
        reactions: ReactionRegistry,
    ) -> Self {
        let mut machine = Self {
            graph,
            options,
            reactions,
            history: EventHistory::new(),
            pending: Vec::new(),
            ready: VecDeque::new(),
            issued: BTreeSet::new(),
            stage: Stage::Run,
            failed: false,
            cleanup_skipped: false,
        };

        let mut seed: Vec<StepRule> = machine
            .graph
            .all_nodes()
            .map(|node| {
                let container = node.name().to_string();
                match &node.container().image_source {
                    ImageSource::Build { directory } => BuildImageStepRule {
                        container,
                        directory: directory.clone(),
                    }
                    .into(),
                    ImageSource::Pull { image } => PullImageStepRule {
                        container,
                        image: image.clone(),
                    }
                    .into(),
                }
            })
            .collect();
        seed.push(CreateNetworkStepRule.into());

        for rule in seed {
            machine.add_rule(rule);
        }
        machine.promote_ready_rules();
        machine
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    /// Record `event`, add any rules it makes necessary, and queue every rule
    /// that became ready.
    pub fn post_event(&mut self, event: TaskEvent) {
        debug!(?event, stage = ?self.stage, "posting event");

        let is_failure = event.is_failure();
        self.history.push(event.clone());

        match self.stage {
            Stage::Run if is_failure => {
                if !self.failed {
                    warn!(
                        task = %self.graph.task_name(),
                        "task failed during setup, abandoning remaining setup work"
                    );
                }
                self.failed = true;
                self.pending.clear();
                self.ready.retain(|step| step.phase() != StepPhase::Setup);
            }
            Stage::Run if !self.failed => {
                let ctx = ReactionContext { graph: &self.graph };
                let rules = self.reactions.react(&event, &ctx);
                for rule in rules {
                    self.add_rule(rule);
                }
            }
            Stage::Cleanup if is_failure => {
                // Remaining cleanup still runs; the task just cannot succeed.
                self.failed = true;
            }
            _ => {}
        }

        self.promote_ready_rules();
    }

    /// Next step to dispatch.
    ///
    /// `Ok(None)` means "nothing right now, wait for a running step to
    /// report back" (or, once finished, that there is nothing left at all).
    pub fn pop_next_step(
        &mut self,
        steps_still_running: bool,
    ) -> Result<Option<TaskStep>, StateMachineError> {
        loop {
            if let Some(step) = self.ready.pop_front() {
                return Ok(Some(step));
            }

            if steps_still_running {
                return Ok(None);
            }

            match self.stage {
                Stage::Run => {
                    let root = self.graph.root_node().name();
                    if self.failed || self.history.has_exited(root) {
                        self.begin_cleanup();
                        continue;
                    }

                    return Err(StateMachineError::NoStepsReady {
                        pending: self.pending.iter().map(ToString::to_string).collect(),
                    });
                }
                Stage::Cleanup => {
                    self.stage = Stage::Finished;
                    return Ok(Some(self.terminal_step()));
                }
                Stage::Finished => return Ok(None),
            }
        }
    }

    fn add_rule(&mut self, rule: StepRule) {
        if self.issued.insert(rule.to_string()) {
            self.pending.push(rule);
        } else {
            debug!(%rule, "ignoring duplicate rule");
        }
    }

    fn promote_ready_rules(&mut self) {
        let history = &self.history;
        let ready = &mut self.ready;

        self.pending.retain(|rule| match rule.evaluate(history) {
            RuleEvaluation::Ready(step) => {
                debug!(%step, "step ready");
                ready.push_back(step);
                false
            }
            RuleEvaluation::NotReady => true,
        });
    }

    fn skip_cleanup(&self) -> bool {
        self.failed
            && self.options.cleanup_after_failure == CleanupPolicy::DontCleanup
            && !self.history.created_containers().is_empty()
    }

    fn begin_cleanup(&mut self) {
        self.stage = Stage::Cleanup;
        self.pending.clear();

        if self.skip_cleanup() {
            self.cleanup_skipped = true;
            info!(
                task = %self.graph.task_name(),
                "leaving created resources in place for inspection"
            );
            return;
        }

        let plan = plan_cleanup(&self.graph, &self.history);
        info!(
            task = %self.graph.task_name(),
            steps = plan.len(),
            failed = self.failed,
            "starting cleanup"
        );
        for rule in plan {
            self.add_rule(rule);
        }
        self.promote_ready_rules();
    }

    fn terminal_step(&self) -> TaskStep {
        if !self.failed {
            let root = self.graph.root_node().name();
            let exit_code = self.history.exit_code_of(root).unwrap_or_default();
            return TaskStep::FinishTask { exit_code };
        }

        let mut lines: Vec<String> = self
            .history
            .failures()
            .filter_map(TaskEvent::failure_description)
            .collect();

        if self.cleanup_skipped {
            lines.push(
                "Cleanup after failure is disabled, so the created containers were left in place."
                    .to_string(),
            );
        }

        TaskStep::ReportFailure {
            message: lines.join("\n"),
            manual_cleanup_instructions: manual_cleanup_instructions(&self.history),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::dag::{Container, Task};
    use crate::types::{ContainerHandle, ImageRef, NetworkHandle};

    fn build(containers: Vec<Container>, task: Task) -> DependencyGraph {
        let map: BTreeMap<_, _> = containers
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        DependencyGraph::build(&task, &map).expect("graph")
    }

    fn chain() -> DependencyGraph {
        build(
            vec![
                Container::from_image("db", "postgres"),
                Container::from_build_directory("api", "api").depends_on(["db"]),
                Container::from_image("web", "nginx").depends_on(["api"]),
            ],
            Task::new("serve", "web"),
        )
    }

    /// Successful outcome of each step, the way a well-behaved runtime would
    /// report it.
    fn events_for(step: &TaskStep, main_exit_code: i32) -> Vec<TaskEvent> {
        match step {
            TaskStep::BuildImage { container, .. } => vec![TaskEvent::ImageBuilt {
                container: container.clone(),
                image: ImageRef(format!("img-{container}")),
            }],
            TaskStep::PullImage { container, image } => vec![TaskEvent::ImagePulled {
                container: container.clone(),
                image: ImageRef(image.clone()),
            }],
            TaskStep::CreateNetwork => vec![TaskEvent::NetworkCreated {
                network: NetworkHandle("net".to_string()),
            }],
            TaskStep::CreateContainer { container, .. } => vec![TaskEvent::ContainerCreated {
                container: container.name.clone(),
                handle: ContainerHandle(format!("c-{}", container.name)),
            }],
            TaskStep::StartContainer { container, .. } => vec![TaskEvent::ContainerStarted {
                container: container.clone(),
            }],
            TaskStep::WaitForHealthy { container, .. } => {
                vec![TaskEvent::ContainerBecameHealthy {
                    container: container.clone(),
                }]
            }
            TaskStep::RunMainContainer { container, .. } => vec![
                TaskEvent::ContainerStarted {
                    container: container.clone(),
                },
                TaskEvent::ContainerExited {
                    container: container.clone(),
                    exit_code: main_exit_code,
                },
            ],
            TaskStep::StopContainer { container, .. } => vec![TaskEvent::ContainerStopped {
                container: container.clone(),
            }],
            TaskStep::RemoveContainer { container, .. } => vec![TaskEvent::ContainerRemoved {
                container: container.clone(),
            }],
            TaskStep::DeleteNetwork { .. } => vec![TaskEvent::NetworkDeleted],
            TaskStep::DeleteTemporaryFile { path } => {
                vec![TaskEvent::TemporaryFileDeleted { path: path.clone() }]
            }
            TaskStep::DeleteTemporaryDirectory { path } => {
                vec![TaskEvent::TemporaryDirectoryDeleted { path: path.clone() }]
            }
            TaskStep::FinishTask { .. } | TaskStep::ReportFailure { .. } => Vec::new(),
        }
    }

    /// Run steps one at a time until the terminal step, letting `outcome`
    /// override the events of individual steps.
    fn drive<F>(machine: &mut TaskStateMachine, mut outcome: F) -> (Vec<TaskStep>, TaskStep)
    where
        F: FnMut(&TaskStep) -> Option<Vec<TaskEvent>>,
    {
        let mut executed = Vec::new();
        loop {
            let step = machine
                .pop_next_step(false)
                .expect("no stall")
                .expect("a step while not finished");
            if step.is_terminal() {
                return (executed, step);
            }
            let events = outcome(&step).unwrap_or_else(|| events_for(&step, 0));
            executed.push(step);
            for event in events {
                machine.post_event(event);
            }
        }
    }

    fn position(steps: &[TaskStep], rendered: &str) -> usize {
        steps
            .iter()
            .position(|s| s.to_string() == rendered)
            .unwrap_or_else(|| panic!("{rendered} was never executed: {steps:?}"))
    }

    #[test]
    fn seeds_images_and_network() {
        let mut machine = TaskStateMachine::new(chain(), StateMachineOptions::default());
        let mut seeded = Vec::new();
        while let Some(step) = machine.pop_next_step(true).expect("no stall") {
            seeded.push(step.to_string());
        }
        seeded.sort();

        assert_eq!(
            seeded,
            vec![
                "build-image(api)",
                "create-network",
                "pull-image(db)",
                "pull-image(web)",
            ]
        );
    }

    #[test]
    fn linear_chain_starts_dependencies_first_and_stops_dependents_first() {
        let mut machine = TaskStateMachine::new(chain(), StateMachineOptions::default());

        let (steps, terminal) = drive(&mut machine, |_| None);

        assert_eq!(terminal, TaskStep::FinishTask { exit_code: 0 });
        assert!(position(&steps, "create-container(db)") < position(&steps, "create-container(api)"));
        assert!(position(&steps, "create-container(api)") < position(&steps, "create-container(web)"));
        assert!(position(&steps, "stop-container(api)") < position(&steps, "stop-container(db)"));
        assert!(position(&steps, "remove-container(web)") < position(&steps, "remove-container(api)"));
        assert!(position(&steps, "remove-container(api)") < position(&steps, "remove-container(db)"));
        assert!(position(&steps, "remove-container(db)") < position(&steps, "delete-network(net)"));
        assert!(!steps.iter().any(|s| s.to_string() == "stop-container(web)"));
    }

    #[test]
    fn main_exit_code_is_the_task_exit_code() {
        let graph = build(vec![Container::from_image("app", "alpine")], Task::new("t", "app"));
        let mut machine = TaskStateMachine::new(graph, StateMachineOptions::default());

        let (_, terminal) = drive(&mut machine, |step| match step {
            TaskStep::RunMainContainer { .. } => Some(events_for(step, 42)),
            _ => None,
        });

        assert_eq!(terminal, TaskStep::FinishTask { exit_code: 42 });
    }

    #[test]
    fn build_failure_skips_dependents_and_cleans_up() {
        let mut machine = TaskStateMachine::new(chain(), StateMachineOptions::default());

        let (steps, terminal) = drive(&mut machine, |step| match step {
            TaskStep::BuildImage { container, .. } => Some(vec![TaskEvent::ImageBuildFailed {
                container: container.clone(),
                message: "Dockerfile not found".to_string(),
            }]),
            _ => None,
        });

        // The queued pulls and the network creation were dropped with the
        // rest of the setup work, so there is nothing to clean up.
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].to_string(), "build-image(api)");
        match terminal {
            TaskStep::ReportFailure {
                message,
                manual_cleanup_instructions,
            } => {
                assert!(message.contains("Could not build image for container 'api'"));
                assert!(manual_cleanup_instructions.is_empty());
            }
            other => panic!("expected failure report, got {other}"),
        }
    }

    #[test]
    fn failure_waits_for_running_steps_before_cleanup() {
        let graph = build(
            vec![
                Container::from_image("db", "postgres"),
                Container::from_image("app", "alpine").depends_on(["db"]),
            ],
            Task::new("t", "app"),
        );
        let mut machine = TaskStateMachine::new(graph, StateMachineOptions::default());

        let mut in_flight = Vec::new();
        while let Some(step) = machine.pop_next_step(true).expect("no stall") {
            in_flight.push(step);
        }
        assert_eq!(in_flight.len(), 3);

        machine.post_event(TaskEvent::ImagePullFailed {
            container: "app".to_string(),
            message: "not found".to_string(),
        });
        // The network is still being created.
        assert_eq!(machine.pop_next_step(true).expect("no stall"), None);
        assert_eq!(machine.stage(), Stage::Run);

        machine.post_event(TaskEvent::NetworkCreated {
            network: NetworkHandle("net".to_string()),
        });
        machine.post_event(TaskEvent::ImagePulled {
            container: "db".to_string(),
            image: ImageRef("postgres".to_string()),
        });

        let next = machine.pop_next_step(false).expect("no stall");
        assert_eq!(
            next,
            Some(TaskStep::DeleteNetwork {
                network: NetworkHandle("net".to_string())
            })
        );
        assert_eq!(machine.stage(), Stage::Cleanup);
    }

    #[test]
    fn dont_cleanup_reports_every_leftover() {
        let graph = build(
            vec![
                Container::from_image("db", "postgres"),
                Container::from_image("app", "alpine").depends_on(["db"]),
            ],
            Task::new("t", "app"),
        );
        let options = StateMachineOptions {
            cleanup_after_failure: CleanupPolicy::DontCleanup,
        };
        let mut machine = TaskStateMachine::new(graph, options);

        let (steps, terminal) = drive(&mut machine, |step| match step {
            TaskStep::WaitForHealthy { container, .. } => {
                Some(vec![TaskEvent::ContainerDidNotBecomeHealthy {
                    container: container.clone(),
                    message: "unhealthy".to_string(),
                }])
            }
            _ => None,
        });

        assert!(!steps.iter().any(|s| s.phase() == StepPhase::Cleanup));
        match terminal {
            TaskStep::ReportFailure {
                message,
                manual_cleanup_instructions,
            } => {
                assert!(message.contains("did not become healthy"));
                assert!(message.contains("Cleanup after failure is disabled"));
                assert_eq!(
                    manual_cleanup_instructions,
                    vec![
                        "docker rm --force c-db".to_string(),
                        "docker network rm net".to_string(),
                    ]
                );
            }
            other => panic!("expected failure report, got {other}"),
        }
    }

    #[test]
    fn cleanup_failure_is_reported_with_instructions() {
        let graph = build(vec![Container::from_image("app", "alpine")], Task::new("t", "app"));
        let mut machine = TaskStateMachine::new(graph, StateMachineOptions::default());

        let (steps, terminal) = drive(&mut machine, |step| match step {
            TaskStep::RemoveContainer { container, .. } => {
                Some(vec![TaskEvent::ContainerRemovalFailed {
                    container: container.clone(),
                    message: "device busy".to_string(),
                }])
            }
            _ => None,
        });

        assert!(!steps.iter().any(|s| matches!(s, TaskStep::DeleteNetwork { .. })));
        match terminal {
            TaskStep::ReportFailure {
                manual_cleanup_instructions,
                ..
            } => assert_eq!(
                manual_cleanup_instructions,
                vec![
                    "docker rm --force c-app".to_string(),
                    "docker network rm net".to_string(),
                ]
            ),
            other => panic!("expected failure report, got {other}"),
        }
    }

    #[test]
    fn temporary_files_are_deleted_after_their_container() {
        let graph = build(vec![Container::from_image("app", "alpine")], Task::new("t", "app"));
        let mut machine = TaskStateMachine::new(graph, StateMachineOptions::default());
        let env_file = PathBuf::from("/tmp/app.env");

        let (steps, terminal) = drive(&mut machine, |step| match step {
            TaskStep::CreateContainer { container, .. } => Some(vec![
                TaskEvent::TemporaryFileCreated {
                    container: container.name.clone(),
                    path: env_file.clone(),
                },
                TaskEvent::ContainerCreated {
                    container: container.name.clone(),
                    handle: ContainerHandle("c-app".to_string()),
                },
            ]),
            _ => None,
        });

        assert_eq!(terminal, TaskStep::FinishTask { exit_code: 0 });
        assert!(
            position(&steps, "remove-container(app)")
                < position(&steps, "delete-temporary-file(/tmp/app.env)")
        );
    }

    #[test]
    fn stall_is_an_error() {
        let graph = build(vec![Container::from_image("app", "alpine")], Task::new("t", "app"));
        let mut machine = TaskStateMachine::with_reactions(
            graph,
            StateMachineOptions::default(),
            ReactionRegistry::empty(),
        );

        while let Some(step) = machine.pop_next_step(true).expect("no stall") {
            for event in events_for(&step, 0) {
                machine.post_event(event);
            }
        }

        assert!(matches!(
            machine.pop_next_step(false),
            Err(StateMachineError::NoStepsReady { .. })
        ));
    }

    #[test]
    fn finished_machine_hands_out_nothing() {
        let graph = build(vec![Container::from_image("app", "alpine")], Task::new("t", "app"));
        let mut machine = TaskStateMachine::new(graph, StateMachineOptions::default());

        drive(&mut machine, |_| None);

        assert!(machine.is_finished());
        assert_eq!(machine.pop_next_step(false).expect("no stall"), None);
    }
}
