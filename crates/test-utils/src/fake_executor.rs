use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use convoy::engine::{CancellationToken, TaskEvent, TaskStep};
use convoy::exec::{StepExecutor, StepFuture};
use convoy::types::{ContainerHandle, ImageRef, NetworkHandle};

type StepPredicate = Arc<dyn Fn(&TaskStep) -> bool + Send + Sync>;

/// Exit code reported for a main container stopped by cancellation.
pub const CANCELLED_EXIT_CODE: i32 = 137;

#[derive(Clone)]
enum Behaviour {
    /// Report the step's failure event.
    Fail(StepPredicate, String),
    /// Return `Err` from the executor.
    Error(StepPredicate, String),
    Panic(StepPredicate),
    /// Hold matching steps until the named step has completed.
    HoldUntil(StepPredicate, String),
}

#[derive(Default)]
struct Recorded {
    executed: Vec<TaskStep>,
    completed: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

/// A fake step executor that:
/// - records which steps were executed, and how many ran at once
/// - reports the events a healthy container runtime would report
/// - can be told to fail, error or panic on chosen steps
#[derive(Clone, Default)]
pub struct FakeStepExecutor {
    recorded: Arc<Mutex<Recorded>>,
    behaviours: Vec<Behaviour>,
    main_exit_code: i32,
    block_main_until_cancelled: bool,
    environment_files: bool,
    delay: Option<Duration>,
}

impl FakeStepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_main_exit_code(mut self, code: i32) -> Self {
        self.main_exit_code = code;
        self
    }

    /// The main container keeps running until the task is cancelled.
    pub fn block_main_until_cancelled(mut self) -> Self {
        self.block_main_until_cancelled = true;
        self
    }

    /// Every created container reports an environment file.
    pub fn with_environment_files(mut self) -> Self {
        self.environment_files = true;
        self
    }

    /// Every step takes at least this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_when<F>(mut self, predicate: F, message: &str) -> Self
    where
        F: Fn(&TaskStep) -> bool + Send + Sync + 'static,
    {
        self.behaviours
            .push(Behaviour::Fail(Arc::new(predicate), message.to_string()));
        self
    }

    pub fn error_when<F>(mut self, predicate: F, message: &str) -> Self
    where
        F: Fn(&TaskStep) -> bool + Send + Sync + 'static,
    {
        self.behaviours
            .push(Behaviour::Error(Arc::new(predicate), message.to_string()));
        self
    }

    pub fn panic_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TaskStep) -> bool + Send + Sync + 'static,
    {
        self.behaviours.push(Behaviour::Panic(Arc::new(predicate)));
        self
    }

    /// Matching steps don't start their work until `gate` (rendered like
    /// `wait-for-healthy(db)`) has completed, or the task is cancelled.
    pub fn hold_until<F>(mut self, predicate: F, gate: &str) -> Self
    where
        F: Fn(&TaskStep) -> bool + Send + Sync + 'static,
    {
        self.behaviours
            .push(Behaviour::HoldUntil(Arc::new(predicate), gate.to_string()));
        self
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn executed(&self) -> Vec<TaskStep> {
        self.recorded().executed.clone()
    }

    /// Executed steps rendered like `create-container(db)`.
    pub fn executed_names(&self) -> Vec<String> {
        self.executed().iter().map(ToString::to_string).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.recorded().max_in_flight
    }

    async fn perform(&self, step: TaskStep, cancel: CancellationToken) -> anyhow::Result<Vec<TaskEvent>> {
        {
            let mut recorded = self.recorded();
            recorded.executed.push(step.clone());
            recorded.in_flight += 1;
            recorded.max_in_flight = recorded.max_in_flight.max(recorded.in_flight);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.hold(&step, &cancel).await;
        let result = self.outcome(&step, &cancel).await;

        let mut recorded = self.recorded();
        recorded.in_flight -= 1;
        recorded.completed.push(step.to_string());
        drop(recorded);
        result
    }

    async fn hold(&self, step: &TaskStep, cancel: &CancellationToken) {
        for behaviour in &self.behaviours {
            let Behaviour::HoldUntil(predicate, gate) = behaviour else {
                continue;
            };
            if !predicate(step) {
                continue;
            }

            let gate_passed = async {
                while !self.recorded().completed.iter().any(|s| s == gate) {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            };
            tokio::select! {
                _ = gate_passed => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    async fn outcome(
        &self,
        step: &TaskStep,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<TaskEvent>> {
        for behaviour in &self.behaviours {
            match behaviour {
                Behaviour::Fail(predicate, message) if predicate(step) => {
                    return Ok(vec![step.failure_event(message.clone())]);
                }
                Behaviour::Error(predicate, message) if predicate(step) => {
                    anyhow::bail!("{message}");
                }
                Behaviour::Panic(predicate) if predicate(step) => {
                    panic!("fake executor told to panic on {step}");
                }
                _ => {}
            }
        }

        if let TaskStep::RunMainContainer { container, .. } = step {
            if self.block_main_until_cancelled {
                cancel.cancelled().await;
                return Ok(vec![
                    TaskEvent::ContainerStarted {
                        container: container.clone(),
                    },
                    TaskEvent::ContainerExited {
                        container: container.clone(),
                        exit_code: CANCELLED_EXIT_CODE,
                    },
                ]);
            }
        }

        let mut events = Vec::new();
        if let TaskStep::CreateContainer { container, .. } = step {
            if self.environment_files {
                events.push(TaskEvent::TemporaryFileCreated {
                    container: container.name.clone(),
                    path: environment_file_for(&container.name),
                });
            }
        }
        events.extend(fake_events_for(step, self.main_exit_code));
        Ok(events)
    }
}

impl StepExecutor for FakeStepExecutor {
    fn execute(&self, step: TaskStep, cancel: CancellationToken) -> StepFuture<'_> {
        Box::pin(self.perform(step, cancel))
    }
}

pub fn environment_file_for(container: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/convoy-{container}.env"))
}

/// Events a healthy container runtime reports for `step`.
pub fn fake_events_for(step: &TaskStep, main_exit_code: i32) -> Vec<TaskEvent> {
    match step {
        TaskStep::BuildImage { container, .. } => vec![TaskEvent::ImageBuilt {
            container: container.clone(),
            image: ImageRef(format!("image-{container}")),
        }],
        TaskStep::PullImage { container, image } => vec![TaskEvent::ImagePulled {
            container: container.clone(),
            image: ImageRef(image.clone()),
        }],
        TaskStep::CreateNetwork => vec![TaskEvent::NetworkCreated {
            network: NetworkHandle("fake-network".to_string()),
        }],
        TaskStep::CreateContainer { container, .. } => vec![TaskEvent::ContainerCreated {
            container: container.name.clone(),
            handle: ContainerHandle(format!("fake-{}", container.name)),
        }],
        TaskStep::StartContainer { container, .. } => vec![TaskEvent::ContainerStarted {
            container: container.clone(),
        }],
        TaskStep::WaitForHealthy { container, .. } => vec![TaskEvent::ContainerBecameHealthy {
            container: container.clone(),
        }],
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
