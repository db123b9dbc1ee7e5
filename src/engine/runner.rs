// src/engine/runner.rs

//! Async shell around [`TaskStateMachine`].
//!
//! The runner is the only owner of the state machine. It pops ready steps,
//! runs each on a worker task through a [`StepExecutor`], and posts the
//! events the workers hand back. Nothing else mutates task state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

use crate::engine::cancellation::CancellationSource;
use crate::engine::events::TaskEvent;
use crate::engine::observer::EventLogger;
use crate::engine::state_machine::{StateMachineError, TaskStateMachine};
use crate::engine::steps::TaskStep;
use crate::errors::Result;
use crate::exec::StepExecutor;

/// Requests from outside the runner loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlMessage {
    CancellationRequested,
}

/// Cheap handle for talking to a running [`ParallelExecutionRunner`].
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl RunnerHandle {
    /// Ask the task to stop. Running steps see their cancellation token fire
    /// and cleanup still happens. Has no effect once the runner is gone.
    pub fn request_cancellation(&self) {
        if self.tx.send(ControlMessage::CancellationRequested).is_err() {
            debug!("cancellation requested after the runner finished");
        }
    }
}

pub struct ParallelExecutionRunner {
    machine: TaskStateMachine,
    executor: Arc<dyn StepExecutor>,
    logger: Arc<dyn EventLogger>,
    max_parallelism: usize,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    cancellation: CancellationSource,
}

impl fmt::Debug for ParallelExecutionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelExecutionRunner")
            .field("machine", &self.machine)
            .field("max_parallelism", &self.max_parallelism)
            .finish_non_exhaustive()
    }
}

impl ParallelExecutionRunner {
    pub fn new(
        machine: TaskStateMachine,
        executor: Arc<dyn StepExecutor>,
        logger: Arc<dyn EventLogger>,
        max_parallelism: usize,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (cancellation, _) = CancellationSource::new();
        Self {
            machine,
            executor,
            logger,
            max_parallelism: max_parallelism.max(1),
            control_tx,
            control_rx,
            cancellation,
        }
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            tx: self.control_tx.clone(),
        }
    }

    /// Run the task to completion and return its exit code.
    pub async fn run(mut self) -> Result<i32> {
        info!(
            task = %self.machine.graph().task_name(),
            max_parallelism = self.max_parallelism,
            "task runner started"
        );

        let mut workers: JoinSet<Vec<TaskEvent>> = JoinSet::new();
        let mut running: HashMap<Id, TaskStep> = HashMap::new();
        let mut exit_code: Option<i32> = None;
        let mut cancelled = false;

        loop {
            while exit_code.is_none() && running.len() < self.max_parallelism {
                let Some(step) = self.machine.pop_next_step(!running.is_empty())? else {
                    break;
                };

                if let Some(code) = step.exit_code() {
                    match &step {
                        TaskStep::ReportFailure {
                            message,
                            manual_cleanup_instructions,
                        } => self.logger.on_task_failed(message, manual_cleanup_instructions),
                        _ => self.logger.on_task_finished(code),
                    }
                    exit_code = Some(code);
                }

                self.dispatch(&mut workers, &mut running, step);
            }

            if running.is_empty() {
                return match exit_code {
                    Some(code) => {
                        info!(exit_code = code, "task runner finished");
                        Ok(code)
                    }
                    None => Err(StateMachineError::NoStepsReady {
                        pending: Vec::new(),
                    }
                    .into()),
                };
            }

            tokio::select! {
                Some(message) = self.control_rx.recv() => match message {
                    ControlMessage::CancellationRequested if !cancelled => {
                        cancelled = true;
                        info!("cancellation requested, stopping task");
                        self.cancellation.cancel();
                        self.post(TaskEvent::UserInterrupted);
                    }
                    ControlMessage::CancellationRequested => {
                        debug!("task already cancelled");
                    }
                },
                Some(joined) = workers.join_next_with_id() => {
                    let events = match joined {
                        Ok((id, events)) => {
                            running.remove(&id);
                            events
                        }
                        Err(err) => {
                            let step = running.remove(&err.id());
                            warn!(error = %err, "step worker did not complete");
                            match step {
                                Some(step) => vec![step.failure_event(format!("worker stopped unexpectedly: {err}"))],
                                None => Vec::new(),
                            }
                        }
                    };

                    for event in events {
                        self.post(event);
                    }
                }
                else => {
                    return Err(StateMachineError::NoStepsReady {
                        pending: running.values().map(ToString::to_string).collect(),
                    }
                    .into());
                }
            }
        }
    }

    fn post(&mut self, event: TaskEvent) {
        self.logger.on_event(&event);
        self.machine.post_event(event);
    }

    fn dispatch(
        &self,
        workers: &mut JoinSet<Vec<TaskEvent>>,
        running: &mut HashMap<Id, TaskStep>,
        step: TaskStep,
    ) {
        self.logger.on_step_starting(&step);

        let executor = Arc::clone(&self.executor);
        let cancel = self.cancellation.token();
        let work = step.clone();

        let handle = workers.spawn(async move {
            let description = work.to_string();
            match executor.execute(work.clone(), cancel).await {
                Ok(events) => events,
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(step = %description, error = %message, "step failed");
                    vec![work.failure_event(message)]
                }
            }
        });

        running.insert(handle.id(), step);
    }
}
