use std::sync::{Mutex, MutexGuard};

use convoy::engine::{EventLogger, TaskEvent, TaskStep};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFailure {
    pub message: String,
    pub manual_cleanup_instructions: Vec<String>,
}

#[derive(Default)]
struct Log {
    started: Vec<String>,
    events: Vec<TaskEvent>,
    failure: Option<ReportedFailure>,
    finished: Option<i32>,
}

/// Event logger that keeps everything it is told, for assertions.
#[derive(Default)]
pub struct RecordingEventLogger {
    log: Mutex<Log>,
}

impl RecordingEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn started_steps(&self) -> Vec<String> {
        self.log().started.clone()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.log().events.clone()
    }

    pub fn failure(&self) -> Option<ReportedFailure> {
        self.log().failure.clone()
    }

    pub fn finished_with(&self) -> Option<i32> {
        self.log().finished
    }
}

impl EventLogger for RecordingEventLogger {
    fn on_step_starting(&self, step: &TaskStep) {
        self.log().started.push(step.to_string());
    }

    fn on_event(&self, event: &TaskEvent) {
        self.log().events.push(event.clone());
    }

    fn on_task_failed(&self, message: &str, manual_cleanup_instructions: &[String]) {
        self.log().failure = Some(ReportedFailure {
            message: message.to_string(),
            manual_cleanup_instructions: manual_cleanup_instructions.to_vec(),
        });
    }

    fn on_task_finished(&self, exit_code: i32) {
        self.log().finished = Some(exit_code);
    }
}
