// src/engine/observer.rs

//! Hooks for reporting task progress.

use tracing::{debug, error, info, warn};

use crate::engine::events::TaskEvent;
use crate::engine::steps::TaskStep;

/// Receives progress notifications from the runner.
///
/// Called from the runner loop only, never concurrently.
pub trait EventLogger: Send + Sync {
    fn on_step_starting(&self, step: &TaskStep);

    fn on_event(&self, event: &TaskEvent);

    fn on_task_failed(&self, message: &str, manual_cleanup_instructions: &[String]);

    fn on_task_finished(&self, _exit_code: i32) {}
}

/// Reports everything through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLogger;

impl EventLogger for TracingEventLogger {
    fn on_step_starting(&self, step: &TaskStep) {
        if step.is_terminal() {
            return;
        }
        info!(step = %step, "step starting");
    }

    fn on_event(&self, event: &TaskEvent) {
        match event.failure_description() {
            Some(description) => warn!(%description, "step failed"),
            None => debug!(?event, "event"),
        }
    }

    fn on_task_failed(&self, message: &str, manual_cleanup_instructions: &[String]) {
        error!("{message}");
        if !manual_cleanup_instructions.is_empty() {
            error!(
                "Some resources could not be cleaned up. Remove them with:\n    {}",
                manual_cleanup_instructions.join("\n    ")
            );
        }
    }

    fn on_task_finished(&self, exit_code: i32) {
        info!(exit_code, "task finished");
    }
}
