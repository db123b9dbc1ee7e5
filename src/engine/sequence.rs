// src/engine/sequence.rs

//! Running a task after its prerequisites, one task at a time.

use std::future::Future;

use tracing::{info, warn};

use crate::dag::DependencyGraph;
use crate::engine::cancellation::CancellationToken;
use crate::engine::runner::ParallelExecutionRunner;
use crate::errors::Result;

/// Exit code when the user interrupts before a task has started.
pub const INTERRUPTED_EXIT_CODE: i32 = 1;

/// Run each graph with `run_task` in order and return the exit code of the
/// last task that ran. Stops at the first non-zero exit code, and does not
/// start another task once `interrupted` has fired.
pub async fn run_in_order<F, Fut>(
    graphs: Vec<DependencyGraph>,
    interrupted: &CancellationToken,
    mut run_task: F,
) -> Result<i32>
where
    F: FnMut(DependencyGraph) -> Fut,
    Fut: Future<Output = Result<i32>>,
{
    let total = graphs.len();

    for (index, graph) in graphs.into_iter().enumerate() {
        let task = graph.task_name().to_string();

        if interrupted.is_cancelled() {
            warn!(task = %task, "interrupted, not starting remaining tasks");
            return Ok(INTERRUPTED_EXIT_CODE);
        }

        info!(task = %task, position = index + 1, total, "starting task");
        let exit_code = run_task(graph).await?;

        if exit_code != 0 {
            if index + 1 < total {
                warn!(task = %task, exit_code, "task failed, skipping the tasks after it");
            }
            return Ok(exit_code);
        }
    }

    Ok(0)
}

/// Run `runner` to completion, requesting cancellation if `interrupted`
/// fires first.
pub async fn run_until_interrupted(
    runner: ParallelExecutionRunner,
    interrupted: CancellationToken,
) -> Result<i32> {
    let handle = runner.handle();
    let run = runner.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        _ = interrupted.cancelled() => handle.request_cancellation(),
    }

    run.await
}
