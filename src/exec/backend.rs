// src/exec/backend.rs

//! Pluggable step executor abstraction.
//!
//! The runner hands each ready step to a [`StepExecutor`] instead of talking
//! to a container runtime directly. This keeps the engine testable with a
//! fake executor while production uses [`RuntimeStepExecutor`] on top of a
//! [`ContainerRuntime`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::engine::{CancellationToken, TaskEvent, TaskStep};
use crate::exec::runtime::ContainerRuntime;
use crate::fs::FileSystem;

pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<TaskEvent>>> + Send + 'a>>;

/// Performs the side effects of a single step.
///
/// Implementations report what happened as events. Returning `Err` means the
/// step failed outright; the runner turns that into the step's failure event.
/// Long-blocking steps should stop when `cancel` fires.
pub trait StepExecutor: Send + Sync + 'static {
    fn execute(&self, step: TaskStep, cancel: CancellationToken) -> StepFuture<'_>;
}

impl<E: StepExecutor + ?Sized> StepExecutor for Arc<E> {
    fn execute(&self, step: TaskStep, cancel: CancellationToken) -> StepFuture<'_> {
        (**self).execute(step, cancel)
    }
}

/// Production executor: maps steps onto container runtime calls.
#[derive(Debug)]
pub struct RuntimeStepExecutor<R> {
    runtime: R,
    fs: Arc<dyn FileSystem>,
}

impl<R: ContainerRuntime> RuntimeStepExecutor<R> {
    pub fn new(runtime: R, fs: Arc<dyn FileSystem>) -> Self {
        Self { runtime, fs }
    }

    async fn run_step(&self, step: TaskStep, cancel: CancellationToken) -> Result<Vec<TaskEvent>> {
        debug!(%step, "executing step");

        let events = match step {
            TaskStep::BuildImage {
                container,
                directory,
            } => {
                let image = self.runtime.build_image(container.clone(), directory).await?;
                vec![TaskEvent::ImageBuilt { container, image }]
            }
            TaskStep::PullImage { container, image } => {
                let image = self.runtime.pull_image(image).await?;
                vec![TaskEvent::ImagePulled { container, image }]
            }
            TaskStep::CreateNetwork => {
                let network = self.runtime.create_network().await?;
                vec![TaskEvent::NetworkCreated { network }]
            }
            TaskStep::CreateContainer {
                container,
                image,
                network,
            } => {
                let name = container.name.clone();
                let created = self.runtime.create_container(container, image, network).await?;

                let mut events = Vec::new();
                if let Some(path) = created.environment_file {
                    events.push(TaskEvent::TemporaryFileCreated {
                        container: name.clone(),
                        path,
                    });
                }
                events.push(TaskEvent::ContainerCreated {
                    container: name,
                    handle: created.handle,
                });
                events
            }
            TaskStep::StartContainer { container, handle } => {
                self.runtime.start_container(handle).await?;
                vec![TaskEvent::ContainerStarted { container }]
            }
            TaskStep::WaitForHealthy { container, handle } => {
                self.runtime.wait_for_healthy(handle, cancel).await?;
                vec![TaskEvent::ContainerBecameHealthy { container }]
            }
            TaskStep::RunMainContainer { container, handle } => {
                info!(container = %container, "running main container");
                let exit_code = self.runtime.run_attached(handle, cancel).await?;
                vec![
                    TaskEvent::ContainerStarted {
                        container: container.clone(),
                    },
                    TaskEvent::ContainerExited {
                        container,
                        exit_code,
                    },
                ]
            }
            TaskStep::StopContainer { container, handle } => {
                self.runtime.stop_container(handle).await?;
                vec![TaskEvent::ContainerStopped { container }]
            }
            TaskStep::RemoveContainer { container, handle } => {
                self.runtime.remove_container(handle).await?;
                vec![TaskEvent::ContainerRemoved { container }]
            }
            TaskStep::DeleteNetwork { network } => {
                self.runtime.delete_network(network).await?;
                vec![TaskEvent::NetworkDeleted]
            }
            TaskStep::DeleteTemporaryFile { path } => {
                self.fs.remove_file(&path)?;
                vec![TaskEvent::TemporaryFileDeleted { path }]
            }
            TaskStep::DeleteTemporaryDirectory { path } => {
                self.fs.remove_dir_all(&path)?;
                vec![TaskEvent::TemporaryDirectoryDeleted { path }]
            }
            // Reporting is the runner's job.
            TaskStep::FinishTask { .. } | TaskStep::ReportFailure { .. } => Vec::new(),
        };

        Ok(events)
    }
}

impl<R: ContainerRuntime> StepExecutor for RuntimeStepExecutor<R> {
    fn execute(&self, step: TaskStep, cancel: CancellationToken) -> StepFuture<'_> {
        Box::pin(self.run_step(step, cancel))
    }
}
