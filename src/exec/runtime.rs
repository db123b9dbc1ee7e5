// src/exec/runtime.rs

//! Container runtime abstraction used by [`super::RuntimeStepExecutor`].

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use anyhow::Result;

use crate::dag::Container;
use crate::engine::CancellationToken;
use crate::types::{ContainerHandle, ContainerName, ImageRef, NetworkHandle};

pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What `create_container` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContainer {
    pub handle: ContainerHandle,
    /// Environment file written for the container, to delete once the
    /// container is gone.
    pub environment_file: Option<PathBuf>,
}

/// Operations a container runtime must offer.
///
/// Every call takes owned arguments so the returned future only borrows
/// `self`.
pub trait ContainerRuntime: Send + Sync + 'static {
    fn build_image(&self, container: ContainerName, directory: PathBuf) -> RuntimeFuture<'_, ImageRef>;

    fn pull_image(&self, image: String) -> RuntimeFuture<'_, ImageRef>;

    fn create_network(&self) -> RuntimeFuture<'_, NetworkHandle>;

    fn create_container(
        &self,
        container: Container,
        image: ImageRef,
        network: NetworkHandle,
    ) -> RuntimeFuture<'_, CreatedContainer>;

    fn start_container(&self, handle: ContainerHandle) -> RuntimeFuture<'_, ()>;

    /// Resolves once the container reports healthy (or has no health check).
    fn wait_for_healthy(
        &self,
        handle: ContainerHandle,
        cancel: CancellationToken,
    ) -> RuntimeFuture<'_, ()>;

    /// Start the container attached to the console and wait for it to exit.
    /// Stops the container if `cancel` fires first.
    fn run_attached(
        &self,
        handle: ContainerHandle,
        cancel: CancellationToken,
    ) -> RuntimeFuture<'_, i32>;

    fn stop_container(&self, handle: ContainerHandle) -> RuntimeFuture<'_, ()>;

    fn remove_container(&self, handle: ContainerHandle) -> RuntimeFuture<'_, ()>;

    fn delete_network(&self, network: NetworkHandle) -> RuntimeFuture<'_, ()>;
}
