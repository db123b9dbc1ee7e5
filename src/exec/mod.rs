// src/exec/mod.rs

//! Step execution layer.
//!
//! This module is responsible for actually performing the steps the engine
//! hands out and reporting back what happened as `TaskEvent`s.
//!
//! - [`backend`] provides the `StepExecutor` trait the runner talks to, and
//!   `RuntimeStepExecutor`, which maps steps onto a container runtime.
//! - [`runtime`] defines the `ContainerRuntime` trait.
//! - [`docker`] implements it with the `docker` command line client.

pub mod backend;
pub mod docker;
pub mod runtime;

pub use backend::{RuntimeStepExecutor, StepExecutor, StepFuture};
pub use docker::DockerCliRuntime;
pub use runtime::{ContainerRuntime, CreatedContainer, RuntimeFuture};
