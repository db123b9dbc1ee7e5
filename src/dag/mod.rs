// src/dag/mod.rs

//! Container definitions and the per-task dependency graph.
//!
//! - [`container`] holds the engine's view of containers and tasks.
//! - [`graph`] resolves which containers a task needs and in which order,
//!   rejecting self-dependencies, missing containers and cycles.
//! - [`task_order`] expands a task's prerequisites into the list of tasks
//!   to run.

pub mod container;
pub mod graph;
pub mod task_order;

pub use container::{Container, ImageSource, Task};
pub use graph::{DependencyGraph, GraphError, GraphNode};
pub use task_order::{resolve_execution_order, TaskOrderError};
