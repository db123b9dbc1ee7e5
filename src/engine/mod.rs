// src/engine/mod.rs

//! Orchestration engine for convoy.
//!
//! This module ties together:
//! - the step and event vocabulary ([`steps`], [`events`])
//! - step rules and the reactions that create them ([`rules`], [`reactions`])
//! - cleanup planning after the task ends or fails ([`cleanup_planner`])
//! - the pure task state machine ([`state_machine`])
//! - the async runner that executes steps in parallel ([`runner`])
//! - running a task's prerequisites before it ([`sequence`])
//!
//! The state machine performs no IO and is unit tested on its own; the
//! runner is the only place that awaits anything.

pub mod cancellation;
pub mod cleanup_planner;
pub mod events;
pub mod observer;
pub mod reactions;
pub mod rules;
pub mod runner;
pub mod sequence;
pub mod state_machine;
pub mod steps;

pub use cancellation::{CancellationSource, CancellationToken};
pub use events::{EventHistory, TaskEvent};
pub use observer::{EventLogger, TracingEventLogger};
pub use reactions::{Reaction, ReactionContext, ReactionRegistry};
pub use rules::{RuleEvaluation, StepRule};
pub use runner::{ParallelExecutionRunner, RunnerHandle};
pub use sequence::{run_in_order, run_until_interrupted, INTERRUPTED_EXIT_CODE};
pub use state_machine::{Stage, StateMachineError, StateMachineOptions, TaskStateMachine};
pub use steps::{StepPhase, TaskStep};
