// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod interrupt;
pub mod logging;
pub mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{resolve_execution_order, Container, DependencyGraph, ImageSource, Task};
use crate::engine::{
    run_in_order, run_until_interrupted, CancellationSource, CancellationToken,
    ParallelExecutionRunner, StateMachineOptions, TaskStateMachine, TracingEventLogger,
};
use crate::errors::{ConvoyError, Result};
use crate::exec::{DockerCliRuntime, RuntimeStepExecutor};
use crate::fs::RealFileSystem;
use crate::types::{CleanupPolicy, ContainerName};

/// High-level entry point used by `main.rs`. Returns the exit code of the
/// last task that ran.
///
/// This wires together:
/// - config loading
/// - the requested task's prerequisites, and a dependency graph per task
/// - state machine / runner for each task in turn
/// - docker-backed step executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root_dir = config_root_dir(&config_path);

    let order = resolve_tasks(&cfg, &args.task, args.skip_prerequisites)?;
    let graphs = order
        .iter()
        .map(|task| build_graph(&cfg, &task.name, &root_dir))
        .collect::<Result<Vec<_>>>()?;

    if args.dry_run {
        print_dry_run(&graphs);
        return Ok(0);
    }

    let settings = RunSettings {
        project: project_name(&cfg, &root_dir),
        cleanup_after_failure: if args.no_cleanup_after_failure {
            CleanupPolicy::DontCleanup
        } else {
            cfg.project.cleanup_after_failure
        },
        max_parallelism: args
            .max_parallelism
            .map(usize::from)
            .unwrap_or(cfg.project.max_parallelism),
    };

    let (interrupt_source, interrupted) = CancellationSource::new();
    interrupt::listen_for_interrupts(interrupt_source);

    run_in_order(graphs, &interrupted, |graph| {
        run_task(graph, &settings, interrupted.clone())
    })
    .await
}

/// Options shared by every task in one invocation.
#[derive(Debug, Clone)]
struct RunSettings {
    project: String,
    cleanup_after_failure: CleanupPolicy,
    max_parallelism: usize,
}

async fn run_task(
    graph: DependencyGraph,
    settings: &RunSettings,
    interrupted: CancellationToken,
) -> Result<i32> {
    let network_name = format!(
        "{}-{}-{}",
        settings.project,
        graph.task_name(),
        std::process::id()
    );
    info!(project = %settings.project, task = %graph.task_name(), network = %network_name, "running task");

    let runtime = DockerCliRuntime::new(settings.project.clone(), network_name)
        .with_attached_container(graph.root_node().name());
    let executor = Arc::new(RuntimeStepExecutor::new(runtime, Arc::new(RealFileSystem)));

    let machine = TaskStateMachine::new(
        graph,
        StateMachineOptions {
            cleanup_after_failure: settings.cleanup_after_failure,
        },
    );
    let runner = ParallelExecutionRunner::new(
        machine,
        executor,
        Arc::new(TracingEventLogger),
        settings.max_parallelism,
    );

    run_until_interrupted(runner, interrupted).await
}

/// The tasks to run for `task_name`, prerequisites first.
pub fn resolve_tasks(
    cfg: &ConfigFile,
    task_name: &str,
    skip_prerequisites: bool,
) -> Result<Vec<Task>> {
    let task = cfg
        .task(task_name)
        .ok_or_else(|| ConvoyError::TaskNotFound(task_name.to_string()))?;

    let order = if skip_prerequisites {
        vec![task]
    } else {
        resolve_execution_order(&cfg.tasks(), &task)?
    };

    info!(
        order = ?order.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        skip_prerequisites,
        "resolved task execution order"
    );
    Ok(order)
}

/// Resolve the dependency graph for `task_name`, with relative build
/// directories taken relative to `base_dir`.
pub fn build_graph(cfg: &ConfigFile, task_name: &str, base_dir: &Path) -> Result<DependencyGraph> {
    let task = cfg
        .task(task_name)
        .ok_or_else(|| ConvoyError::TaskNotFound(task_name.to_string()))?;
    let containers = resolve_build_directories(cfg.containers(), base_dir);
    Ok(DependencyGraph::build(&task, &containers)?)
}

fn resolve_build_directories(
    containers: BTreeMap<ContainerName, Container>,
    base_dir: &Path,
) -> BTreeMap<ContainerName, Container> {
    containers
        .into_iter()
        .map(|(name, mut container)| {
            if let ImageSource::Build { directory } = &mut container.image_source {
                if directory.is_relative() {
                    *directory = base_dir.join(&*directory);
                }
            }
            (name, container)
        })
        .collect()
}

/// Figure out the project directory.
///
/// - If the config path has a non-empty parent (e.g. "ci/convoy.toml"),
///   we use that directory.
/// - If it's just a bare filename like "convoy.toml" (parent = ""),
///   we fall back to the current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn project_name(cfg: &ConfigFile, root_dir: &Path) -> String {
    let raw = cfg
        .project
        .name
        .clone()
        .or_else(|| {
            root_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "convoy".to_string());

    let sanitized: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = sanitized.trim_matches('-');

    if trimmed.is_empty() {
        "convoy".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Simple dry-run output: for each task in run order, the containers it
/// needs, in start order.
fn print_dry_run(graphs: &[DependencyGraph]) {
    println!("convoy dry-run");
    let tasks: Vec<&str> = graphs.iter().map(DependencyGraph::task_name).collect();
    println!("tasks: {}", tasks.join(" -> "));

    for graph in graphs {
        println!();
        println!("task: {}", graph.task_name());
        println!("main container: {}", graph.root_node().name());
        println!("start order ({}):", graph.len());
        for name in graph.startup_order() {
            let Some(node) = graph.node_for(&name) else {
                continue;
            };
            println!("  - {name}");
            match &node.container().image_source {
                ImageSource::Build { directory } => println!("      build: {}", directory.display()),
                ImageSource::Pull { image } => println!("      image: {image}"),
            }
            if let Some(command) = &node.container().command {
                println!("      command: {command}");
            }
            if !node.depends_on().is_empty() {
                let deps: Vec<&str> = node.depends_on().iter().map(String::as_str).collect();
                println!("      depends on: {}", deps.join(", "));
            }
        }
    }
}
