// tests/config_errors.rs

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use convoy::{build_graph, resolve_tasks};
use convoy::config::load_and_validate;
use convoy::dag::{GraphError, ImageSource, TaskOrderError};
use convoy::errors::{ConvoyError, CONFIGURATION_ERROR_EXIT_CODE};
use convoy_test_utils::builders::{ConfigFileBuilder, ContainerConfigBuilder, TaskConfigBuilder};

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(file, "{contents}").expect("write config");
    file
}

#[test]
fn full_config_loads_and_resolves_the_task_graph() {
    let file = config_file(
        r#"
[project]
name = "shop"
max_parallelism = 4

[container.db]
image = "postgres:16"

[container.api]
build_directory = "api"
dependencies = ["db"]
environment = { DATABASE_URL = "postgres://db" }

[task.test]
container = "api"
command = "cargo test"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("valid config");
    assert_eq!(cfg.project.name.as_deref(), Some("shop"));
    assert_eq!(cfg.project.max_parallelism, 4);

    let graph = build_graph(&cfg, "test", Path::new("/work/shop")).expect("graph");
    assert_eq!(graph.startup_order(), vec!["db", "api"]);

    let api = graph.root_node().container();
    assert_eq!(api.command.as_deref(), Some("cargo test"));
    assert_eq!(
        api.image_source,
        ImageSource::Build {
            directory: "/work/shop/api".into()
        }
    );
    assert_eq!(
        api.environment.get("DATABASE_URL").map(String::as_str),
        Some("postgres://db")
    );
}

#[test]
fn dependency_cycle_is_a_configuration_error() {
    let file = config_file(
        r#"
[container.a]
image = "a"
dependencies = ["b"]

[container.b]
image = "b"
dependencies = ["a"]

[task.run]
container = "a"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("cycles are found per task");
    let err = build_graph(&cfg, "run", Path::new(".")).expect_err("cycle");

    match &err {
        ConvoyError::Graph(GraphError::DependencyCycle { task, description }) => {
            assert_eq!(task, "run");
            assert!(description.contains("depends on"));
        }
        other => panic!("expected dependency cycle, got {other:?}"),
    }
    assert_eq!(err.exit_code(), CONFIGURATION_ERROR_EXIT_CODE);
}

#[test]
fn unknown_task_is_a_configuration_error() {
    let cfg = ConfigFileBuilder::new()
        .with_container("db", ContainerConfigBuilder::image("postgres").build())
        .build();

    let err = build_graph(&cfg, "deploy", Path::new(".")).expect_err("no such task");

    assert!(matches!(err, ConvoyError::TaskNotFound(ref name) if name == "deploy"));
    assert!(err.is_configuration_error());
}

#[test]
fn missing_container_reference_names_the_referrer() {
    let cfg = ConfigFileBuilder::new()
        .with_container(
            "api",
            ContainerConfigBuilder::build_directory("api")
                .depends_on("cache")
                .build(),
        )
        .with_task("test", TaskConfigBuilder::new("api").build())
        .build();

    let err = build_graph(&cfg, "test", Path::new(".")).expect_err("missing container");

    assert_eq!(
        err.to_string(),
        "The container 'cache' referenced by container 'api' does not exist."
    );
}

#[test]
fn invalid_toml_is_reported() {
    let file = config_file("[container.db\nimage = 1");

    let err = load_and_validate(file.path()).expect_err("invalid toml");

    assert!(matches!(err, ConvoyError::TomlError(_)));
    assert_eq!(err.exit_code(), CONFIGURATION_ERROR_EXIT_CODE);
}

#[test]
fn config_without_containers_is_rejected() {
    let file = config_file(
        r#"
[task.test]
container = "api"
"#,
    );

    let err = load_and_validate(file.path()).expect_err("no containers");
    assert!(matches!(err, ConvoyError::ConfigError(_)));
}

#[test]
fn missing_config_file_names_the_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("convoy.toml");

    let err = load_and_validate(&path).expect_err("file does not exist");

    assert!(matches!(err, ConvoyError::ConfigRead { .. }));
    assert!(err.to_string().contains("convoy.toml"));
    assert_eq!(err.exit_code(), CONFIGURATION_ERROR_EXIT_CODE);
}

#[test]
fn task_dependencies_and_command_override_shape_the_root() {
    let cfg = ConfigFileBuilder::new()
        .with_max_parallelism(2)
        .with_cleanup_after_failure(convoy::types::CleanupPolicy::DontCleanup)
        .with_container("db", ContainerConfigBuilder::image("postgres").build())
        .with_container(
            "mock-payments",
            ContainerConfigBuilder::image("wiremock")
                .env("PORT", "8080")
                .build(),
        )
        .with_container(
            "api",
            ContainerConfigBuilder::build_directory("api")
                .depends_on("db")
                .command("serve")
                .build(),
        )
        .with_task(
            "integration",
            TaskConfigBuilder::new("api")
                .depends_on("mock-payments")
                .command("cargo test --test integration")
                .build(),
        )
        .build();

    assert_eq!(cfg.project.max_parallelism, 2);

    let graph = build_graph(&cfg, "integration", Path::new("/src")).expect("graph");
    let root = graph.root_node();

    assert_eq!(
        root.container().command.as_deref(),
        Some("cargo test --test integration")
    );
    assert_eq!(
        root.depends_on().iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["db", "mock-payments"]
    );
    assert_eq!(
        graph
            .node_for("mock-payments")
            .map(|n| n.container().environment.len()),
        Some(1)
    );
}

#[test]
fn main_container_listed_as_task_dependency_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_container("api", ContainerConfigBuilder::image("api").build())
        .with_task("test", TaskConfigBuilder::new("api").depends_on("api").build())
        .build_raw();
    let cfg = convoy::config::ConfigFile::try_from(raw).expect("valid config");

    let err = build_graph(&cfg, "test", Path::new(".")).expect_err("main is a dependency");

    assert!(matches!(
        err,
        ConvoyError::Graph(GraphError::MainContainerIsDependency { .. })
    ));
}

fn task_names(cfg: &convoy::config::ConfigFile, task: &str, skip: bool) -> Vec<String> {
    resolve_tasks(cfg, task, skip)
        .expect("task order")
        .into_iter()
        .map(|t| t.name)
        .collect()
}

#[test]
fn prerequisites_run_before_the_requested_task() {
    let file = config_file(
        r#"
[container.app]
image = "rust"

[task.build]
container = "app"
command = "cargo build"

[task."lint:fmt"]
container = "app"
prerequisites = ["build"]

[task."lint:clippy"]
container = "app"
prerequisites = ["build"]

[task.ci]
container = "app"
prerequisites = ["lint:*", "build"]
"#,
    );
    let cfg = load_and_validate(file.path()).expect("valid config");

    assert_eq!(
        task_names(&cfg, "ci", false),
        vec!["build", "lint:clippy", "lint:fmt", "ci"]
    );
    assert_eq!(task_names(&cfg, "ci", true), vec!["ci"]);
}

#[test]
fn missing_prerequisite_is_a_configuration_error() {
    let cfg = ConfigFileBuilder::new()
        .with_container("app", ContainerConfigBuilder::image("alpine").build())
        .with_task("test", TaskConfigBuilder::new("app").prerequisite("build").build())
        .build();

    let err = resolve_tasks(&cfg, "test", false).expect_err("missing prerequisite");

    assert_eq!(
        err.to_string(),
        "The task 'build' given as a prerequisite of 'test' does not exist."
    );
    assert_eq!(err.exit_code(), CONFIGURATION_ERROR_EXIT_CODE);

    // Skipping prerequisites skips resolving them too.
    assert_eq!(task_names(&cfg, "test", true), vec!["test"]);
}

#[test]
fn prerequisite_cycle_is_a_configuration_error() {
    let cfg = ConfigFileBuilder::new()
        .with_container("app", ContainerConfigBuilder::image("alpine").build())
        .with_task("a", TaskConfigBuilder::new("app").prerequisite("b").build())
        .with_task("b", TaskConfigBuilder::new("app").prerequisite("a").build())
        .build();

    let err = resolve_tasks(&cfg, "a", false).expect_err("cycle");

    assert!(matches!(
        err,
        ConvoyError::TaskOrder(TaskOrderError::DependencyCycle { .. })
    ));
    assert_eq!(
        err.to_string(),
        "There is a dependency cycle between tasks: task 'a' has 'b' as a prerequisite, \
         which has 'a' as a prerequisite."
    );
    assert_eq!(err.exit_code(), CONFIGURATION_ERROR_EXIT_CODE);
}

#[test]
fn unknown_requested_task_is_reported_before_prerequisites() {
    let cfg = ConfigFileBuilder::new()
        .with_container("app", ContainerConfigBuilder::image("alpine").build())
        .build();

    let err = resolve_tasks(&cfg, "deploy", false).expect_err("no such task");
    assert!(matches!(err, ConvoyError::TaskNotFound(ref name) if name == "deploy"));
}
