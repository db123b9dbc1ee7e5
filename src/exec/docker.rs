// src/exec/docker.rs

//! [`ContainerRuntime`] backed by the `docker` command line client.

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::dag::Container;
use crate::engine::CancellationToken;
use crate::exec::runtime::{ContainerRuntime, CreatedContainer, RuntimeFuture};
use crate::types::{ContainerHandle, ContainerName, ImageRef, NetworkHandle};

/// Prints `<state>|<health>`, e.g. `running|starting` or `exited|none`.
const HEALTH_STATUS_FORMAT: &str =
    "{{.State.Status}}|{{if .State.Health}}{{.State.Health.Status}}{{else}}none{{end}}";

/// How a container is wired to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleMode {
    Detached,
    Interactive,
    InteractiveTty,
}

impl ConsoleMode {
    /// Mode for the attached container, based on the current process's stdio.
    fn for_attached_container() -> Self {
        if std::io::stdin().is_terminal() && std::io::stdout().is_terminal() {
            ConsoleMode::InteractiveTty
        } else {
            ConsoleMode::Interactive
        }
    }
}

/// What one health poll saw.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HealthPoll {
    Healthy,
    Waiting(String),
    Unhealthy,
    Exited,
}

fn parse_health_poll(output: &str) -> Result<HealthPoll> {
    let Some((state, health)) = output.trim().split_once('|') else {
        bail!("unexpected health status output {output:?}");
    };

    Ok(match (state, health) {
        (_, "healthy") => HealthPoll::Healthy,
        (_, "unhealthy") => HealthPoll::Unhealthy,
        ("running" | "restarting", "none") => HealthPoll::Healthy,
        ("running" | "restarting", other) => HealthPoll::Waiting(other.to_string()),
        _ => HealthPoll::Exited,
    })
}

#[derive(Debug, Clone)]
pub struct DockerCliRuntime {
    binary: String,
    /// Used for the task network name and for tags of built images.
    name_prefix: String,
    network_name: String,
    /// Container created with stdin attached, normally the task's main container.
    attached_container: Option<ContainerName>,
    health_poll_interval: Duration,
}

impl DockerCliRuntime {
    pub fn new(name_prefix: impl Into<String>, network_name: impl Into<String>) -> Self {
        Self {
            binary: "docker".to_string(),
            name_prefix: name_prefix.into(),
            network_name: network_name.into(),
            attached_container: None,
            health_poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_attached_container(mut self, container: impl Into<ContainerName>) -> Self {
        self.attached_container = Some(container.into());
        self
    }

    pub fn with_health_poll_interval(mut self, interval: Duration) -> Self {
        self.health_poll_interval = interval;
        self
    }

    /// Run the docker client to completion and return its trimmed stdout.
    async fn docker(&self, args: Vec<String>) -> Result<String> {
        debug!(binary = %self.binary, args = ?args, "running docker");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning `{} {}`", self.binary, args.join(" ")))?;

        if !output.status.success() {
            bail!(
                "`{} {}` failed with exit code {}: {}",
                self.binary,
                args.join(" "),
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn build(&self, container: ContainerName, directory: PathBuf) -> Result<ImageRef> {
        let tag = image_tag(&self.name_prefix, &container);
        info!(container = %container, directory = %directory.display(), "building image");
        let id = self.docker(build_args(&tag, &directory)).await?;
        Ok(ImageRef(if id.is_empty() { tag } else { id }))
    }

    async fn pull(&self, image: String) -> Result<ImageRef> {
        info!(image = %image, "pulling image");
        self.docker(pull_args(&image)).await?;
        Ok(ImageRef(image))
    }

    async fn create(
        &self,
        container: Container,
        image: ImageRef,
        network: NetworkHandle,
    ) -> Result<CreatedContainer> {
        let console = if self.attached_container.as_ref() == Some(&container.name) {
            ConsoleMode::for_attached_container()
        } else {
            ConsoleMode::Detached
        };

        let environment_file = if container.environment.is_empty() {
            None
        } else {
            Some(write_environment_file(&container)?)
        };

        let created = match create_args(
            &container,
            &image,
            &network,
            environment_file.as_deref(),
            console,
        ) {
            Ok(args) => self.docker(args).await,
            Err(err) => Err(err),
        };

        match created {
            Ok(id) => Ok(CreatedContainer {
                handle: ContainerHandle(id),
                environment_file,
            }),
            Err(err) => {
                if let Some(path) = &environment_file {
                    if let Err(remove_err) = std::fs::remove_file(path) {
                        warn!(path = %path.display(), error = %remove_err, "could not remove environment file");
                    }
                }
                Err(err)
            }
        }
    }

    async fn wait_healthy(&self, handle: ContainerHandle, cancel: CancellationToken) -> Result<()> {
        loop {
            let output = self.docker(health_status_args(&handle)).await?;
            match parse_health_poll(&output)? {
                HealthPoll::Healthy => return Ok(()),
                HealthPoll::Unhealthy => bail!("container {handle} reported an unhealthy status"),
                HealthPoll::Exited => bail!("The container exited before becoming healthy."),
                HealthPoll::Waiting(status) => {
                    debug!(container = %handle, %status, "waiting for container to become healthy")
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.health_poll_interval) => {}
                _ = cancel.cancelled() => bail!("cancelled while waiting for container {handle} to become healthy"),
            }
        }
    }

    async fn run(&self, handle: ContainerHandle, cancel: CancellationToken) -> Result<i32> {
        let mut child = Command::new(&self.binary)
            .args(start_attached_args(&handle))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting container {handle}"))?;

        tokio::select! {
            status = child.wait() => {
                status.with_context(|| format!("waiting for container {handle}"))?;
            }
            _ = cancel.cancelled() => {
                info!(container = %handle, "cancellation requested, stopping main container");
                if let Err(err) = self.docker(vec!["stop".to_string(), handle.0.clone()]).await {
                    warn!(container = %handle, error = %err, "failed to stop main container");
                }
                child
                    .wait()
                    .await
                    .with_context(|| format!("waiting for container {handle}"))?;
            }
        }

        let code = self.docker(exit_code_args(&handle)).await?;
        code.parse::<i32>()
            .with_context(|| format!("parsing exit code {code:?} of container {handle}"))
    }
}

impl ContainerRuntime for DockerCliRuntime {
    fn build_image(&self, container: ContainerName, directory: PathBuf) -> RuntimeFuture<'_, ImageRef> {
        Box::pin(self.build(container, directory))
    }

    fn pull_image(&self, image: String) -> RuntimeFuture<'_, ImageRef> {
        Box::pin(self.pull(image))
    }

    fn create_network(&self) -> RuntimeFuture<'_, NetworkHandle> {
        Box::pin(async move {
            let id = self
                .docker(vec![
                    "network".to_string(),
                    "create".to_string(),
                    self.network_name.clone(),
                ])
                .await?;
            Ok(NetworkHandle(id))
        })
    }

    fn create_container(
        &self,
        container: Container,
        image: ImageRef,
        network: NetworkHandle,
    ) -> RuntimeFuture<'_, CreatedContainer> {
        Box::pin(self.create(container, image, network))
    }

    fn start_container(&self, handle: ContainerHandle) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            self.docker(vec!["start".to_string(), handle.0]).await?;
            Ok(())
        })
    }

    fn wait_for_healthy(
        &self,
        handle: ContainerHandle,
        cancel: CancellationToken,
    ) -> RuntimeFuture<'_, ()> {
        Box::pin(self.wait_healthy(handle, cancel))
    }

    fn run_attached(
        &self,
        handle: ContainerHandle,
        cancel: CancellationToken,
    ) -> RuntimeFuture<'_, i32> {
        Box::pin(self.run(handle, cancel))
    }

    fn stop_container(&self, handle: ContainerHandle) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            self.docker(vec!["stop".to_string(), handle.0]).await?;
            Ok(())
        })
    }

    fn remove_container(&self, handle: ContainerHandle) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            self.docker(vec![
                "rm".to_string(),
                "--force".to_string(),
                "--volumes".to_string(),
                handle.0,
            ])
            .await?;
            Ok(())
        })
    }

    fn delete_network(&self, network: NetworkHandle) -> RuntimeFuture<'_, ()> {
        Box::pin(async move {
            self.docker(vec!["network".to_string(), "rm".to_string(), network.0])
                .await?;
            Ok(())
        })
    }
}

fn image_tag(prefix: &str, container: &str) -> String {
    format!("{prefix}-{container}").to_lowercase()
}

fn build_args(tag: &str, directory: &Path) -> Vec<String> {
    vec![
        "build".to_string(),
        "--quiet".to_string(),
        "--tag".to_string(),
        tag.to_string(),
        directory.display().to_string(),
    ]
}

fn pull_args(image: &str) -> Vec<String> {
    vec!["pull".to_string(), "--quiet".to_string(), image.to_string()]
}

fn create_args(
    container: &Container,
    image: &ImageRef,
    network: &NetworkHandle,
    environment_file: Option<&Path>,
    console: ConsoleMode,
) -> Result<Vec<String>> {
    let mut args = vec![
        "create".to_string(),
        "--network".to_string(),
        network.0.clone(),
        "--network-alias".to_string(),
        container.name.clone(),
    ];

    match console {
        ConsoleMode::Detached => {}
        ConsoleMode::Interactive => args.push("--interactive".to_string()),
        ConsoleMode::InteractiveTty => {
            args.push("--interactive".to_string());
            args.push("--tty".to_string());
        }
    }

    if let Some(path) = environment_file {
        args.push("--env-file".to_string());
        args.push(path.display().to_string());
    }

    args.push(image.0.clone());

    if let Some(command) = &container.command {
        let words = shell_words::split(command).with_context(|| {
            format!("invalid command {command:?} for container '{}'", container.name)
        })?;
        args.extend(words);
    }

    Ok(args)
}

fn start_attached_args(handle: &ContainerHandle) -> Vec<String> {
    vec![
        "start".to_string(),
        "--attach".to_string(),
        "--interactive".to_string(),
        handle.0.clone(),
    ]
}

fn health_status_args(handle: &ContainerHandle) -> Vec<String> {
    vec![
        "inspect".to_string(),
        "--format".to_string(),
        HEALTH_STATUS_FORMAT.to_string(),
        handle.0.clone(),
    ]
}

fn exit_code_args(handle: &ContainerHandle) -> Vec<String> {
    vec![
        "inspect".to_string(),
        "--format".to_string(),
        "{{.State.ExitCode}}".to_string(),
        handle.0.clone(),
    ]
}

/// Write the container's environment as a `KEY=value` file docker can read.
fn write_environment_file(container: &Container) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("convoy-{}-", container.name))
        .suffix(".env")
        .tempfile()
        .context("creating environment file")?;

    for (key, value) in &container.environment {
        writeln!(file, "{key}={value}").context("writing environment file")?;
    }

    let (_, path) = file.keep().context("keeping environment file")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_for(container: &Container, console: ConsoleMode) -> Vec<String> {
        create_args(
            container,
            &ImageRef("sha256:abc".to_string()),
            &NetworkHandle("net-1".to_string()),
            None,
            console,
        )
        .expect("valid command")
    }

    #[test]
    fn create_args_include_network_alias_env_file_and_command() {
        let mut container = Container::from_image("api", "api:latest");
        container.command = Some("cargo  test --all".to_string());

        let args = create_args(
            &container,
            &ImageRef("sha256:abc".to_string()),
            &NetworkHandle("net-1".to_string()),
            Some(Path::new("/tmp/api.env")),
            ConsoleMode::Detached,
        )
        .expect("valid command");

        assert_eq!(
            args,
            vec![
                "create",
                "--network",
                "net-1",
                "--network-alias",
                "api",
                "--env-file",
                "/tmp/api.env",
                "sha256:abc",
                "cargo",
                "test",
                "--all",
            ]
        );
    }

    #[test]
    fn create_args_without_env_or_command() {
        let container = Container::from_image("db", "postgres");
        let args = create_args(
            &container,
            &ImageRef("postgres".to_string()),
            &NetworkHandle("net".to_string()),
            None,
            ConsoleMode::Detached,
        )
        .expect("no command");

        assert_eq!(
            args,
            vec!["create", "--network", "net", "--network-alias", "db", "postgres"]
        );
    }

    #[test]
    fn quoted_command_arguments_stay_together() {
        let mut container = Container::from_image("app", "alpine");
        container.command = Some(r#"sh -c "echo hello world" 'single quoted'"#.to_string());

        let args = args_for(&container, ConsoleMode::Detached);

        assert_eq!(
            &args[args.len() - 4..],
            ["sh", "-c", "echo hello world", "single quoted"]
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let mut container = Container::from_image("app", "alpine");
        container.command = Some(r#"sh -c "echo"#.to_string());

        let err = create_args(
            &container,
            &ImageRef("alpine".to_string()),
            &NetworkHandle("net".to_string()),
            None,
            ConsoleMode::Detached,
        )
        .expect_err("unterminated quote");

        assert!(err.to_string().contains("container 'app'"));
    }

    #[test]
    fn attached_container_keeps_stdin_open() {
        let container = Container::from_image("app", "alpine");

        let interactive = args_for(&container, ConsoleMode::Interactive);
        assert!(interactive.contains(&"--interactive".to_string()));
        assert!(!interactive.contains(&"--tty".to_string()));

        let tty = args_for(&container, ConsoleMode::InteractiveTty);
        assert!(tty.contains(&"--interactive".to_string()));
        assert!(tty.contains(&"--tty".to_string()));

        let detached = args_for(&container, ConsoleMode::Detached);
        assert!(!detached.contains(&"--interactive".to_string()));

        assert_eq!(
            start_attached_args(&ContainerHandle("c-app".to_string())),
            vec!["start", "--attach", "--interactive", "c-app"]
        );
    }

    #[test]
    fn health_polls_distinguish_exited_containers() {
        assert_eq!(parse_health_poll("running|healthy").ok(), Some(HealthPoll::Healthy));
        assert_eq!(parse_health_poll("running|none").ok(), Some(HealthPoll::Healthy));
        assert_eq!(
            parse_health_poll("running|starting\n").ok(),
            Some(HealthPoll::Waiting("starting".to_string()))
        );
        assert_eq!(parse_health_poll("running|unhealthy").ok(), Some(HealthPoll::Unhealthy));
        assert_eq!(parse_health_poll("exited|starting").ok(), Some(HealthPoll::Exited));
        assert_eq!(parse_health_poll("exited|none").ok(), Some(HealthPoll::Exited));
        assert_eq!(parse_health_poll("dead|starting").ok(), Some(HealthPoll::Exited));
        assert!(parse_health_poll("starting").is_err());
    }

    #[test]
    fn build_tags_are_lowercase() {
        assert_eq!(image_tag("Shop", "API"), "shop-api");
        assert_eq!(
            build_args("shop-api", Path::new("api")),
            vec!["build", "--quiet", "--tag", "shop-api", "api"]
        );
    }

    #[test]
    fn environment_file_lists_every_variable() {
        let mut container = Container::from_image("api", "api");
        container
            .environment
            .insert("DATABASE_URL".to_string(), "postgres://db".to_string());
        container
            .environment
            .insert("MODE".to_string(), "test".to_string());

        let path = write_environment_file(&container).expect("env file");
        let contents = std::fs::read_to_string(&path).expect("read env file");
        std::fs::remove_file(&path).expect("cleanup");

        assert_eq!(contents, "DATABASE_URL=postgres://db\nMODE=test\n");
    }

    #[cfg(unix)]
    mod fake_client {
        use std::os::unix::fs::PermissionsExt;

        use super::*;

        /// Write an executable standing in for `docker` that always prints
        /// `output`.
        fn fake_docker(dir: &Path, output: &str) -> PathBuf {
            let path = dir.join("docker");
            std::fs::write(&path, format!("#!/bin/sh\necho '{output}'\n")).expect("write script");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod script");
            path
        }

        fn runtime_with(binary: &Path) -> DockerCliRuntime {
            DockerCliRuntime::new("p", "n")
                .with_binary(binary.display().to_string())
                .with_health_poll_interval(Duration::from_millis(10))
        }

        #[tokio::test]
        async fn container_that_exits_while_starting_is_not_waited_for() {
            let dir = tempfile::tempdir().expect("tempdir");
            let runtime = runtime_with(&fake_docker(dir.path(), "exited|starting"));

            let result = tokio::time::timeout(
                Duration::from_secs(3),
                runtime.wait_healthy(ContainerHandle("c-db".to_string()), CancellationToken::never()),
            )
            .await
            .expect("health wait returned");

            let err = result.expect_err("exited container is not healthy");
            assert_eq!(err.to_string(), "The container exited before becoming healthy.");
        }

        #[tokio::test]
        async fn running_container_without_health_check_is_ready() {
            let dir = tempfile::tempdir().expect("tempdir");
            let runtime = runtime_with(&fake_docker(dir.path(), "running|none"));

            runtime
                .wait_healthy(ContainerHandle("c-db".to_string()), CancellationToken::never())
                .await
                .expect("ready");
        }

        #[tokio::test]
        async fn waiting_for_health_stops_on_cancellation() {
            let dir = tempfile::tempdir().expect("tempdir");
            let runtime = runtime_with(&fake_docker(dir.path(), "running|starting"));
            let (source, token) = crate::engine::CancellationSource::new();

            let wait = runtime.wait_healthy(ContainerHandle("c-db".to_string()), token);
            source.cancel();

            let err = tokio::time::timeout(Duration::from_secs(3), wait)
                .await
                .expect("health wait returned")
                .expect_err("cancelled");
            assert!(err.to_string().contains("cancelled"));
        }
    }
}
