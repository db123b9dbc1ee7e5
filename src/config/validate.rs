// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ConvoyError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ConvoyError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.project, raw.container, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_containers(cfg)?;
    validate_project(cfg)?;
    validate_image_sources(cfg)?;
    validate_commands(cfg)?;
    Ok(())
}

fn ensure_has_containers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.container.is_empty() {
        return Err(ConvoyError::ConfigError(
            "config must contain at least one [container.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_project(cfg: &RawConfigFile) -> Result<()> {
    if cfg.project.max_parallelism == 0 {
        return Err(ConvoyError::ConfigError(
            "[project].max_parallelism must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_image_sources(cfg: &RawConfigFile) -> Result<()> {
    for (name, container) in cfg.container.iter() {
        match (&container.image, &container.build_directory) {
            (Some(_), Some(_)) => {
                return Err(ConvoyError::ConfigError(format!(
                    "container '{}' sets both `image` and `build_directory`; choose one",
                    name
                )));
            }
            (None, None) => {
                return Err(ConvoyError::ConfigError(format!(
                    "container '{}' must set either `image` or `build_directory`",
                    name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Commands are split like a POSIX shell would, so quotes must balance.
fn validate_commands(cfg: &RawConfigFile) -> Result<()> {
    let containers = cfg
        .container
        .iter()
        .map(|(name, c)| (format!("container '{name}'"), &c.command));
    let tasks = cfg
        .task
        .iter()
        .map(|(name, t)| (format!("task '{name}'"), &t.command));

    for (owner, command) in containers.chain(tasks) {
        let Some(command) = command else {
            continue;
        };
        if let Err(err) = shell_words::split(command) {
            return Err(ConvoyError::ConfigError(format!(
                "{owner} has an invalid command {command:?}: {err}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> RawConfigFile {
        toml::from_str(src).expect("valid toml")
    }

    #[test]
    fn accepts_minimal_config() {
        let raw = parse(
            r#"
[container.db]
image = "postgres:16"

[task.test]
container = "db"
"#,
        );

        let cfg = ConfigFile::try_from(raw).expect("config should validate");
        assert_eq!(cfg.project.max_parallelism, 8);
        assert!(cfg.task("test").is_some());
        assert_eq!(cfg.containers().len(), 1);
    }

    #[test]
    fn rejects_container_with_two_image_sources() {
        let raw = parse(
            r#"
[container.api]
image = "api:latest"
build_directory = "api"
"#,
        );

        match ConfigFile::try_from(raw) {
            Err(ConvoyError::ConfigError(msg)) => assert!(msg.contains("both")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_container_without_image_source() {
        let raw = parse(
            r#"
[container.api]
command = "serve"
"#,
        );

        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(ConvoyError::ConfigError(_))
        ));
    }

    #[test]
    fn rejects_zero_parallelism() {
        let raw = parse(
            r#"
[project]
max_parallelism = 0

[container.db]
image = "postgres:16"
"#,
        );

        match ConfigFile::try_from(raw) {
            Err(ConvoyError::ConfigError(msg)) => assert!(msg.contains("max_parallelism")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn parses_cleanup_policy() {
        let raw = parse(
            r#"
[project]
cleanup_after_failure = "dont-cleanup"

[container.db]
image = "postgres:16"
"#,
        );

        let cfg = ConfigFile::try_from(raw).expect("config should validate");
        assert_eq!(
            cfg.project.cleanup_after_failure,
            crate::types::CleanupPolicy::DontCleanup
        );
    }

    #[test]
    fn rejects_command_with_unbalanced_quotes() {
        let raw = parse(
            r#"
[container.app]
image = "alpine"

[task.greet]
container = "app"
command = "sh -c 'echo hello"
"#,
        );

        match ConfigFile::try_from(raw) {
            Err(ConvoyError::ConfigError(msg)) => {
                assert!(msg.contains("task 'greet'"), "{msg}");
                assert!(msg.contains("invalid command"), "{msg}");
            }
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn accepts_quoted_commands() {
        let raw = parse(
            r#"
[container.app]
image = "alpine"
command = 'sh -c "echo hello world"'
"#,
        );

        assert!(ConfigFile::try_from(raw).is_ok());
    }
}
