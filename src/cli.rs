// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `convoy`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "convoy",
    version,
    about = "Run a task in a container after starting the containers it depends on.",
    long_about = None
)]
pub struct CliArgs {
    /// Task to run.
    #[arg(value_name = "TASK")]
    pub task: String,

    /// Path to the config file (TOML).
    ///
    /// Default: `convoy.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "convoy.toml")]
    pub config: String,

    /// Maximum number of steps to run at once. Overrides
    /// `[project].max_parallelism`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_parallelism: Option<u16>,

    /// Leave containers in place when the task fails, so they can be
    /// inspected. Commands to remove them are printed instead.
    #[arg(long)]
    pub no_cleanup_after_failure: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CONVOY_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Run only the named task, not its prerequisites.
    #[arg(long)]
    pub skip_prerequisites: bool,

    /// Parse + validate, print the containers the task needs and the order
    /// they start in, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
