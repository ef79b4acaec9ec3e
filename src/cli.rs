// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;
use crate::types::{DispatchBackend, StoreBackend};

/// Command-line arguments for `runtrigger`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "runtrigger",
    version,
    about = "Decide which batch tasks run next and start their workflows.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Runtrigger.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNTRIGGER_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Log invocations instead of starting them, never advance trigger
    /// state and keep drained upload records.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Override `[store].backend` (file, memory).
    #[arg(long, global = true, value_name = "BACKEND")]
    pub store: Option<StoreBackend>,

    /// Override `[dispatch].backend` (log, command).
    #[arg(long, global = true, value_name = "BACKEND")]
    pub dispatch: Option<DispatchBackend>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one trigger round and start the selected tasks.
    Tick(TickArgs),

    /// Record upload notifications for the given object paths.
    Record {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,
    },

    /// Start the workflows of settled uploads.
    Drain,

    /// Start every scheduled trigger registered for an expression.
    Schedule {
        #[arg(value_name = "EXPR")]
        expression: String,
    },

    /// Handle a raw JSON event read from a file (`-` for stdin).
    Event {
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Parse + validate the config and print it; nothing is run.
    Validate,
}

#[derive(Debug, Clone, Default, Args)]
pub struct TickArgs {
    /// Comma-separated tasks to run.
    #[arg(long, value_name = "A,B")]
    pub tasks: Option<String>,

    /// Check task schedules (default: only when no tasks were given).
    #[arg(long, value_name = "BOOL")]
    pub check_schedule: Option<bool>,

    /// Do not advance the trigger state of fired tasks.
    #[arg(long)]
    pub no_update_state: bool,

    /// JSON file with per-task overrides: `{"task": {"arguments": [...]}}`.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
