// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `conductor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "conductor",
    version,
    about = "Run analysis modules for a sample or group in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Conductor.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Conductor.toml")]
    pub config: String,

    /// Id of the sample (or group, with `--group`) to run modules for.
    #[arg(long, value_name = "ID")]
    pub entity: String,

    /// Treat `--entity` as a group id.
    #[arg(long)]
    pub group: bool,

    /// Module to request; repeatable. Omit to request every module.
    #[arg(long = "module", value_name = "NAME")]
    pub modules: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CONDUCTOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the composed plan, but don't run any module.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Requested modules, or `None` for "all registered modules".
    pub fn requested_modules(&self) -> Option<&[String]> {
        if self.modules.is_empty() {
            None
        } else {
            Some(&self.modules)
        }
    }
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
