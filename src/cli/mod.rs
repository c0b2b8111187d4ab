//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`]
//! module.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::error::ChimgError;
use commands::Commands;

/// chimg - declarative chroot customizer
///
/// Apply an ordered list of customization actions to a chroot tree.
#[derive(Parser, Debug)]
#[command(name = "chimg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Write log output to the console (stderr)
    #[arg(long, global = true)]
    pub log_console: bool,

    /// Write log output to the given file instead of the console
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Output the run report as JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Log verbosity selection
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Info,
    Debug,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<(), ChimgError> {
        if let Some(cmd) = self.command {
            cmd.run(self.json)
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            let _ = cmd.print_help();
            Ok(())
        }
    }
}

/// Process exit code for a failed run.
///
/// Distinguishes configuration failures, environment/mount-acquisition
/// failures and action-execution failures for the calling pipeline.
pub fn exit_code(error: &ChimgError) -> i32 {
    match error {
        ChimgError::Config(_) => 2,
        ChimgError::Mount(_) | ChimgError::Env(_) => 3,
        ChimgError::Action { .. } => 4,
        ChimgError::Output(_) => 1,
    }
}
