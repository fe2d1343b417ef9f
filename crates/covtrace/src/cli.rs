//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use covtrace_core::DEFAULT_STACK_CAPACITY;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "covtrace")]
#[command(about = "Line-coverage tracer - replays and inspects execution event logs")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay an event log through a tracer and print the recorded lines
    Replay {
        /// Event log (`<event> <unit> <line>` per line)
        #[arg(value_name = "LOG")]
        log: PathBuf,

        /// Only trace units starting with this prefix (repeatable)
        #[arg(long, value_name = "PREFIX", action = clap::ArgAction::Append)]
        include: Vec<String>,

        /// Never trace units starting with this prefix (repeatable)
        #[arg(long, value_name = "PREFIX", action = clap::ArgAction::Append)]
        omit: Vec<String>,

        /// Print tracer statistics after the lines
        #[arg(long)]
        stats: bool,

        /// Do not synthesize returns for pyexpat exception frames
        #[arg(long)]
        no_missing_return_fix: bool,

        /// Initial depth stack capacity
        #[arg(long, default_value_t = DEFAULT_STACK_CAPACITY)]
        stack_capacity: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Parse an event log and report what it contains
    Check {
        /// Event log to check
        #[arg(value_name = "LOG")]
        log: PathBuf,
    },
}

/// Output format for recorded lines.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Text,
    /// One `unit:line` per line (for scripting)
    Raw,
}
