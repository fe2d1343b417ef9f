//! Command implementations.

mod check;
mod replay;

use console::style;
use covtrace::LineSnapshot;

use crate::cli::{Cli, Commands, OutputFormat};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Replay {
            log,
            include,
            omit,
            stats,
            no_missing_return_fix,
            stack_capacity,
            format,
        } => replay::cmd_replay(&replay::ReplayArgs {
            log,
            include,
            omit,
            show_stats: *stats,
            missing_return_fix: !*no_missing_return_fix,
            stack_capacity: *stack_capacity,
            format: *format,
        }),
        Commands::Check { log } => check::cmd_check(log),
    }
}

/// Print recorded lines, grouped by tracename.
pub fn print_lines(format: OutputFormat, lines: &LineSnapshot) {
    match format {
        OutputFormat::Text => {
            if lines.is_empty() {
                println!("{}", style("no lines recorded").dim());
                return;
            }
            for (name, nums) in lines {
                let list: Vec<String> = nums.iter().map(ToString::to_string).collect();
                println!(
                    "{} {} {}",
                    style(name).bold(),
                    style(format!("({})", nums.len())).dim(),
                    list.join(", ")
                );
            }
        }
        OutputFormat::Raw => {
            for (name, nums) in lines {
                for line in nums {
                    println!("{name}:{line}");
                }
            }
        }
    }
}
