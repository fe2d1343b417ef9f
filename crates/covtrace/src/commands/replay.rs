//! Replay command.

use std::path::Path;
use std::time::Instant;

use console::style;
use covtrace::{
    Collector, EventLog, PrefixRules, ReplayHost, StepFrame, TracerConfig, TracerStats,
};
use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS, OutputFormat};
use crate::commands::print_lines;

pub struct ReplayArgs<'a> {
    pub log: &'a Path,
    pub include: &'a [String],
    pub omit: &'a [String],
    pub show_stats: bool,
    pub missing_return_fix: bool,
    pub stack_capacity: usize,
    pub format: OutputFormat,
}

/// Handle the `replay` command.
pub fn cmd_replay(args: &ReplayArgs<'_>) -> i32 {
    let log = match EventLog::load(args.log) {
        Ok(log) => log,
        Err(e) => {
            error!(error = %e, path = %args.log.display(), "failed to load event log");
            return EXIT_FAILURE;
        }
    };

    let rules = args
        .include
        .iter()
        .fold(PrefixRules::new(), |rules, prefix| rules.include(prefix.as_str()));
    let rules = args
        .omit
        .iter()
        .fold(rules, |rules, prefix| rules.omit(prefix.as_str()));

    let mut config = TracerConfig::new().with_stack_capacity(args.stack_capacity);
    if !args.missing_return_fix {
        config = config.without_missing_return_markers();
    }

    let host = ReplayHost::new();
    let mut collector: Collector<'_, StepFrame, _> = Collector::with_config(rules, config);
    if let Err(e) = collector.start(&host) {
        error!(error = %e, "failed to start collector");
        return EXIT_FAILURE;
    }

    let started = Instant::now();
    let replayed = host.replay(&log);
    let elapsed = started.elapsed().as_secs_f64();
    if let Err(e) = collector.stop() {
        error!(error = %e, "failed to stop collector");
        return EXIT_FAILURE;
    }

    let source = args.log.display().to_string();
    covtrace::metrics::record_replay(&source, elapsed);
    covtrace::metrics::record_stats(&source, &collector.stats());

    let count = match replayed {
        Ok(count) => count,
        Err(e) => {
            error!(error = %e, "replay aborted");
            if let Some(cause) = std::error::Error::source(&e) {
                error!(cause = %cause, "tracer fault");
            }
            return EXIT_FAILURE;
        }
    };

    let lines = collector.line_data();
    let recorded: usize = lines.values().map(Vec::len).sum();
    covtrace::metrics::record_line_data(lines.len(), recorded);
    info!(
        events = count,
        units = lines.len(),
        lines = recorded,
        elapsed_secs = elapsed,
        "replay complete"
    );

    print_lines(args.format, &lines);
    if args.show_stats {
        print_stats(&collector.stats());
    }
    EXIT_SUCCESS
}

fn print_stats(stats: &TracerStats) {
    println!();
    println!("{}", style("Tracer statistics").bold().underlined());
    for (name, value) in stats.entries() {
        println!("  {name:<16} {value}");
    }
}
