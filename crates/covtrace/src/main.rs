//! covtrace CLI - line-coverage tracer dev tool

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let recorder = cli.metrics.then(covtrace::metrics::SummaryRecorder::new);
    if let Some(recorder) = &recorder {
        if !recorder.install() {
            eprintln!("metrics recorder already installed");
        }
    }
    covtrace::metrics::init();

    let default_level = if cli.verbose {
        "covtrace=debug"
    } else if cli.silent {
        "covtrace=error"
    } else {
        "covtrace=info"
    };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = default_level.parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let exit_code = commands::run_command(&cli);

    if let Some(recorder) = recorder {
        recorder.print_summary();
    }

    std::process::exit(exit_code);
}
