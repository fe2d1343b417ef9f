//! Check command.

use std::collections::BTreeSet;
use std::path::Path;

use console::style;
use covtrace::{EventLog, Frame, PYEXPAT_MARKER, TraceEvent};
use tracing::{error, warn};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};

/// What a log would do to a tracer's depth stack.
#[derive(Debug, Default, PartialEq, Eq)]
struct Audit {
    counts: [usize; 4],
    units: usize,
    /// Frames still open at the end of the log.
    open_frames: usize,
    unmatched_returns: usize,
    /// Exceptions that close a frame because their unit never reports a return.
    missed_returns: usize,
}

/// Walk the log the way a tracer would, including the synthesized return
/// after an exception from a unit matching one of `markers`.
fn audit(log: &EventLog, markers: &[&str]) -> Audit {
    let mut audit = Audit::default();
    let mut units = BTreeSet::new();
    for (event, frame) in log.iter() {
        audit.counts[*event as usize] += 1;
        match event {
            TraceEvent::Call => {
                units.insert(frame.unit());
                audit.open_frames += 1;
            }
            TraceEvent::Return if audit.open_frames == 0 => audit.unmatched_returns += 1,
            TraceEvent::Return => audit.open_frames -= 1,
            TraceEvent::Exception
                if audit.open_frames > 0
                    && markers.iter().any(|marker| frame.unit().contains(marker)) =>
            {
                audit.missed_returns += 1;
                audit.open_frames -= 1;
            }
            TraceEvent::Line | TraceEvent::Exception => {}
        }
    }
    audit.units = units.len();
    audit
}

/// Handle the `check` command.
pub fn cmd_check(path: &Path) -> i32 {
    let log = match EventLog::load(path) {
        Ok(log) => log,
        Err(e) => {
            error!(error = %e, path = %path.display(), "invalid event log");
            return EXIT_FAILURE;
        }
    };

    let report = audit(&log, &[PYEXPAT_MARKER]);

    println!("{} {}", style("✓").green().bold(), path.display());
    println!("  events:    {}", log.len());
    for event in [
        TraceEvent::Call,
        TraceEvent::Line,
        TraceEvent::Return,
        TraceEvent::Exception,
    ] {
        println!("  {:<10} {}", format!("{event}:"), report.counts[event as usize]);
    }
    println!("  units:     {}", report.units);

    if report.missed_returns > 0 {
        println!("  synthesized returns: {}", report.missed_returns);
    }
    if report.open_frames != 0 {
        warn!(open_frames = report.open_frames, "log ends with unterminated frames");
    }
    if report.unmatched_returns > 0 {
        warn!(
            unmatched_returns = report.unmatched_returns,
            "log has returns without a matching call"
        );
    }
    EXIT_SUCCESS
}
