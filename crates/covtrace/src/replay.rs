//! Recorded event logs and a host that replays them.
//!
//! Log format, one event per line:
//!
//! ```text
//! # comment
//! call    app.py 1
//! line    app.py 3
//! return  app.py 3
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. The unit id runs from
//! the event kind to the trailing line number and may contain spaces.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use covtrace_core::{HookSlot, Host, SharedHook, StepFrame, TraceEvent};
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};

static EVENT_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Parsed event log.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<(TraceEvent, StepFrame)>,
}

impl EventLog {
    /// Parse a log. Unit ids are interned, so frames of the same unit share
    /// one allocation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] with the 1-based line number of the first
    /// malformed line.
    pub fn parse(text: &str) -> Result<Self> {
        let pattern = EVENT_PATTERN.get_or_init(|| {
            Regex::new(r"^(\w+)\s+(.+?)\s+(\d+)$").expect("event pattern is valid")
        });
        let mut units: FxHashMap<&str, Arc<str>> = FxHashMap::default();
        let mut events = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_error = |message: String| Error::Parse {
                line: idx + 1,
                message,
            };

            let caps = pattern
                .captures(line)
                .ok_or_else(|| parse_error(format!("expected `<event> <unit> <line>`, got `{line}`")))?;
            let event = TraceEvent::from_str(&caps[1]).map_err(parse_error)?;
            let unit = caps.get(2).map_or("", |m| m.as_str());
            let lineno = caps[3]
                .parse::<u32>()
                .map_err(|e| parse_error(format!("bad line number `{}`: {e}", &caps[3])))?;

            let unit = units
                .entry(unit)
                .or_insert_with(|| Arc::from(unit))
                .clone();
            events.push((event, StepFrame::new(unit, lineno)));
        }

        debug!(events = events.len(), units = units.len(), "parsed event log");
        Ok(Self { events })
    }

    /// Read and parse a log file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`parse`](Self::parse).
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(TraceEvent, StepFrame)> {
        self.events.iter()
    }
}

/// Host that delivers recorded events to whatever hook is installed.
#[derive(Debug, Default)]
pub struct ReplayHost {
    slot: HookSlot<StepFrame>,
}

impl ReplayHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver every event of `log` in order. Returns the number of events
    /// delivered.
    ///
    /// # Errors
    ///
    /// Stops at the first event the hook rejects and returns
    /// [`Error::Replay`] with its 0-based index.
    pub fn replay(&self, log: &EventLog) -> Result<usize> {
        for (index, (event, frame)) in log.iter().enumerate() {
            self.slot
                .dispatch(*event, frame)
                .map_err(|source| Error::Replay { index, source })?;
        }
        Ok(log.len())
    }
}

impl Host<StepFrame> for ReplayHost {
    fn set_trace(&self, hook: Option<SharedHook<StepFrame>>) {
        self.slot.set_trace(hook);
    }

    fn get_trace(&self) -> Option<SharedHook<StepFrame>> {
        self.slot.get_trace()
    }
}

#[cfg(test)]
mod tests {
    use covtrace_core::Frame;

    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let log = EventLog::parse(
            "# header\n\ncall app.py 1\n  line   app.py 2  \nreturn app.py 2\n",
        )
        .unwrap();
        assert_eq!(log.len(), 3);
        let (event, frame) = log.iter().nth(1).unwrap();
        assert_eq!(*event, TraceEvent::Line);
        assert_eq!(frame.unit(), "app.py");
        assert_eq!(frame.line(), 2);
    }

    #[test]
    fn test_parse_interns_units() {
        let log = EventLog::parse("call a.py 1\nline a.py 2\n").unwrap();
        let frames: Vec<_> = log.iter().map(|(_, frame)| frame.unit_arc()).collect();
        assert!(Arc::ptr_eq(frames[0], frames[1]));
    }

    #[test]
    fn test_parse_units_with_spaces() {
        let log = EventLog::parse(
            "call <frozen importlib._bootstrap> 1\nline   /home/J Doe/app.py   12\n",
        )
        .unwrap();
        let frames: Vec<_> = log.iter().map(|(_, frame)| frame).collect();
        assert_eq!(frames[0].unit(), "<frozen importlib._bootstrap>");
        assert_eq!(frames[0].line(), 1);
        assert_eq!(frames[1].unit(), "/home/J Doe/app.py");
        assert_eq!(frames[1].line(), 12);
    }

    #[test]
    fn test_parse_reports_line_numbers() {
        let err = EventLog::parse("call a.py 1\n\njump a.py 2\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }));
        assert!(err.to_string().contains("unknown event kind 'jump'"));

        let err = EventLog::parse("line a.py\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));

        let err = EventLog::parse("line a.py 99999999999\n").unwrap_err();
        assert!(err.to_string().contains("bad line number"));
    }

    #[test]
    fn test_replay_without_hook_is_noop() {
        let log = EventLog::parse("call a.py 1\nline a.py 2\n").unwrap();
        assert_eq!(ReplayHost::new().replay(&log).unwrap(), 2);
    }
}
