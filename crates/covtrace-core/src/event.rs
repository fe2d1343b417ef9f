//! Step events and the per-step frame view exposed by the host.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kind of step event delivered by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// A new frame was entered.
    Call,
    /// A new line is about to execute in the current frame.
    Line,
    /// The current frame is returning.
    Return,
    /// An exception is propagating through the current frame.
    Exception,
}

impl TraceEvent {
    /// Lowercase event name as used in event logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Line => "line",
            Self::Return => "return",
            Self::Exception => "exception",
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraceEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" => Ok(Self::Call),
            "line" => Ok(Self::Line),
            "return" => Ok(Self::Return),
            "exception" => Ok(Self::Exception),
            other => Err(format!("unknown event kind '{other}'")),
        }
    }
}

/// Per-step metadata the host exposes for the current frame.
///
/// The frame doubles as the decision context: it is handed to
/// [`ShouldTrace`](crate::ShouldTrace) on the first call into a unit.
pub trait Frame {
    /// Stable identifier of the unit executing in this frame (usually its path).
    fn unit(&self) -> &str;

    /// Line currently executing.
    fn line(&self) -> u32;
}

/// Owned frame snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepFrame {
    unit: Arc<str>,
    line: u32,
}

impl StepFrame {
    pub fn new(unit: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            unit: unit.into(),
            line,
        }
    }

    /// Shared handle to the unit identifier.
    #[must_use]
    pub fn unit_arc(&self) -> &Arc<str> {
        &self.unit
    }
}

impl Frame for StepFrame {
    fn unit(&self) -> &str {
        &self.unit
    }

    fn line(&self) -> u32 {
        self.line
    }
}
