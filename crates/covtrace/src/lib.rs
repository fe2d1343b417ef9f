//! covtrace - coverage collection sessions
//!
//! Builds on [`covtrace_core`]: a [`Collector`] runs one measurement session
//! over one or more tracers, [`replay`] feeds recorded event logs through a
//! tracer, and [`metrics`] publishes tracer statistics.
//!
//! # Example
//!
//! ```ignore
//! use covtrace::{Collector, EventLog, PrefixRules, ReplayHost};
//!
//! let host = ReplayHost::new();
//! let mut collector = Collector::new(PrefixRules::new().omit("lib/"));
//! collector.start(&host)?;
//! host.replay(&EventLog::load("run.log".as_ref())?)?;
//! collector.stop()?;
//! println!("{:?}", collector.line_data());
//! ```

pub use covtrace_core::{
    DecisionError, Frame, HitSink, Host, HookSlot, LineData, PYEXPAT_MARKER, SharedDecisions,
    SharedLineData, ShouldTrace, StepFrame, TraceDecision, TraceError, TraceEvent, Tracer,
    TracerConfig, TracerStats,
};

mod collector;
mod error;
mod filter;
pub mod metrics;
pub mod replay;

pub use collector::{Collector, LineSnapshot, SessionTracer, TracerSeed};
pub use error::{Error, Result};
pub use filter::PrefixRules;
pub use replay::{EventLog, ReplayHost};
