//! Line-coverage tracer core.
//!
//! This crate provides the hot path of a coverage tool: a [`Tracer`] that is
//! installed as the host's step hook and, for every call/line/return/exception
//! event of the monitored program, records which `(tracename, line)` pairs
//! executed at least once.
//!
//! # Collaborators
//!
//! - [`ShouldTrace`]: decides whether a unit is traced and under which name.
//!   Called at most once per unit over a tracer's lifetime.
//! - [`HitSink`]: receives `(tracename, line)` insertions. Insertions are
//!   idempotent.
//! - [`Host`]: the execution engine's single step-hook slot.
//!
//! ```ignore
//! use covtrace_core::{HookSlot, LineData, StepFrame, Tracer, TraceEvent};
//!
//! let host = HookSlot::<StepFrame>::new();
//! let hits = Rc::new(RefCell::new(LineData::default()));
//! let mut tracer = Tracer::new(
//!     |unit: &str, _: &StepFrame| Ok(unit.ends_with(".py").then(|| Arc::<str>::from(unit))),
//!     Rc::clone(&hits),
//! );
//! tracer.start(&host);
//! host.dispatch(TraceEvent::Call, &StepFrame::new("a.py", 1))?;
//! tracer.stop();
//! ```

mod config;
mod decision;
mod error;
mod event;
mod hook;
mod shared;
mod sink;
mod tracer;

pub use config::{DEFAULT_STACK_CAPACITY, PYEXPAT_MARKER, TracerConfig};
pub use decision::{DecisionCache, ShouldTrace, TraceDecision};
pub use error::{DecisionError, Result, TraceError};
pub use event::{Frame, StepFrame, TraceEvent};
pub use hook::{Host, HookSlot, SharedHook, StepHook};
pub use shared::{SharedDecisions, SharedLineData};
pub use sink::{HitSink, LineData};
pub use tracer::{Tracer, TracerStats};
