//! Event-handling state machine.

use std::collections::TryReserveError;
use std::hash::Hash;
use std::marker::PhantomData;

use tracing::{debug, trace, warn};

use super::stats::TracerStats;
use crate::config::{DEFAULT_STACK_CAPACITY, TracerConfig};
use crate::decision::{DecisionCache, ShouldTrace, TraceDecision};
use crate::error::{Result, TraceError};
use crate::event::{Frame, TraceEvent};
use crate::hook::StepHook;
use crate::sink::HitSink;

/// Tracer state mutated on every event.
///
/// `stack[d]` holds the decision for the frame at depth `d`; the top of the
/// stack is the currently executing frame.
pub(super) struct TracerCore<F, T, D, S> {
    should_trace: D,
    results: S,
    pub(super) cache: DecisionCache<T>,
    stack: Vec<TraceDecision<T>>,
    missing_return_markers: Box<[Box<str>]>,
    pub(super) stats: TracerStats,
    pub(super) poisoned: bool,
    /// Make the next stack growth fail.
    #[cfg(test)]
    pub(super) fail_next_reserve: bool,
    _frame: PhantomData<fn(&F)>,
}

/// Reserve the initial depth stack, falling back to the default capacity
/// when the requested one cannot be allocated.
fn initial_stack<T>(capacity: usize) -> Vec<T> {
    let mut stack = Vec::new();
    if let Err(error) = stack.try_reserve_exact(capacity) {
        warn!(
            capacity,
            fallback = DEFAULT_STACK_CAPACITY,
            %error,
            "cannot reserve depth stack"
        );
        // Later growth failures surface as StackAlloc on Call.
        stack.try_reserve_exact(DEFAULT_STACK_CAPACITY).ok();
    }
    stack
}

impl<F, T, D, S> TracerCore<F, T, D, S> {
    pub(super) fn new(should_trace: D, results: S, config: &TracerConfig) -> Self {
        Self {
            should_trace,
            results,
            cache: DecisionCache::default(),
            stack: initial_stack(config.stack_capacity),
            missing_return_markers: config
                .missing_return_markers
                .iter()
                .map(|marker| marker.as_str().into())
                .collect(),
            stats: TracerStats::default(),
            poisoned: false,
            #[cfg(test)]
            fail_next_reserve: false,
            _frame: PhantomData,
        }
    }

    /// Current depth, `-1` when no frame is tracked.
    pub(super) fn depth(&self) -> isize {
        isize::try_from(self.stack.len()).map_or(isize::MAX, |len| len - 1)
    }

    pub(super) const fn results(&self) -> &S {
        &self.results
    }

    /// Drop unterminated frames and clear the poison flag. The decision
    /// cache survives.
    pub(super) fn recover(&mut self) {
        warn!(
            depth = self.depth(),
            "discarding frames of poisoned tracer"
        );
        self.stack.clear();
        self.poisoned = false;
    }
}

impl<F, T, D, S> TracerCore<F, T, D, S>
where
    F: Frame,
    T: Clone + Eq + Hash,
    D: ShouldTrace<F, T>,
    S: HitSink<T>,
{
    pub(super) fn handle(&mut self, event: TraceEvent, frame: &F) -> Result<()> {
        if self.poisoned {
            return Err(TraceError::Poisoned);
        }
        trace!(
            %event,
            unit = frame.unit(),
            line = frame.line(),
            depth = self.depth(),
            "step"
        );

        match event {
            TraceEvent::Call => self.on_call(frame)?,
            TraceEvent::Line => self.on_line(frame),
            TraceEvent::Return => self.on_return(),
            TraceEvent::Exception => {
                self.stats.exceptions += 1;
                if self.is_missing_return_source(frame.unit()) {
                    self.correct_missing_return(frame)?;
                }
            }
        }
        Ok(())
    }

    fn on_call(&mut self, frame: &F) -> Result<()> {
        self.stats.calls += 1;

        if self.stack.len() == self.stack.capacity() {
            if let Err(source) = self.grow_stack() {
                self.stats.errors += 1;
                return Err(TraceError::StackAlloc {
                    depth: self.stack.len(),
                    source,
                });
            }
            self.stats.stack_reallocs += 1;
        }

        let decision = match self.cache.resolve(frame, &mut self.should_trace) {
            Ok((decision, fresh)) => {
                if fresh {
                    self.stats.new_units += 1;
                    debug!(
                        unit = frame.unit(),
                        traced = decision.is_traced(),
                        "new unit"
                    );
                }
                decision
            }
            Err(source) => {
                // The frame is not pushed, so the stack no longer mirrors the
                // host's call stack. Refuse further events until stopped.
                self.poisoned = true;
                self.stats.errors += 1;
                warn!(unit = frame.unit(), error = %source, "should-trace failed, tracer poisoned");
                return Err(TraceError::Decision {
                    unit: frame.unit().into(),
                    source,
                });
            }
        };

        self.stack.push(decision);
        Ok(())
    }

    fn grow_stack(&mut self) -> std::result::Result<(), TryReserveError> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_reserve) {
            return Vec::<u8>::new().try_reserve(usize::MAX);
        }
        self.stack.try_reserve(1)
    }

    fn on_line(&mut self, frame: &F) {
        self.stats.lines += 1;
        if let Some(TraceDecision::Trace(name)) = self.stack.last() {
            self.results.add_hit(name, frame.line());
        }
    }

    fn on_return(&mut self) {
        self.stats.returns += 1;
        if self.stack.pop().is_none() {
            trace!("return with empty stack");
        }
    }

    /// Workaround for the pyexpat extension (CPython issue 6359): when an
    /// exception passes through its frames it reports the exception but never
    /// the return. This is a substring match on the unit id, not a structural
    /// check. Remove once no supported host has the defect.
    fn is_missing_return_source(&self, unit: &str) -> bool {
        self.missing_return_markers
            .iter()
            .any(|marker| unit.contains(&**marker))
    }

    /// Feed the Return the host should have sent. Recursion is bounded: a
    /// Return never triggers another correction.
    fn correct_missing_return(&mut self, frame: &F) -> Result<()> {
        self.stats.missed_returns += 1;
        debug!(
            unit = frame.unit(),
            depth = self.depth(),
            "exception without return, synthesizing return"
        );
        self.handle(TraceEvent::Return, frame)
    }
}

impl<F, T, D, S> StepHook<F> for TracerCore<F, T, D, S>
where
    F: Frame,
    T: Clone + Eq + Hash,
    D: ShouldTrace<F, T>,
    S: HitSink<T>,
{
    #[inline]
    fn on_step(&mut self, event: TraceEvent, frame: &F) -> Result<()> {
        self.handle(event, frame)
    }
}
