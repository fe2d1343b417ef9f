//! Should-trace decisions and their per-tracer memoization.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::error::DecisionError;
use crate::event::Frame;

/// Whether a unit is traced, and under which name its hits are recorded.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TraceDecision<T> {
    /// Record line hits under this tracename.
    Trace(T),
    /// Do not record anything for this unit.
    Skip,
}

impl<T> TraceDecision<T> {
    #[must_use]
    pub const fn is_traced(&self) -> bool {
        matches!(self, Self::Trace(_))
    }

    /// The tracename, if traced.
    #[must_use]
    pub const fn tracename(&self) -> Option<&T> {
        match self {
            Self::Trace(name) => Some(name),
            Self::Skip => None,
        }
    }
}

impl<T> From<Option<T>> for TraceDecision<T> {
    fn from(name: Option<T>) -> Self {
        name.map_or(Self::Skip, Self::Trace)
    }
}

/// Decides whether a unit should be traced.
///
/// `Ok(Some(name))` traces the unit under `name`, `Ok(None)` skips it. The
/// tracer calls this at most once per distinct unit and memoizes the answer,
/// so implementations may be arbitrarily expensive.
///
/// Closures of the form `FnMut(&str, &F) -> Result<Option<T>, DecisionError>`
/// implement this trait.
pub trait ShouldTrace<F, T> {
    /// Decide for `unit`, first seen executing in `frame`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecisionError`] if the decision cannot be made. The tracer
    /// does not cache failures.
    fn should_trace(&mut self, unit: &str, frame: &F) -> Result<Option<T>, DecisionError>;
}

impl<F, T, D> ShouldTrace<F, T> for D
where
    D: FnMut(&str, &F) -> Result<Option<T>, DecisionError>,
{
    fn should_trace(&mut self, unit: &str, frame: &F) -> Result<Option<T>, DecisionError> {
        self(unit, frame)
    }
}

/// Memoized decisions keyed by unit identifier.
///
/// Grows monotonically for the lifetime of its tracer; entries are never
/// evicted.
#[derive(Clone, Debug)]
pub struct DecisionCache<T> {
    entries: FxHashMap<Box<str>, TraceDecision<T>>,
}

impl<T> Default for DecisionCache<T> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<T: Clone + Eq + Hash> DecisionCache<T> {
    /// Cached decision for `unit`.
    #[inline]
    #[must_use]
    pub fn get(&self, unit: &str) -> Option<&TraceDecision<T>> {
        self.entries.get(unit)
    }

    /// Return the cached decision for the frame's unit, asking `decide` on a
    /// miss. Failures are returned without touching the cache.
    ///
    /// The boolean is true when `decide` was invoked.
    pub(crate) fn resolve<F, D>(
        &mut self,
        frame: &F,
        decide: &mut D,
    ) -> Result<(TraceDecision<T>, bool), DecisionError>
    where
        F: Frame,
        D: ShouldTrace<F, T>,
    {
        let unit = frame.unit();
        if let Some(decision) = self.entries.get(unit) {
            return Ok((decision.clone(), false));
        }
        let decision = TraceDecision::from(decide.should_trace(unit, frame)?);
        self.entries.insert(unit.into(), decision.clone());
        Ok((decision, true))
    }

    #[must_use]
    pub fn contains(&self, unit: &str) -> bool {
        self.entries.contains_key(unit)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(unit, decision)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TraceDecision<T>)> {
        self.entries.iter().map(|(unit, d)| (&**unit, d))
    }
}
