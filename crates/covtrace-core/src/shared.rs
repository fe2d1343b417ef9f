//! State shared between per-thread tracers.
//!
//! One tracer follows one call stack, so a multi-threaded program needs one
//! tracer per thread. Those tracers share only the decision layer and the
//! results sink.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::decision::ShouldTrace;
use crate::error::DecisionError;
use crate::sink::LineData;

/// Results shared by every tracer of a session.
pub type SharedLineData<T> = Arc<Mutex<LineData<T>>>;

/// Decision function shared across tracers, memoized process-wide.
///
/// Each tracer still keeps its own [`DecisionCache`](crate::DecisionCache);
/// this layer makes sure the wrapped function runs at most once per unit
/// across all of them.
pub struct SharedDecisions<D, T> {
    inner: Arc<SharedInner<D, T>>,
}

struct SharedInner<D, T> {
    should_trace: Mutex<D>,
    known: RwLock<FxHashMap<Box<str>, Option<T>>>,
}

impl<D, T> Clone for SharedDecisions<D, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D, T> fmt::Debug for SharedDecisions<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDecisions")
            .field("units", &self.len())
            .finish_non_exhaustive()
    }
}

impl<D, T> SharedDecisions<D, T> {
    pub fn new(should_trace: D) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                should_trace: Mutex::new(should_trace),
                known: RwLock::new(FxHashMap::default()),
            }),
        }
    }

    /// Number of units decided so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.known.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every decision. Tracers already running keep their own cache.
    pub fn clear(&self) {
        self.inner.known.write().clear();
    }
}

impl<F, T, D> ShouldTrace<F, T> for SharedDecisions<D, T>
where
    T: Clone,
    D: ShouldTrace<F, T>,
{
    fn should_trace(&mut self, unit: &str, frame: &F) -> Result<Option<T>, DecisionError> {
        if let Some(known) = self.inner.known.read().get(unit) {
            return Ok(known.clone());
        }

        // Serialize decisions; another thread may have decided while we waited.
        let mut decide = self.inner.should_trace.lock();
        if let Some(known) = self.inner.known.read().get(unit) {
            return Ok(known.clone());
        }
        let decision = decide.should_trace(unit, frame)?;
        self.inner
            .known
            .write()
            .insert(unit.into(), decision.clone());
        Ok(decision)
    }
}
