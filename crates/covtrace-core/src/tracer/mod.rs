//! The coverage tracer and its lifecycle.
//!
//! A [`Tracer`] keeps one trace decision per active call frame. On a Call it
//! looks up (or computes, once per unit) whether the unit is traced and pushes
//! the result; on a Line it records a hit if the top frame is traced; on a
//! Return it pops. The host may drop a Return (see
//! [`TracerConfig::missing_return_markers`]), which the tracer compensates for.
//!
//! # Lifecycle
//!
//! `start` installs the tracer as the host's step hook, `stop` removes it.
//! Dropping a started tracer stops it first. The host is borrowed for as long
//! as the tracer is started.
//!
//! # Errors
//!
//! A failing decision function poisons the tracer: the frame whose decision
//! failed was never pushed, so the depth stack is out of step with the host.
//! Every later event fails with [`TraceError::Poisoned`] until `stop` discards
//! the unterminated frames. A stack allocation failure leaves the tracer
//! usable at its previous depth.

mod state;
mod stats;

#[cfg(test)]
mod tests;

use std::cell::{Ref, RefCell};
use std::hash::Hash;
use std::rc::Rc;

use tracing::{debug, info, warn};

use self::state::TracerCore;
pub use self::stats::TracerStats;
use crate::config::TracerConfig;
use crate::decision::{DecisionCache, ShouldTrace};
use crate::error::{Result, TraceError};
use crate::event::{Frame, TraceEvent};
use crate::hook::{Host, SharedHook};
use crate::sink::HitSink;

/// Line-coverage tracer for one logical call stack.
///
/// - `F`: frame type delivered by the host
/// - `T`: tracename type returned by the decision function
/// - `D`: decision function
/// - `S`: results sink
pub struct Tracer<'h, F, T, D, S> {
    core: Rc<RefCell<TracerCore<F, T, D, S>>>,
    /// Host we are registered with; `Some` iff started.
    host: Option<&'h dyn Host<F>>,
}

impl<F, T, D, S> Tracer<'_, F, T, D, S>
where
    F: Frame,
    T: Clone + Eq + Hash,
    D: ShouldTrace<F, T>,
    S: HitSink<T>,
{
    /// Create a stopped tracer with the default configuration.
    pub fn new(should_trace: D, results: S) -> Self {
        Self::with_config(should_trace, results, &TracerConfig::default())
    }

    /// Create a stopped tracer.
    pub fn with_config(should_trace: D, results: S, config: &TracerConfig) -> Self {
        Self {
            core: Rc::new(RefCell::new(TracerCore::new(should_trace, results, config))),
            host: None,
        }
    }

    /// Process one event directly, bypassing the host.
    ///
    /// This is the same entry point the host reaches through the installed
    /// hook.
    ///
    /// # Errors
    ///
    /// See [`TraceError`]. [`TraceError::Reentrant`] is returned when called
    /// from within an event being handled by this tracer.
    pub fn trace(&self, event: TraceEvent, frame: &F) -> Result<()> {
        self.core
            .try_borrow_mut()
            .map_err(|_| TraceError::Reentrant)?
            .handle(event, frame)
    }
}

impl<'h, F, T, D, S> Tracer<'h, F, T, D, S>
where
    F: Frame + 'static,
    T: Clone + Eq + Hash + 'static,
    D: ShouldTrace<F, T> + 'static,
    S: HitSink<T> + 'static,
{
    /// Register as the host's active step hook.
    ///
    /// The host must not have another tracer registered; whatever hook was
    /// installed is replaced. Calling `start` again on the same host simply
    /// re-registers; starting on a different host first stops on the old one.
    pub fn start(&mut self, host: &'h dyn Host<F>) {
        if let Some(prev) = self.host {
            if !std::ptr::addr_eq(prev, host) {
                self.stop();
            }
        }
        let hook: SharedHook<F> = self.core.clone();
        host.set_trace(Some(hook));
        self.host = Some(host);
        info!(depth = self.depth(), "tracer started");
    }
}

impl<F, T, D, S> Tracer<'_, F, T, D, S> {
    /// Deregister from the host. Deregistering is a no-op if not started.
    ///
    /// A poisoned tracer discards its unterminated frames here, started or
    /// not, and becomes usable again.
    pub fn stop(&mut self) {
        if let Ok(mut core) = self.core.try_borrow_mut() {
            if core.poisoned {
                core.recover();
            }
        }

        let Some(host) = self.host.take() else {
            return;
        };
        let still_ours = host
            .get_trace()
            .is_some_and(|hook| std::ptr::addr_eq(Rc::as_ptr(&hook), Rc::as_ptr(&self.core)));
        if !still_ours {
            warn!("trace function changed, measurement is likely wrong");
        }
        host.set_trace(None);

        info!(depth = self.depth(), "tracer stopped");
    }

    /// Forget the host without touching its hook, for when another tracer
    /// has since been installed there and must stay.
    pub fn detach(&mut self) {
        if self.host.take().is_some() {
            debug!(depth = self.depth(), "tracer detached");
        }
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.host.is_some()
    }

    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.core.borrow().poisoned
    }

    /// Current call depth, `-1` when no frame is tracked.
    #[must_use]
    pub fn depth(&self) -> isize {
        self.core.borrow().depth()
    }

    #[must_use]
    pub fn stats(&self) -> TracerStats {
        self.core.borrow().stats
    }

    /// Read-only view of the memoized decisions.
    #[must_use]
    pub fn decisions(&self) -> Ref<'_, DecisionCache<T>> {
        Ref::map(self.core.borrow(), |core| &core.cache)
    }

    /// Read-only view of the results sink.
    #[must_use]
    pub fn results(&self) -> Ref<'_, S> {
        Ref::map(self.core.borrow(), TracerCore::results)
    }
}

impl<F, T, D, S> Drop for Tracer<'_, F, T, D, S> {
    fn drop(&mut self) {
        self.stop();
    }
}
