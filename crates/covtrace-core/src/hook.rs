//! Host step-hook boundary.
//!
//! A host (the execution engine of the monitored program) has exactly one
//! step-hook slot per execution context. Registering a hook replaces whatever
//! was installed; there is no chaining. Callers that install a tracer are
//! expected to own the slot for the duration of the session.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{Result, TraceError};
use crate::event::TraceEvent;

/// Handler invoked synchronously by the host for every step event.
pub trait StepHook<F> {
    /// Handle one event for `frame`.
    ///
    /// # Errors
    ///
    /// Returns a [`TraceError`] on a tracer-level fault. The host should
    /// report it as such and stop the hook.
    fn on_step(&mut self, event: TraceEvent, frame: &F) -> Result<()>;
}

/// Hook handle stored in a host slot.
pub type SharedHook<F> = Rc<RefCell<dyn StepHook<F>>>;

/// Registration surface of a host execution context.
pub trait Host<F> {
    /// Install `hook` as the sole active step hook, or clear the slot with
    /// `None`.
    fn set_trace(&self, hook: Option<SharedHook<F>>);

    /// The currently installed hook, if any.
    fn get_trace(&self) -> Option<SharedHook<F>>;
}

/// Single-context hook slot.
///
/// Embedders own one `HookSlot` per execution context and call
/// [`dispatch`](Self::dispatch) from their step loop.
pub struct HookSlot<F> {
    hook: RefCell<Option<SharedHook<F>>>,
}

impl<F> Default for HookSlot<F> {
    fn default() -> Self {
        Self {
            hook: RefCell::new(None),
        }
    }
}

impl<F> fmt::Debug for HookSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl<F> HookSlot<F> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.hook.borrow().is_some()
    }

    /// Deliver one event to the installed hook, if any.
    ///
    /// # Errors
    ///
    /// Propagates the hook's [`TraceError`], or returns
    /// [`TraceError::Reentrant`] if the hook is already handling an event.
    pub fn dispatch(&self, event: TraceEvent, frame: &F) -> Result<()> {
        // Clone the handle so the hook may replace the slot contents.
        let Some(hook) = self.hook.borrow().clone() else {
            return Ok(());
        };
        let mut active = hook.try_borrow_mut().map_err(|_| TraceError::Reentrant)?;
        active.on_step(event, frame)
    }
}

impl<F> Host<F> for HookSlot<F> {
    fn set_trace(&self, hook: Option<SharedHook<F>>) {
        *self.hook.borrow_mut() = hook;
    }

    fn get_trace(&self) -> Option<SharedHook<F>> {
        self.hook.borrow().clone()
    }
}
