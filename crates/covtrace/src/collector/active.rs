//! Per-thread stack of started collectors.
//!
//! Collectors started on the same host nest. The newest one owns the host's
//! hook and the ones below it are shadowed until it stops, at which point the
//! hook of the next one down is reinstalled.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

struct Entry {
    host: *const (),
    id: u64,
    /// Hook to reinstall when this entry is uncovered; `None` while paused.
    hook: Option<Rc<dyn Any>>,
}

thread_local! {
    static ACTIVE: RefCell<Vec<Entry>> = const { RefCell::new(Vec::new()) };
}

pub(super) fn push(host: *const (), id: u64, hook: Option<Rc<dyn Any>>) {
    ACTIVE.with_borrow_mut(|active| active.push(Entry { host, id, hook }));
}

/// Whether `id` is the most recently started collector on `host`.
pub(super) fn is_top(host: *const (), id: u64) -> bool {
    ACTIVE.with_borrow(|active| {
        active
            .iter()
            .rev()
            .find(|entry| entry.host == host)
            .is_some_and(|entry| entry.id == id)
    })
}

/// Number of collectors started on `host`.
pub(super) fn depth(host: *const ()) -> usize {
    ACTIVE.with_borrow(|active| active.iter().filter(|entry| entry.host == host).count())
}

pub(super) fn set_hook(id: u64, hook: Option<Rc<dyn Any>>) {
    ACTIVE.with_borrow_mut(|active| {
        if let Some(entry) = active.iter_mut().find(|entry| entry.id == id) {
            entry.hook = hook;
        }
    });
}

/// Remove `id`. If it was on top, return the hook of the collector it
/// uncovers.
pub(super) fn remove(host: *const (), id: u64) -> Option<Rc<dyn Any>> {
    ACTIVE.with_borrow_mut(|active| {
        let pos = active.iter().position(|entry| entry.id == id)?;
        let was_top = !active[pos + 1..].iter().any(|entry| entry.host == host);
        active.remove(pos);
        if !was_top {
            return None;
        }
        active
            .iter()
            .rev()
            .find(|entry| entry.host == host)
            .and_then(|entry| entry.hook.clone())
    })
}
