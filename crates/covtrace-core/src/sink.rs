//! Results sinks receiving `(tracename, line)` hits.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Receives line hits from a tracer.
///
/// Implementations must treat repeated `(tracename, line)` pairs as a
/// no-op. The tracer calls this once per traced line event, so it should be
/// cheap for already-seen pairs.
pub trait HitSink<T> {
    fn add_hit(&mut self, tracename: &T, line: u32);
}

impl<T, S: HitSink<T> + ?Sized> HitSink<T> for &mut S {
    #[inline]
    fn add_hit(&mut self, tracename: &T, line: u32) {
        (**self).add_hit(tracename, line);
    }
}

/// Shared single-threaded sink. The caller must not hold a borrow of the
/// inner sink while events are being dispatched.
impl<T, S: HitSink<T>> HitSink<T> for Rc<RefCell<S>> {
    #[inline]
    fn add_hit(&mut self, tracename: &T, line: u32) {
        self.borrow_mut().add_hit(tracename, line);
    }
}

impl<T, S: HitSink<T>> HitSink<T> for Arc<Mutex<S>> {
    #[inline]
    fn add_hit(&mut self, tracename: &T, line: u32) {
        self.lock().add_hit(tracename, line);
    }
}

impl<T: Clone + Eq + Hash, H: BuildHasher> HitSink<T> for HashSet<(T, u32), H> {
    fn add_hit(&mut self, tracename: &T, line: u32) {
        self.insert((tracename.clone(), line));
    }
}

/// Executed lines grouped by tracename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineData<T: Eq + Hash> {
    units: FxHashMap<T, BTreeSet<u32>>,
}

impl<T: Eq + Hash> Default for LineData<T> {
    fn default() -> Self {
        Self {
            units: FxHashMap::default(),
        }
    }
}

impl<T: Eq + Hash> LineData<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executed lines for `tracename`, in ascending order.
    #[must_use]
    pub fn lines(&self, tracename: &T) -> Option<&BTreeSet<u32>> {
        self.units.get(tracename)
    }

    #[must_use]
    pub fn contains(&self, tracename: &T, line: u32) -> bool {
        self.units
            .get(tracename)
            .is_some_and(|lines| lines.contains(&line))
    }

    /// Number of tracenames with at least one hit.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Total number of distinct `(tracename, line)` pairs.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.units.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &BTreeSet<u32>)> {
        self.units.iter()
    }

    /// Entries sorted by tracename.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&T, &BTreeSet<u32>)>
    where
        T: Ord,
    {
        let mut entries: Vec<_> = self.units.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl<T: Clone + Eq + Hash> HitSink<T> for LineData<T> {
    #[inline]
    fn add_hit(&mut self, tracename: &T, line: u32) {
        // Only clone the tracename the first time a unit is hit.
        if let Some(lines) = self.units.get_mut(tracename) {
            lines.insert(line);
        } else {
            self.units.insert(tracename.clone(), BTreeSet::from([line]));
        }
    }
}
