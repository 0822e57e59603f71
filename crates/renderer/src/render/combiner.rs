//! Pool of compiled combiners.

use pica64::system::combiner::{CombineMode, Combiner};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::render::tev::{self, TevPlan};

/// A combiner together with the texture environment it maps to.
#[derive(Debug, Clone)]
pub struct Entry {
    pub combiner: Combiner,
    pub plan: TevPlan,
    /// Whether the plan is the fallback one.
    pub fallback: bool,
}

impl Entry {
    fn new(mode: CombineMode, warned: &mut FxHashSet<CombineMode>) -> Self {
        let combiner = Combiner::new(mode);
        let (plan, fallback) = match tev::plan(&combiner.features, &combiner.mapping) {
            Ok(plan) => (plan, false),
            Err(e) => {
                if warned.insert(mode) {
                    tracing::warn!(?mode, "unsupported combiner, using the default one: {e}");
                }

                (TevPlan::fallback(&combiner.features), true)
            }
        };

        Self {
            combiner,
            plan,
            fallback,
        }
    }
}

/// Ring of compiled combiners. When full, the oldest entry is replaced.
pub struct Cache {
    entries: Vec<Entry>,
    lookup: FxHashMap<CombineMode, usize>,
    warned: FxHashSet<CombineMode>,
    capacity: usize,
    next: usize,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            lookup: FxHashMap::default(),
            warned: FxHashSet::default(),
            capacity,
            next: 0,
        }
    }

    /// Returns the index of the entry for `mode`, compiling it if needed. The boolean tells
    /// whether it was created.
    pub fn get(&mut self, mode: CombineMode) -> (usize, bool) {
        if let Some(&index) = self.lookup.get(&mode) {
            return (index, false);
        }

        let entry = Entry::new(mode, &mut self.warned);
        let index = self.next;
        self.next = (self.next + 1) % self.capacity;

        if index < self.entries.len() {
            let old = std::mem::replace(&mut self.entries[index], entry);
            self.lookup.remove(&old.combiner.mode);
            tracing::debug!(mode = ?old.combiner.mode, "evicted combiner");
        } else {
            self.entries.push(entry);
        }

        self.lookup.insert(mode, index);
        (index, true)
    }

    pub fn entry(&self, index: usize) -> &Entry {
        &self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
