//! Fog lookup tables.
//!
//! The PICA fog unit reads the fog factor from a 128 entry table indexed by depth. Each entry
//! holds the factor as an 11 bit value in bits `13..24` and the signed difference to the next
//! entry in bits `0..13`. A factor of one leaves the fragment untouched.

use pica64::modules::render::FogRange;
use rustc_hash::FxHashMap;

use crate::gpu::{FOG_LUT_LEN, FogSlot};

/// Largest factor value.
const FACTOR_MAX: f32 = 2047.0;

/// Fog factor at normalized depth `z`.
fn factor(range: FogRange, z: f32) -> f32 {
    let (near, far) = (range.near.0, range.far.0);
    if far <= near {
        return if z < near { 1.0 } else { 0.0 };
    }

    1.0 - ((z - near) / (far - near)).clamp(0.0, 1.0)
}

/// Builds the lookup table for a fog range.
pub fn lut(range: FogRange) -> [u32; FOG_LUT_LEN] {
    let value = |index: usize| {
        let z = index as f32 / FOG_LUT_LEN as f32;
        (factor(range, z) * FACTOR_MAX).round() as i32
    };

    std::array::from_fn(|index| {
        let current = value(index);
        let diff = value(index + 1) - current;
        ((diff as u32) & 0x1FFF) | ((current as u32) << 13)
    })
}

/// Ring of uploaded fog tables, keyed by range.
pub struct Cache {
    slots: Vec<Option<FogRange>>,
    lookup: FxHashMap<FogRange, FogSlot>,
    next: usize,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.clamp(1, usize::from(u8::MAX))],
            lookup: FxHashMap::default(),
            next: 0,
        }
    }

    /// Returns the slot holding the table for `range`. If it is not cached, a slot is assigned
    /// and the table to upload to it is returned as well.
    pub fn get(&mut self, range: FogRange) -> (FogSlot, Option<[u32; FOG_LUT_LEN]>) {
        if let Some(&slot) = self.lookup.get(&range) {
            return (slot, None);
        }

        let index = self.next;
        self.next = (self.next + 1) % self.slots.len();
        if let Some(old) = self.slots[index].replace(range) {
            self.lookup.remove(&old);
        }

        let slot = FogSlot(index as u8);
        self.lookup.insert(range, slot);
        tracing::debug!(?range, ?slot, "building fog table");

        (slot, Some(lut(range)))
    }
}
