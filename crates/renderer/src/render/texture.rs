//! Texture identity cache.
//!
//! Maps [`TextureKey`]s to slots of a bounded pool of GPU textures through a power of two hash
//! table with chaining. Which slot a new texture takes is decided by an [`Eviction`] strategy.

use pica64::modules::render::TextureKey;
use picatex::NativeFormat;
use rustc_hash::FxBuildHasher;
use schnellru::{ByLength, LruMap};
use serde::Deserialize;

use crate::gpu::TextureSlot;

/// What an eviction strategy decided for a new texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// The slot was never used.
    Free(TextureSlot),
    /// The slot holds a texture that must be forgotten first.
    Evict(TextureSlot),
    /// Every slot must be forgotten. The next allocation starts over.
    Invalidate,
}

/// A slot replacement policy.
pub trait Eviction {
    /// Picks the slot for a new texture.
    fn allocate(&mut self) -> Allocation;
    /// Records a cache hit on `slot`.
    fn touch(&mut self, slot: TextureSlot);
    /// Forgets every slot.
    fn reset(&mut self);
}

/// Hands out slots in order and invalidates the whole cache once they run out.
pub struct RoundRobin {
    capacity: u16,
    next: u16,
}

impl RoundRobin {
    pub fn new(capacity: u16) -> Self {
        Self { capacity, next: 0 }
    }
}

impl Eviction for RoundRobin {
    fn allocate(&mut self) -> Allocation {
        if self.next == self.capacity {
            return Allocation::Invalidate;
        }

        self.next += 1;
        Allocation::Free(TextureSlot(self.next - 1))
    }

    fn touch(&mut self, _: TextureSlot) {}

    fn reset(&mut self) {
        self.next = 0;
    }
}

/// Evicts the least recently used slot.
pub struct Lru {
    capacity: u16,
    order: LruMap<TextureSlot, (), ByLength, FxBuildHasher>,
}

impl Lru {
    pub fn new(capacity: u16) -> Self {
        Self {
            capacity,
            order: LruMap::with_hasher(ByLength::new(u32::from(capacity)), FxBuildHasher),
        }
    }
}

impl Eviction for Lru {
    fn allocate(&mut self) -> Allocation {
        let used = self.order.len();
        if used < usize::from(self.capacity) {
            let slot = TextureSlot(used as u16);
            self.order.insert(slot, ());
            return Allocation::Free(slot);
        }

        match self.order.pop_oldest() {
            Some((slot, ())) => {
                self.order.insert(slot, ());
                Allocation::Evict(slot)
            }
            None => Allocation::Invalidate,
        }
    }

    fn touch(&mut self, slot: TextureSlot) {
        self.order.get(&slot);
    }

    fn reset(&mut self) {
        self.order.clear();
    }
}

/// Available eviction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionKind {
    #[default]
    RoundRobin,
    Lru,
}

impl EvictionKind {
    pub fn build(self, capacity: u16) -> Box<dyn Eviction> {
        match self {
            Self::RoundRobin => Box::new(RoundRobin::new(capacity)),
            Self::Lru => Box::new(Lru::new(capacity)),
        }
    }
}

/// Storage allocated on the GPU for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Storage {
    pub format: NativeFormat,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    key: Option<TextureKey>,
    next: Option<TextureSlot>,
    scale: [f32; 2],
    storage: Option<Storage>,
}

/// Per frame cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub hits: u32,
    pub misses: u32,
    pub evictions: u32,
    pub invalidations: u32,
}

pub struct Cache {
    buckets: Vec<Option<TextureSlot>>,
    slots: Vec<Slot>,
    eviction: Box<dyn Eviction>,
    /// Whether the content hash is part of the identity.
    verify_contents: bool,
    pub counters: Counters,
}

fn same_texture(a: &TextureKey, b: &TextureKey, verify_contents: bool) -> bool {
    a.addr == b.addr
        && a.format == b.format
        && a.size == b.size
        && a.palette == b.palette
        && (!verify_contents || a.hash == b.hash)
}

impl Cache {
    /// Creates a cache with `capacity` slots. `buckets` is rounded up to a power of two.
    pub fn new(
        capacity: u16,
        buckets: usize,
        eviction: Box<dyn Eviction>,
        verify_contents: bool,
    ) -> Self {
        Self {
            buckets: vec![None; buckets.max(1).next_power_of_two()],
            slots: vec![Slot::default(); usize::from(capacity.max(1))],
            eviction,
            verify_contents,
            counters: Counters::default(),
        }
    }

    fn bucket(&self, addr: u32) -> usize {
        ((addr >> 3) ^ (addr >> 13)) as usize & (self.buckets.len() - 1)
    }

    fn slot(&self, slot: TextureSlot) -> &Slot {
        &self.slots[usize::from(slot.0)]
    }

    fn slot_mut(&mut self, slot: TextureSlot) -> &mut Slot {
        &mut self.slots[usize::from(slot.0)]
    }

    /// Finds the slot holding the texture identified by `key`.
    pub fn lookup(&mut self, key: &TextureKey) -> Option<TextureSlot> {
        let mut current = self.buckets[self.bucket(key.addr)];
        while let Some(slot) = current {
            let entry = self.slot(slot);
            if entry
                .key
                .is_some_and(|k| same_texture(&k, key, self.verify_contents))
            {
                self.eviction.touch(slot);
                self.counters.hits += 1;
                return Some(slot);
            }

            current = entry.next;
        }

        None
    }

    fn unlink(&mut self, slot: TextureSlot) {
        let Some(key) = self.slot(slot).key else {
            return;
        };

        let bucket = self.bucket(key.addr);
        let next = self.slot(slot).next;
        if self.buckets[bucket] == Some(slot) {
            self.buckets[bucket] = next;
        } else {
            let mut current = self.buckets[bucket];
            while let Some(previous) = current {
                if self.slot(previous).next == Some(slot) {
                    self.slot_mut(previous).next = next;
                    break;
                }

                current = self.slot(previous).next;
            }
        }

        let entry = self.slot_mut(slot);
        entry.key = None;
        entry.next = None;
    }

    fn invalidate(&mut self) {
        tracing::debug!("texture pool exhausted, invalidating every texture");
        self.buckets.fill(None);
        for slot in &mut self.slots {
            slot.key = None;
            slot.next = None;
        }

        self.eviction.reset();
        self.counters.invalidations += 1;
    }

    /// Assigns a slot to a texture which missed the cache. Returns the slot and the storage it
    /// currently has on the GPU.
    pub fn insert(&mut self, key: TextureKey, scale: [f32; 2]) -> (TextureSlot, Option<Storage>) {
        self.counters.misses += 1;

        let mut invalidated = false;
        let slot = loop {
            match self.eviction.allocate() {
                Allocation::Free(slot) => break slot,
                Allocation::Evict(slot) => {
                    self.unlink(slot);
                    self.counters.evictions += 1;
                    break slot;
                }
                Allocation::Invalidate if invalidated => {
                    tracing::warn!("eviction strategy has no slots, reusing the first one");
                    self.unlink(TextureSlot(0));
                    break TextureSlot(0);
                }
                Allocation::Invalidate => {
                    self.invalidate();
                    invalidated = true;
                }
            }
        };

        let bucket = self.bucket(key.addr);
        let head = self.buckets[bucket];
        self.buckets[bucket] = Some(slot);

        let entry = self.slot_mut(slot);
        entry.key = Some(key);
        entry.next = head;
        entry.scale = scale;

        (slot, entry.storage)
    }

    /// Records the storage allocated on the GPU for a slot.
    pub fn set_storage(&mut self, slot: TextureSlot, storage: Storage) {
        self.slot_mut(slot).storage = Some(storage);
    }

    /// Ratio of logical to physical size of the texture in a slot.
    pub fn scale(&self, slot: TextureSlot) -> [f32; 2] {
        self.slot(slot).scale
    }
}
