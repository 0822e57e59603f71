//! Renderer for the pica64 interpreter, targeting the PICA200 fragment pipeline.

pub mod gpu;
pub mod render;


use std::cell::Cell;
use std::rc::Rc;

use pica64::modules::render::{Action, RenderModule, TextureKey};
use serde::Deserialize;

use crate::gpu::Gpu;
use crate::render::Renderer as RendererInner;

pub use crate::render::stereo::StereoConfig;
pub use crate::render::texture::EvictionKind;

/// Renderer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stereo: StereoConfig,
    /// Textures kept on the GPU.
    pub texture_pool: u16,
    /// Buckets of the texture lookup table, rounded up to a power of two.
    pub texture_buckets: usize,
    pub eviction: EvictionKind,
    /// Compiled combiners kept around.
    pub combiner_pool: usize,
    /// Fog tables kept on the GPU.
    pub fog_cache: usize,
    /// Tell textures at the same address apart by their contents.
    pub verify_texture_contents: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stereo: StereoConfig::default(),
            texture_pool: 512,
            texture_buckets: 1024,
            eviction: EvictionKind::RoundRobin,
            combiner_pool: 64,
            fog_cache: 32,
            verify_texture_contents: true,
        }
    }
}

/// Statistics of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub draws: u32,
    /// Draws dropped because a texture they sample was not bound.
    pub dropped_draws: u32,
    pub clears: u32,
    /// State changes sent to the GPU.
    pub state_changes: u32,
    /// State changes skipped because the GPU already had the state.
    pub redundant_state: u32,
    pub combiners_created: u32,
    pub programs_created: u32,
    pub texture_uploads: u32,
    pub texture_hits: u32,
    pub texture_misses: u32,
    pub texture_evictions: u32,
    pub texture_invalidations: u32,
    pub fog_tables: u32,
}

impl std::ops::AddAssign for Stats {
    fn add_assign(&mut self, rhs: Self) {
        self.draws += rhs.draws;
        self.dropped_draws += rhs.dropped_draws;
        self.clears += rhs.clears;
        self.state_changes += rhs.state_changes;
        self.redundant_state += rhs.redundant_state;
        self.combiners_created += rhs.combiners_created;
        self.programs_created += rhs.programs_created;
        self.texture_uploads += rhs.texture_uploads;
        self.texture_hits += rhs.texture_hits;
        self.texture_misses += rhs.texture_misses;
        self.texture_evictions += rhs.texture_evictions;
        self.texture_invalidations += rhs.texture_invalidations;
        self.fog_tables += rhs.fog_tables;
    }
}

/// State shared between the renderer and its [`Handle`]s.
#[derive(Default)]
pub struct Shared {
    /// Position of the 3D slider, read at the start of every frame.
    pub slider: Cell<f32>,
    /// Statistics of the last submitted frame.
    pub stats: Cell<Stats>,
    pub frames: Cell<u64>,
}

/// Access to a renderer after it has been handed to the interpreter.
///
/// This type is reference counted and therefore cheaply clonable.
#[derive(Clone, Default)]
pub struct Handle {
    shared: Rc<Shared>,
}

impl Handle {
    /// Sets the 3D slider position, between zero (2D) and one.
    pub fn set_slider(&self, slider: f32) {
        self.shared.slider.set(slider);
    }

    /// Statistics of the last submitted frame.
    pub fn stats(&self) -> Stats {
        self.shared.stats.get()
    }

    pub fn frames(&self) -> u64 {
        self.shared.frames.get()
    }
}

/// A PICA200 renderer driving a [`Gpu`].
pub struct Renderer<G> {
    inner: RendererInner<G>,
}

impl<G: Gpu> Renderer<G> {
    pub fn new(gpu: G, config: Config) -> (Self, Handle) {
        let handle = Handle::default();
        let inner = RendererInner::new(gpu, config, handle.shared.clone());
        (Self { inner }, handle)
    }
}

impl<G: Gpu> RenderModule for Renderer<G> {
    fn exec(&mut self, action: Action<'_>) {
        self.inner.exec(action);
    }

    fn bind_cached_texture(&mut self, unit: u8, key: &TextureKey) -> bool {
        self.inner.bind_cached_texture(unit, key)
    }

    fn take_replaced_textures(&mut self) -> u8 {
        self.inner.take_replaced_textures()
    }
}
