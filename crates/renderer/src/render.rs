pub mod combiner;
pub mod fog;
pub mod program;
pub mod stereo;
pub mod tev;
pub mod texture;

use std::borrow::Cow;
use std::rc::Rc;

use color::Rgba8;
use glam::Mat4;
use pica64::modules::render::{
    Action, Batch, ClearFlags, CullingMode, DepthMode, FogRange, Rect, Sampler, Screen, TextureKey,
    Transforms,
};
use picatex::Texture;

use crate::gpu::{
    BufferId, Command, FogSlot, Gpu, MatrixUniform, ProgramId, Target, TextureSlot, VectorUniform,
};
use crate::render::stereo::Eye;
use crate::render::tev::{ConstantValue, MAX_STAGES};
use crate::render::texture::Storage;
use crate::{Config, Shared, Stats};

/// Height of both screens, in pixels.
pub const SCREEN_HEIGHT: f32 = 240.0;
/// Texture units a combiner can sample.
const TEXTURE_UNITS: usize = 2;

/// The last value sent to the GPU for a piece of state.
#[derive(Debug, Clone, Copy)]
enum Bound<T> {
    Unknown,
    Set(T),
}

impl<T> Default for Bound<T> {
    fn default() -> Self {
        Self::Unknown
    }
}

impl<T: PartialEq> Bound<T> {
    /// Records `value` as bound. Returns `false` if it already was.
    fn update(&mut self, value: T) -> bool {
        if matches!(self, Self::Set(current) if *current == value) {
            return false;
        }

        *self = Self::Set(value);
        true
    }
}

/// State the GPU currently has.
#[derive(Default)]
struct BoundState {
    target: Bound<Target>,
    program: Bound<ProgramId>,
    buffer: Bound<BufferId>,
    model_view: Bound<Mat4>,
    projection: Bound<Mat4>,
    preset: Bound<Mat4>,
    tex_coords: [Bound<[f32; 4]>; TEXTURE_UNITS],
    tev: Bound<usize>,
    constants: [Bound<Rgba8>; MAX_STAGES],
    alpha_test: Bound<Option<u8>>,
    blend: Bound<bool>,
    fog: Bound<Option<FogSlot>>,
    fog_color: Bound<Rgba8>,
    textures: [Bound<TextureSlot>; TEXTURE_UNITS],
    samplers: [Bound<Sampler>; TEXTURE_UNITS],
    viewport: Bound<Rect>,
    scissor: Bound<Rect>,
    depth: Bound<DepthMode>,
    culling: Bound<CullingMode>,
}

/// State requested by the interpreter, applied when drawing.
#[derive(Default)]
struct DesiredState {
    viewport: Rect,
    scissor: Rect,
    depth: DepthMode,
    culling: CullingMode,
    blend: bool,
    combiner: Option<usize>,
    prim_color: Rgba8,
    env_color: Rgba8,
    lod_fraction: u8,
    fog: Option<FogRange>,
    fog_color: Rgba8,
    samplers: [Sampler; TEXTURE_UNITS],
    textures: [Option<TextureSlot>; TEXTURE_UNITS],
    transforms: Transforms,
}

#[derive(Debug, Clone, Copy)]
struct ClearValues {
    color: Rgba8,
    depth: f32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: Rgba8::BLACK,
            depth: 1.0,
        }
    }
}

fn screen_index(screen: Screen) -> usize {
    match screen {
        Screen::Top => 0,
        Screen::Bottom => 1,
    }
}

fn target_index(target: Target) -> usize {
    match target {
        Target::TopLeft => 0,
        Target::TopRight => 1,
        Target::Bottom => 2,
    }
}

fn target_screen(target: Target) -> Screen {
    match target {
        Target::TopLeft | Target::TopRight => Screen::Top,
        Target::Bottom => Screen::Bottom,
    }
}

/// Sends `$command` if `$value` differs from what `$bound` holds.
macro_rules! apply {
    ($self:ident, $bound:expr, $value:expr, $command:expr) => {{
        let value = $value;
        if $bound.update(value) {
            $self.gpu.submit($command(value));
            $self.stats.state_changes += 1;
        } else {
            $self.stats.redundant_state += 1;
        }
    }};
}

pub struct Renderer<G> {
    gpu: G,
    config: Config,
    shared: Rc<Shared>,

    // caches
    combiners: combiner::Cache,
    programs: program::Cache,
    textures: texture::Cache,
    fog_tables: fog::Cache,

    // state
    desired: DesiredState,
    bound: BoundState,
    clear_values: [ClearValues; 2],
    pending_clears: [ClearFlags; 3],
    slider: f32,
    stats: Stats,
    /// Units whose texture was replaced by a load into another unit, as a bit mask.
    replaced_textures: u8,
    warned_draw_without_combiner: bool,
    warned_draw_without_texture: bool,
}

impl<G: Gpu> Renderer<G> {
    pub fn new(gpu: G, config: Config, shared: Rc<Shared>) -> Self {
        let texture_pool = config.texture_pool.max(1);
        Self {
            combiners: combiner::Cache::new(config.combiner_pool),
            programs: program::Cache::default(),
            textures: texture::Cache::new(
                texture_pool,
                config.texture_buckets,
                config.eviction.build(texture_pool),
                config.verify_texture_contents,
            ),
            fog_tables: fog::Cache::new(config.fog_cache),

            desired: DesiredState::default(),
            bound: BoundState::default(),
            clear_values: Default::default(),
            pending_clears: Default::default(),
            slider: 0.0,
            stats: Stats::default(),
            replaced_textures: 0,
            warned_draw_without_combiner: false,
            warned_draw_without_texture: false,

            gpu,
            config,
            shared,
        }
    }

    pub fn exec(&mut self, action: Action<'_>) {
        match action {
            Action::StartFrame => self.start_frame(),
            Action::EndFrame => self.end_frame(),
            Action::SetViewport(rect) => self.desired.viewport = rect,
            Action::SetScissor(rect) => self.desired.scissor = rect,
            Action::SetDepthMode(mode) => self.desired.depth = mode,
            Action::SetCullingMode(mode) => self.desired.culling = mode,
            Action::SetAlphaBlend(enabled) => self.desired.blend = enabled,
            Action::SetCombiner(mode) => {
                let (index, created) = self.combiners.get(mode);
                if created {
                    self.stats.combiners_created += 1;
                    tracing::debug!(
                        ?mode,
                        index,
                        fallback = self.combiners.entry(index).fallback,
                        pooled = self.combiners.len(),
                        "compiled combiner"
                    );

                    // the slot may have held the bound combiner
                    if matches!(self.bound.tev, Bound::Set(bound) if bound == index) {
                        self.bound.tev = Bound::Unknown;
                    }
                }

                self.desired.combiner = Some(index);
            }
            Action::SetPrimColor(color) => self.desired.prim_color = color,
            Action::SetEnvColor(color) => self.desired.env_color = color,
            Action::SetFogColor(color) => self.desired.fog_color = color,
            Action::SetLodFraction(fraction) => self.desired.lod_fraction = fraction,
            Action::SetFog(range) => self.desired.fog = range,
            Action::SetSampler { unit, sampler } => {
                if let Some(slot) = self.desired.samplers.get_mut(usize::from(unit)) {
                    *slot = sampler;
                }
            }
            Action::LoadTexture { unit, key, texture } => self.load_texture(unit, key, texture),
            Action::SetTransforms(transforms) => self.desired.transforms = *transforms,
            Action::SetClearColor { screen, color } => {
                self.clear_values[screen_index(screen)].color = color;
            }
            Action::SetClearDepth { screen, depth } => {
                self.clear_values[screen_index(screen)].depth = depth;
            }
            Action::RequestClear { screen, flags } => {
                for target in self.targets(screen) {
                    self.pending_clears[target_index(target)] |= flags;
                }
            }
            Action::Draw(batch) => self.draw(&batch),
        }
    }

    fn targets(&self, screen: Screen) -> Vec<Target> {
        match screen {
            Screen::Top => stereo::eyes(self.slider)
                .iter()
                .map(|eye| eye.target())
                .collect(),
            Screen::Bottom => vec![Target::Bottom],
        }
    }

    fn start_frame(&mut self) {
        self.slider = self.shared.slider.get().clamp(0.0, 1.0);
        self.stats = Stats::default();
        self.textures.counters = Default::default();

        // the render target is swapped between frames
        self.bound.target = Bound::Unknown;

        self.pending_clears = Default::default();
        for screen in [Screen::Top, Screen::Bottom] {
            for target in self.targets(screen) {
                self.pending_clears[target_index(target)] = ClearFlags::all();
            }
        }

        self.gpu.submit(Command::BeginFrame);
    }

    fn end_frame(&mut self) {
        for target in [Target::TopLeft, Target::TopRight, Target::Bottom] {
            self.clear_pending(target);
        }

        self.gpu.submit(Command::EndFrame);

        let counters = self.textures.counters;
        self.stats.texture_hits = counters.hits;
        self.stats.texture_misses = counters.misses;
        self.stats.texture_evictions = counters.evictions;
        self.stats.texture_invalidations = counters.invalidations;

        let stats = self.stats;
        tracing::debug!(
            draws = stats.draws,
            state_changes = stats.state_changes,
            redundant = stats.redundant_state,
            texture_uploads = stats.texture_uploads,
            "frame submitted"
        );

        self.shared.stats.set(stats);
        self.shared.frames.set(self.shared.frames.get() + 1);
    }

    /// Emits the clear still pending for `target`, if any.
    fn clear_pending(&mut self, target: Target) {
        let flags = std::mem::take(&mut self.pending_clears[target_index(target)]);
        if flags.is_empty() {
            return;
        }

        let values = self.clear_values[screen_index(target_screen(target))];
        self.gpu.submit(Command::Clear {
            target,
            flags,
            color: values.color,
            depth: values.depth,
        });

        self.stats.clears += 1;
    }

    pub fn bind_cached_texture(&mut self, unit: u8, key: &TextureKey) -> bool {
        let unit = usize::from(unit);
        if unit >= TEXTURE_UNITS {
            return false;
        }

        match self.textures.lookup(key) {
            Some(slot) => {
                self.desired.textures[unit] = Some(slot);
                self.replaced_textures &= !(1 << unit);
                true
            }
            None => false,
        }
    }

    fn load_texture(&mut self, unit: u8, key: TextureKey, texture: &Texture<'_>) {
        let unit = usize::from(unit);
        let (Ok(width), Ok(height)) = (u16::try_from(texture.width), u16::try_from(texture.height))
        else {
            tracing::warn!(
                "texture at {:#010X} is too large ({}x{})",
                key.addr,
                texture.width,
                texture.height
            );
            return;
        };

        if unit >= TEXTURE_UNITS {
            return;
        }

        let (slot, storage) = self.textures.insert(key, texture.scale());
        let wanted = Storage {
            format: texture.format,
            width,
            height,
        };

        if storage != Some(wanted) {
            self.gpu.submit(Command::CreateTexture {
                slot,
                format: wanted.format,
                width,
                height,
            });
            self.textures.set_storage(slot, wanted);
        }

        self.gpu.submit(Command::UploadTexture {
            slot,
            data: Cow::Borrowed(texture.data),
        });
        self.stats.texture_uploads += 1;

        // another unit may have been using the replaced texture
        for (other, desired) in self.desired.textures.iter_mut().enumerate() {
            if other != unit && *desired == Some(slot) {
                tracing::debug!(unit = other, ?slot, "texture replaced while in use");
                *desired = None;
                self.replaced_textures |= 1 << other;
            }
        }

        self.desired.textures[unit] = Some(slot);
        self.replaced_textures &= !(1 << unit);
    }

    pub fn take_replaced_textures(&mut self) -> u8 {
        std::mem::take(&mut self.replaced_textures)
    }

    fn constant_color(&self, value: ConstantValue) -> Rgba8 {
        match value {
            ConstantValue::Zero => Rgba8::TRANSPARENT,
            ConstantValue::Prim => self.desired.prim_color,
            ConstantValue::Env => self.desired.env_color,
            ConstantValue::LodFraction => {
                let fraction = self.desired.lod_fraction;
                Rgba8::new(fraction, fraction, fraction, fraction)
            }
        }
    }

    fn draw(&mut self, batch: &Batch<'_>) {
        let Some(index) = self.desired.combiner else {
            if !std::mem::replace(&mut self.warned_draw_without_combiner, true) {
                tracing::warn!("dropping draw issued before any combiner");
            }
            return;
        };

        let vertices = batch.triangles * 3;
        if vertices == 0 {
            return;
        }

        // a unit loses its texture when another unit's load replaces it
        let used = self.combiners.entry(index).combiner.features.used_textures;
        let missing = (0..TEXTURE_UNITS)
            .find(|&unit| used[unit] && self.desired.textures[unit].is_none());
        if let Some(unit) = missing {
            if !std::mem::replace(&mut self.warned_draw_without_texture, true) {
                tracing::warn!(unit, "dropping draw sampling a unit without a texture");
            }

            self.stats.dropped_draws += 1;
            return;
        }

        // vertex program and data
        let (program, created) = self.programs.get(&mut self.gpu, batch.attributes);
        if created {
            self.stats.programs_created += 1;
            tracing::debug!(programs = self.programs.len(), "new vertex layout");
        }

        apply!(self, self.bound.program, program.id, Command::BindProgram);
        apply!(self, self.bound.buffer, program.buffer, Command::BindBuffer);
        self.gpu.submit(Command::UploadVertices {
            buffer: program.buffer,
            data: Cow::Borrowed(batch.vertices),
        });

        // texture environment
        let entry = self.combiners.entry(index);
        let features = entry.combiner.features;
        let uses_fog = entry.plan.fog;
        let alpha_test = entry.plan.alpha_test;
        if self.bound.tev.update(index) {
            self.gpu
                .submit(Command::SetTevStages(Cow::Borrowed(&entry.plan.stages)));
            self.stats.state_changes += 1;
        } else {
            self.stats.redundant_state += 1;
        }

        for (stage, tev_stage) in entry.plan.stages.iter().enumerate() {
            let [rgb, alpha] = tev_stage.constant;
            let color = self.constant_color(rgb);
            let color = Rgba8 {
                a: self.constant_color(alpha).a,
                ..color
            };

            apply!(self, self.bound.constants[stage], color, |color| {
                Command::SetTevConstant {
                    stage: stage as u8,
                    color,
                }
            });
        }

        apply!(self, self.bound.alpha_test, alpha_test, Command::SetAlphaTest);
        apply!(self, self.bound.blend, self.desired.blend, Command::SetBlend);

        // fog
        let fog = match self.desired.fog.filter(|_| uses_fog) {
            Some(range) => {
                let (slot, lut) = self.fog_tables.get(range);
                if let Some(lut) = lut {
                    self.gpu.submit(Command::UploadFogLut {
                        slot,
                        lut: Cow::Borrowed(&lut),
                    });
                    self.stats.fog_tables += 1;
                }

                apply!(
                    self,
                    self.bound.fog_color,
                    self.desired.fog_color,
                    Command::SetFogColor
                );
                Some(slot)
            }
            None => None,
        };

        apply!(self, self.bound.fog, fog, Command::SelectFogLut);

        // textures
        for unit in 0..TEXTURE_UNITS {
            if !features.used_textures[unit] {
                continue;
            }

            let Some(slot) = self.desired.textures[unit] else {
                continue;
            };

            apply!(self, self.bound.textures[unit], slot, |slot| {
                Command::BindTexture {
                    unit: unit as u8,
                    slot,
                }
            });

            apply!(
                self,
                self.bound.samplers[unit],
                self.desired.samplers[unit],
                |sampler| Command::SetSampler {
                    unit: unit as u8,
                    sampler
                }
            );

            let transform = batch.tex_coords[unit];
            let [scale_s, scale_t] = self.textures.scale(slot);
            let value = [
                transform.scale[0] * scale_s,
                transform.scale[1] * scale_t,
                transform.offset[0] * scale_s,
                transform.offset[1] * scale_t,
            ];

            apply!(self, self.bound.tex_coords[unit], value, |value| {
                Command::SetVector {
                    uniform: VectorUniform::TexCoord(unit as u8),
                    value,
                }
            });
        }

        // raster state
        apply!(self, self.bound.depth, self.desired.depth, Command::SetDepth);
        apply!(
            self,
            self.bound.culling,
            self.desired.culling,
            Command::SetCulling
        );

        let transforms = self.desired.transforms;
        apply!(
            self,
            self.bound.model_view,
            transforms.model_view,
            |value| Command::SetMatrix {
                uniform: MatrixUniform::ModelView,
                value
            }
        );
        apply!(
            self,
            self.bound.preset,
            stereo::preset(transforms.aspect),
            |value| Command::SetMatrix {
                uniform: MatrixUniform::Preset,
                value
            }
        );

        for &eye in stereo::eyes(self.slider) {
            self.draw_pass(eye, vertices);
        }
    }

    /// Draws the uploaded vertices for one eye.
    fn draw_pass(&mut self, eye: Eye, vertices: u32) {
        let target = eye.target();
        apply!(self, self.bound.target, target, Command::SetTarget);
        self.clear_pending(target);

        let viewport = stereo::rotate(self.desired.viewport, SCREEN_HEIGHT);
        let scissor = stereo::rotate(self.desired.scissor, SCREEN_HEIGHT);
        apply!(self, self.bound.viewport, viewport, Command::SetViewport);
        apply!(self, self.bound.scissor, scissor, Command::SetScissor);

        let tilt = stereo::tilt(eye, self.slider, self.config.stereo);
        apply!(
            self,
            self.bound.projection,
            tilt * self.desired.transforms.projection,
            |value| Command::SetMatrix {
                uniform: MatrixUniform::Projection,
                value
            }
        );

        self.gpu.submit(Command::Draw { vertices });
        self.stats.draws += 1;
    }
}
