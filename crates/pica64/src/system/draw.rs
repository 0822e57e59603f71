//! Triangle batching and the state forwarded to the renderer.
//!
//! Every triangle first brings the renderer up to date with the RSP and RDP state it depends on.
//! A change of that state ends the current batch. What was last forwarded is kept in a [`Mirror`]
//! so unchanged state is never sent twice.

use color::Rgba8;

use crate::modules::render::{
    Action, Attributes, Batch, CullingMode, DepthMode, FogRange, Rect, Sampler, TexCoordTransform,
    TextureKey, Transforms, Wrap,
};
use crate::system::combiner::{CombineMode, Combiner, CombinerFlags, Input};
use crate::system::gbi::{AlphaCompare, BlendColor, DepthSource, GeometryMode};
use crate::system::rsp::VERTEX_POOL;
use crate::system::System;

/// Triangles per batch.
pub const MAX_TRIANGLES: u32 = 256;
/// Texture units a combiner can sample.
pub const TEXTURE_UNITS: usize = 2;

/// State last forwarded to the renderer. `None` means unknown.
#[derive(Debug, Clone, Default)]
pub struct Mirror {
    pub combiner: Option<CombineMode>,
    pub alpha_blend: Option<bool>,
    pub depth_mode: Option<DepthMode>,
    pub culling: Option<CullingMode>,
    pub viewport: Option<Rect>,
    pub scissor: Option<Rect>,
    pub textures: [Option<TextureKey>; TEXTURE_UNITS],
    pub samplers: [Option<Sampler>; TEXTURE_UNITS],
    pub prim_color: Option<Rgba8>,
    pub env_color: Option<Rgba8>,
    pub lod_fraction: Option<u8>,
    pub fog: Option<Option<FogRange>>,
    pub fog_color: Option<Rgba8>,
    pub transforms: Option<Transforms>,
}

#[derive(Default)]
pub struct Interface {
    // batch
    pub vertices: Vec<f32>,
    pub triangles: u32,
    pub attributes: Attributes,
    pub tex_coords: [TexCoordTransform; TEXTURE_UNITS],

    // state
    pub mirror: Mirror,

    // caches
    combiner: Option<Combiner>,
}

/// Forgets everything forwarded to the renderer.
pub fn reset(sys: &mut System) {
    sys.draw.vertices.clear();
    sys.draw.triangles = 0;
    sys.draw.mirror = Mirror::default();
    sys.rdp.textures_changed = [true; TEXTURE_UNITS];
}

/// Sends the current batch to the renderer, if there is one.
pub fn flush(sys: &mut System, reason: std::fmt::Arguments) {
    sys.stats.flushes += 1;
    if sys.draw.triangles == 0 {
        return;
    }

    tracing::debug!("flushing {} triangles: {reason}", sys.draw.triangles);
    sys.modules.render.exec(Action::Draw(Batch {
        attributes: sys.draw.attributes,
        tex_coords: sys.draw.tex_coords,
        vertices: &sys.draw.vertices,
        triangles: sys.draw.triangles,
    }));

    sys.draw.vertices.clear();
    sys.draw.triangles = 0;
    sys.stats.draws += 1;
}

/// The combine mode the current RDP state selects.
fn combine_mode(sys: &System) -> CombineMode {
    let oml = sys.rdp.other_mode_l;

    let texture_edge = oml.coverage_times_alpha();
    let alpha = !oml.blend_alpha_memory() || texture_edge;

    let mut flags = CombinerFlags::empty();
    flags.set(CombinerFlags::ALPHA, alpha);
    flags.set(CombinerFlags::FOG, oml.blend_color() == BlendColor::Fog);
    flags.set(CombinerFlags::TEXTURE_EDGE, texture_edge);
    flags.set(
        CombinerFlags::NOISE,
        oml.alpha_compare() == AlphaCompare::Dither,
    );

    let mode = if alpha {
        sys.rdp.combine_mode
    } else {
        sys.rdp.combine_mode.without_alpha()
    };

    mode.with_flags(flags)
}

/// The combiner for the current state, regenerated only when the combine mode changes.
fn combiner(sys: &mut System) -> Combiner {
    let mode = combine_mode(sys);
    match sys.draw.combiner {
        Some(combiner) if combiner.mode == mode => combiner,
        _ => {
            let combiner = Combiner::new(mode);
            tracing::trace!(?combiner, "generated combiner");
            sys.draw.combiner = Some(combiner);
            combiner
        }
    }
}

fn depth_mode(sys: &System) -> DepthMode {
    let oml = sys.rdp.other_mode_l;
    DepthMode {
        test: sys.rsp.geometry_mode.contains(GeometryMode::ZBUFFER),
        write: oml.depth_update(),
        decal: oml.depth_mode() == DepthSource::Decal,
    }
}

fn culling_mode(sys: &System) -> CullingMode {
    let front = sys.rsp.geometry_mode.contains(GeometryMode::CULL_FRONT);
    let back = sys.rsp.geometry_mode.contains(GeometryMode::CULL_BACK);
    match (front, back) {
        (false, false) => CullingMode::None,
        (true, false) => CullingMode::Front,
        (false, true) => CullingMode::Back,
        (true, true) => CullingMode::Both,
    }
}

fn sampler(sys: &System) -> Sampler {
    let tile = sys.rdp.render_tile();
    Sampler {
        linear: sys.rdp.linear_filter(),
        wrap_s: Wrap::from_tile_mode(u32::from(tile.cms)),
        wrap_t: Wrap::from_tile_mode(u32::from(tile.cmt)),
    }
}

/// Maps scaled vertex texture coordinates (s10.5) into the render tile.
fn tex_coord_transform(sys: &System) -> TexCoordTransform {
    let tile = sys.rdp.render_tile();
    let half = if sys.rdp.linear_filter() { 0.5 } else { 0.0 };

    let width = ((f32::from(tile.lrs) - f32::from(tile.uls) + 4.0) / 4.0).max(1.0);
    let height = ((f32::from(tile.lrt) - f32::from(tile.ult) + 4.0) / 4.0).max(1.0);

    TexCoordTransform {
        scale: [1.0 / (32.0 * width), 1.0 / (32.0 * height)],
        offset: [
            (half - f32::from(tile.uls) / 4.0) / width,
            (half - f32::from(tile.ult) / 4.0) / height,
        ],
    }
}

/// Binds the texture loaded for `unit`, converting it if the renderer does not have it cached.
fn update_texture(sys: &mut System, unit: usize) {
    let source = match sys.rdp.texture_source(&sys.mem, unit) {
        Ok(source) => source,
        Err(e) => {
            sys.malformed(format_args!("texture unit {unit}: {e}"));
            sys.stats.texture_failures += 1;
            return;
        }
    };

    let key = TextureKey {
        addr: sys.rdp.loaded[unit].addr,
        format: source.format,
        size: source.size,
        palette: source.palette_format,
        hash: source.content_hash(),
    };

    if sys.draw.mirror.textures[unit] == Some(key) {
        return;
    }

    flush(sys, format_args!("texture {unit} changed"));
    sys.draw.mirror.textures[unit] = None;

    if sys.modules.render.bind_cached_texture(unit as u8, &key) {
        sys.stats.texture_cache_hits += 1;
        sys.draw.mirror.textures[unit] = Some(key);
        return;
    }

    // the flush above needs the system mutably, so the source is resolved again
    let Ok(source) = sys.rdp.texture_source(&sys.mem, unit) else {
        return;
    };

    match sys.rdp.converter.convert(&source) {
        Ok(texture) => {
            tracing::debug!(
                addr = key.addr,
                width = texture.logical_width,
                height = texture.logical_height,
                format = ?texture.format,
                "loading texture"
            );

            sys.modules.render.exec(Action::LoadTexture {
                unit: unit as u8,
                key,
                texture: &texture,
            });

            sys.stats.texture_loads += 1;
            sys.draw.mirror.textures[unit] = Some(key);

            let replaced = sys.modules.render.take_replaced_textures();
            for other in (0..TEXTURE_UNITS).filter(|&other| replaced & (1 << other) != 0) {
                tracing::debug!(unit = other, "texture replaced by unit {unit}");
                sys.draw.mirror.textures[other] = None;
                sys.rdp.textures_changed[other] = true;
            }
        }
        Err(e) => {
            tracing::warn!("skipping texture at {:#010X}: {e}", key.addr);
            sys.stats.texture_failures += 1;
        }
    }
}

/// Forwards a piece of state if it differs from the mirrored one, flushing the batch first.
macro_rules! sync {
    ($sys:ident, $field:ident, $value:expr, $action:path) => {{
        let value = $value;
        if $sys.draw.mirror.$field != Some(value) {
            flush($sys, format_args!(concat!(stringify!($field), " changed")));
            $sys.modules.render.exec($action(value));
            $sys.draw.mirror.$field = Some(value);
        }
    }};
}

/// Brings the renderer up to date with the state the next triangle is drawn with.
fn prepare(sys: &mut System) -> Combiner {
    let combiner = combiner(sys);
    let flags = combiner.features.flags;

    sync!(sys, combiner, combiner.mode, Action::SetCombiner);
    sync!(
        sys,
        alpha_blend,
        flags.contains(CombinerFlags::ALPHA),
        Action::SetAlphaBlend
    );
    sync!(sys, depth_mode, depth_mode(sys), Action::SetDepthMode);
    sync!(sys, culling, culling_mode(sys), Action::SetCullingMode);
    sync!(sys, viewport, sys.rdp.viewport, Action::SetViewport);
    sync!(sys, scissor, sys.rdp.scissor, Action::SetScissor);

    // a load may replace the texture of a unit updated before it, which is then updated again
    let used = combiner.features.used_textures;
    for _ in 0..2 {
        for unit in (0..TEXTURE_UNITS).filter(|&unit| used[unit]) {
            if std::mem::take(&mut sys.rdp.textures_changed[unit]) {
                update_texture(sys, unit);
            }
        }
    }

    for unit in (0..TEXTURE_UNITS).filter(|&unit| used[unit]) {
        let sampler = sampler(sys);
        if sys.draw.mirror.samplers[unit] != Some(sampler) {
            flush(sys, format_args!("sampler {unit} changed"));
            sys.modules.render.exec(Action::SetSampler {
                unit: unit as u8,
                sampler,
            });
            sys.draw.mirror.samplers[unit] = Some(sampler);
        }
    }

    if combiner.uses(Input::Prim) {
        sync!(sys, prim_color, sys.rdp.prim_color, Action::SetPrimColor);
    }

    if combiner.uses(Input::Env) {
        sync!(sys, env_color, sys.rdp.env_color, Action::SetEnvColor);
    }

    if combiner.uses(Input::LodFraction) {
        sync!(
            sys,
            lod_fraction,
            sys.rdp.lod_fraction,
            Action::SetLodFraction
        );
    }

    if flags.contains(CombinerFlags::FOG) {
        sync!(sys, fog, sys.rsp.fog_range(), Action::SetFog);
        sync!(sys, fog_color, sys.rdp.fog_color, Action::SetFogColor);
    }

    let transforms = sys.rsp.vertex_transforms;
    if sys.draw.mirror.transforms != Some(transforms) {
        flush(sys, format_args!("transforms changed"));
        sys.modules.render.exec(Action::SetTransforms(&transforms));
        sys.draw.mirror.transforms = Some(transforms);
    }

    combiner
}

/// Appends a triangle made of loaded vertices to the batch.
pub fn triangle(sys: &mut System, indices: [usize; 3]) {
    if indices.iter().any(|&i| i >= VERTEX_POOL) {
        sys.malformed(format_args!("triangle with vertices {indices:?}"));
        return;
    }

    let combiner = prepare(sys);

    let mut attributes = Attributes::empty();
    attributes.set(Attributes::TEXCOORD, combiner.features.uses_texture());
    attributes.set(Attributes::COLOR, combiner.uses(Input::Shade));

    let mut tex_coords = [TexCoordTransform::default(); TEXTURE_UNITS];
    for (unit, transform) in tex_coords.iter_mut().enumerate() {
        if combiner.features.used_textures[unit] {
            *transform = tex_coord_transform(sys);
        }
    }

    if attributes != sys.draw.attributes || tex_coords != sys.draw.tex_coords {
        flush(sys, format_args!("vertex format changed"));
        sys.draw.attributes = attributes;
        sys.draw.tex_coords = tex_coords;
    }

    let draw = &mut sys.draw;
    for index in indices {
        let vertex = &sys.rsp.vertices[index];
        draw.vertices.extend(vertex.position.map(f32::from));

        if attributes.contains(Attributes::TEXCOORD) {
            draw.vertices.extend(vertex.tex_coord.map(f32::from));
        }

        if attributes.contains(Attributes::COLOR) {
            draw.vertices.extend(vertex.color.to_unorm());
        }
    }

    draw.triangles += 1;
    sys.stats.triangles += 1;

    if draw.triangles == MAX_TRIANGLES {
        flush(sys, format_args!("batch is full"));
    }
}
