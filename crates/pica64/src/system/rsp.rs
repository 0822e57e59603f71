//! Reality Signal Processor: matrices, lights and vertex loading.

use bitos::BitUtils;
use color::Rgba8;
use glam::{Mat3, Mat4, Vec3};
use ordered_float::OrderedFloat;

use crate::modules::render::{FogRange, Transforms};
use crate::system::gbi::{
    Command, GeometryMode, Halves, Light, Mtx, TextureState, VertexLoad, Vp, Vtx, mtx, mv, mw,
};
use crate::system::{System, draw, rdp};

/// Depth of the model view matrix stack.
pub const MATRIX_STACK_DEPTH: usize = 11;
/// Maximum number of active lights, ambient included.
pub const MAX_LIGHTS: usize = 3;
/// Number of light slots MOVEMEM can write.
pub const LIGHT_SLOTS: usize = 8;
/// Vertices VTX can load.
pub const MAX_VERTICES: usize = 16;
/// Extra vertices used to draw rectangles.
pub const RECT_VERTICES: usize = 4;
pub const VERTEX_POOL: usize = MAX_VERTICES + RECT_VERTICES;

/// A vertex after VTX: lit, with texture coordinates scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadedVertex {
    pub position: [i16; 4],
    pub tex_coord: [i16; 2],
    pub color: Rgba8,
}

pub struct Interface {
    // matrices
    pub model_view: [Mat4; MATRIX_STACK_DEPTH],
    /// Number of matrices in the model view stack, at least one.
    pub depth: usize,
    pub projection: Mat4,
    pub matrices_dirty: bool,
    /// Transforms of the vertices currently in the pool.
    pub vertex_transforms: Transforms,

    // lighting
    pub lights: [Light; LIGHT_SLOTS],
    /// Active lights, ambient included. The ambient light is the last one.
    pub num_lights: usize,
    pub lights_changed: bool,
    /// Lookat X and Y directions used by texture coordinate generation.
    pub lookat: [[i8; 3]; 2],

    // state
    pub geometry_mode: GeometryMode,
    /// Texture coordinate scale, u0.16.
    pub texture_scale: [u16; 2],
    pub texture_on: bool,
    pub texture_tile: u8,
    pub fog_multiplier: i16,
    pub fog_offset: i16,
    pub vertices: [LoadedVertex; VERTEX_POOL],

    // caches
    light_dirs: [Vec3; MAX_LIGHTS],
    lookat_dirs: [Vec3; 2],
}

impl Default for Interface {
    fn default() -> Self {
        Self {
            model_view: [Mat4::IDENTITY; MATRIX_STACK_DEPTH],
            depth: 1,
            projection: Mat4::IDENTITY,
            matrices_dirty: true,
            vertex_transforms: Transforms::default(),
            lights: [Light::default(); LIGHT_SLOTS],
            num_lights: 2,
            lights_changed: true,
            lookat: [[127, 0, 0], [0, 127, 0]],
            geometry_mode: GeometryMode::empty(),
            texture_scale: [0xFFFF; 2],
            texture_on: false,
            texture_tile: 0,
            fog_multiplier: 0,
            fog_offset: 0,
            vertices: [LoadedVertex::default(); VERTEX_POOL],
            light_dirs: [Vec3::ZERO; MAX_LIGHTS],
            lookat_dirs: [Vec3::X, Vec3::Y],
        }
    }
}

/// A direction given in model view space, brought into model space and normalized.
fn model_space_direction(model_view: Mat4, dir: [i8; 3]) -> Vec3 {
    let dir = Vec3::from(dir.map(f32::from)) / 127.0;
    (Mat3::from_mat4(model_view).transpose() * dir).normalize_or_zero()
}

impl Interface {
    /// Top of the model view stack.
    #[inline(always)]
    pub fn model_view(&self) -> Mat4 {
        self.model_view[self.depth - 1]
    }

    /// Recomputes light and lookat directions if the model view matrix or the lights changed.
    pub fn update_lights(&mut self) {
        if !self.lights_changed {
            return;
        }

        let model_view = self.model_view();
        for (dir, light) in self.light_dirs.iter_mut().zip(&self.lights) {
            *dir = model_space_direction(model_view, light.direction);
        }

        for (dir, lookat) in self.lookat_dirs.iter_mut().zip(self.lookat) {
            *dir = model_space_direction(model_view, lookat);
        }

        self.lights_changed = false;
    }

    /// Color of a vertex with the given normal under the active lights.
    pub fn lit_color(&self, normal: [i8; 3]) -> [u8; 3] {
        let normal = Vec3::from(normal.map(f32::from));
        let ambient = self.num_lights - 1;

        let mut rgb = self.lights[ambient].color.map(i32::from);
        for (light, dir) in self.lights[..ambient].iter().zip(&self.light_dirs) {
            let intensity = normal.dot(*dir) / 127.0;
            if intensity > 0.0 {
                for (channel, color) in rgb.iter_mut().zip(light.color) {
                    *channel = (*channel as f32 + intensity * f32::from(color)) as i32;
                }
            }
        }

        rgb.map(|c| c.clamp(0, 255) as u8)
    }

    /// Generated texture coordinates for a vertex with the given normal.
    pub fn texgen(&self, normal: [i8; 3]) -> [i16; 2] {
        let normal = Vec3::from(normal.map(f32::from));
        let linear = self
            .geometry_mode
            .contains(GeometryMode::TEXTURE_GEN_LINEAR);

        std::array::from_fn(|i| {
            let dot = (normal.dot(self.lookat_dirs[i]) / 127.0).clamp(-1.0, 1.0);
            let coord = if linear {
                (-dot).acos() / 4.0
            } else {
                (dot + 1.0) / 4.0
            };

            // float to int casts saturate
            (coord * f32::from(self.texture_scale[i])) as i16
        })
    }

    /// Texture coordinates scaled by the texture scale.
    pub fn scale_tex_coord(&self, tex_coord: [i16; 2]) -> [i16; 2] {
        std::array::from_fn(|i| {
            ((i32::from(tex_coord[i]) * i32::from(self.texture_scale[i])) >> 16) as i16
        })
    }

    /// Fog range described by the fog factor, in normalized depth.
    pub fn fog_range(&self) -> Option<FogRange> {
        if self.fog_multiplier == 0 {
            return None;
        }

        let multiplier = f32::from(self.fog_multiplier);
        let offset = f32::from(self.fog_offset);
        let near = (-offset / multiplier + 1.0) / 2.0;
        let far = ((255.0 - offset) / multiplier + 1.0) / 2.0;

        Some(FogRange {
            near: OrderedFloat(near),
            far: OrderedFloat(far),
        })
    }
}

/// Resets the state that does not carry over between frames.
pub fn reset(sys: &mut System) {
    let rsp = &mut sys.rsp;
    rsp.depth = 1;
    rsp.num_lights = 2;
    rsp.lights_changed = true;
    rsp.matrices_dirty = true;
}

pub fn matrix(sys: &mut System, cmd: Command) {
    let params = cmd.params();
    let addr = sys.mem.resolve(cmd.w1);
    let Some(mat) = sys.mem.read::<Mtx>(addr).map(Mtx::to_mat4) else {
        sys.malformed(format_args!("matrix at {addr:#010X} is out of bounds"));
        return;
    };

    let rsp = &mut sys.rsp;
    if params & mtx::PROJECTION != 0 {
        if params & mtx::LOAD != 0 {
            rsp.projection = mat;
        } else {
            rsp.projection *= mat;
        }
    } else {
        // pushes past the end of the stack are dropped
        if params & mtx::PUSH != 0 && rsp.depth < MATRIX_STACK_DEPTH {
            rsp.model_view[rsp.depth] = rsp.model_view[rsp.depth - 1];
            rsp.depth += 1;
        }

        let top = &mut rsp.model_view[rsp.depth - 1];
        if params & mtx::LOAD != 0 {
            *top = mat;
        } else {
            *top *= mat;
        }

        rsp.lights_changed = true;
    }

    rsp.matrices_dirty = true;
}

pub fn pop_matrix(sys: &mut System) {
    let rsp = &mut sys.rsp;
    if rsp.depth <= 1 {
        tracing::warn!("ignoring pop of the last model view matrix");
        return;
    }

    rsp.depth -= 1;
    rsp.lights_changed = true;
    rsp.matrices_dirty = true;
}

pub fn move_mem(sys: &mut System, cmd: Command) {
    let index = cmd.params();
    let addr = sys.mem.resolve(cmd.w1);

    match index {
        mv::VIEWPORT => {
            let Some(vp) = sys.mem.read::<Vp>(addr).copied() else {
                sys.malformed(format_args!("viewport at {addr:#010X} is out of bounds"));
                return;
            };

            rdp::set_viewport(sys, &vp);
        }
        mv::LOOKAT_X | mv::LOOKAT_Y | mv::L0..=mv::L7 => {
            let Some(light) = sys.mem.read::<Light>(addr).copied() else {
                sys.malformed(format_args!("light at {addr:#010X} is out of bounds"));
                return;
            };

            let rsp = &mut sys.rsp;
            match index {
                mv::LOOKAT_X => rsp.lookat[0] = light.direction,
                mv::LOOKAT_Y => rsp.lookat[1] = light.direction,
                _ => rsp.lights[((index - mv::L0) / 2) as usize] = light,
            }

            rsp.lights_changed = true;
        }
        _ => tracing::debug!("ignoring MOVEMEM to index {index:#04X}"),
    }
}

pub fn move_word(sys: &mut System, cmd: Command) {
    let index = cmd.w0.bits(0, 8);
    let offset = cmd.w0.bits(8, 24);
    let data = cmd.w1;

    match index {
        mw::NUMLIGHT => {
            let lights = data.wrapping_sub(0x8000_0000) / 32;
            sys.rsp.num_lights = (lights as usize).clamp(1, MAX_LIGHTS);
            sys.rsp.lights_changed = true;
        }
        mw::SEGMENT => sys.mem.set_segment(offset as usize / 4, data),
        mw::FOG => {
            sys.rsp.fog_multiplier = (data >> 16) as i16;
            sys.rsp.fog_offset = data as i16;
        }
        _ => tracing::debug!("ignoring MOVEWORD to index {index:#04X}"),
    }
}

pub fn vertices(sys: &mut System, cmd: Command) {
    let load = VertexLoad::from_bits(cmd.w0);
    let mut count = usize::from(load.count_minus_one().value()) + 1;
    let dest = usize::from(load.dest().value());
    let addr = sys.mem.resolve(cmd.w1);

    if dest + count > MAX_VERTICES {
        sys.malformed(format_args!("loading {count} vertices at {dest}"));
        count = MAX_VERTICES - dest;
    }

    if sys.rsp.matrices_dirty {
        draw::flush(sys, format_args!("transforms changed"));
        sys.rsp.vertex_transforms = Transforms {
            model_view: sys.rsp.model_view(),
            projection: sys.rsp.projection,
            aspect: sys.aspect(),
        };
        sys.rsp.matrices_dirty = false;
    }

    let lighting = sys.rsp.geometry_mode.contains(GeometryMode::LIGHTING);
    let texgen = lighting && sys.rsp.geometry_mode.contains(GeometryMode::TEXTURE_GEN);
    if lighting {
        sys.rsp.update_lights();
    }

    let Some(vtxs) = sys.mem.read_slice::<Vtx>(addr, count) else {
        sys.malformed(format_args!("vertices at {addr:#010X} are out of bounds"));
        return;
    };

    let rsp = &mut sys.rsp;
    for (index, vtx) in (dest..dest + count).zip(vtxs) {
        let [x, y, z] = vtx.position.map(|c| c.get());
        let [r, g, b, a] = vtx.color;
        let normal = [r as i8, g as i8, b as i8];

        let tex_coord = if texgen {
            rsp.texgen(normal)
        } else {
            rsp.scale_tex_coord(vtx.tex_coord.map(|c| c.get()))
        };

        let color = if lighting {
            let [r, g, b] = rsp.lit_color(normal);
            Rgba8::new(r, g, b, a)
        } else {
            Rgba8::new(r, g, b, a)
        };

        rsp.vertices[index] = LoadedVertex {
            position: [x, y, z, 1],
            tex_coord,
            color,
        };
    }

    sys.stats.vertices += count as u32;
}

pub fn texture(sys: &mut System, cmd: Command) {
    let state = TextureState::from_bits(cmd.w0);
    let scale = Halves::from_bits(cmd.w1);

    let rsp = &mut sys.rsp;
    rsp.texture_scale = [scale.high(), scale.low()];
    rsp.texture_tile = state.tile().value();
    rsp.texture_on = state.on() != 0;
}

pub fn set_geometry_mode(sys: &mut System, cmd: Command) {
    let mode = GeometryMode::from_bits_retain(cmd.w1);
    sys.rsp.geometry_mode |= mode;
}

pub fn clear_geometry_mode(sys: &mut System, cmd: Command) {
    let mode = GeometryMode::from_bits_retain(cmd.w1);
    sys.rsp.geometry_mode &= !mode;
}
