//! Renderer module interface.

use bitflags::bitflags;
use color::Rgba8;
use glam::Mat4;
use ordered_float::OrderedFloat;
use picatex::{PaletteFormat, SourceFormat, TexelSize, Texture};
use static_assertions::const_assert;

use crate::system::combiner::CombineMode;

/// A rectangle in render target pixels, with the origin at the bottom left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DepthMode {
    pub test: bool,
    pub write: bool,
    /// Pull coplanar geometry towards the camera.
    pub decal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullingMode {
    #[default]
    None,
    Front,
    Back,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wrap {
    #[default]
    Repeat,
    Mirror,
    Clamp,
}

impl Wrap {
    /// Decodes the `cm` field of a tile descriptor.
    pub fn from_tile_mode(cm: u32) -> Self {
        if cm & 2 != 0 {
            Self::Clamp
        } else if cm & 1 != 0 {
            Self::Mirror
        } else {
            Self::Repeat
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sampler {
    pub linear: bool,
    pub wrap_s: Wrap,
    pub wrap_t: Wrap,
}

/// Depth range over which fog goes from clear to opaque, in normalized depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FogRange {
    pub near: OrderedFloat<f32>,
    pub far: OrderedFloat<f32>,
}

/// Identity of a texture in N64 memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub addr: u32,
    pub format: SourceFormat,
    pub size: TexelSize,
    pub palette: PaletteFormat,
    /// Hash of the texels, see [`picatex::Source::content_hash`].
    pub hash: u64,
}

/// Maps vertex texture coordinates into the `0..1` range of the loaded tile.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TexCoordTransform {
    pub scale: [f32; 2],
    pub offset: [f32; 2],
}

/// Matrices vertex positions are transformed with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transforms {
    pub model_view: Mat4,
    pub projection: Mat4,
    /// Horizontal scale applied after projection.
    pub aspect: f32,
}

impl Default for Transforms {
    fn default() -> Self {
        Self {
            model_view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            aspect: 1.0,
        }
    }
}

bitflags! {
    /// Optional vertex attributes. Positions are always present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Attributes: u8 {
        const TEXCOORD = 1 << 0;
        const COLOR    = 1 << 1;
    }
}

impl Attributes {
    /// Floats per vertex.
    pub fn stride(self) -> usize {
        let mut stride = 4;
        if self.contains(Self::TEXCOORD) {
            stride += 2;
        }

        if self.contains(Self::COLOR) {
            stride += 4;
        }

        stride
    }
}

/// A batch of triangles ready to be drawn.
///
/// Vertices are interleaved floats: model space `xyzw`, then `uv` if [`Attributes::TEXCOORD`] is
/// set, then normalized `rgba` if [`Attributes::COLOR`] is set.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub attributes: Attributes,
    pub tex_coords: [TexCoordTransform; 2],
    pub vertices: &'a [f32],
    pub triangles: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Top,
    Bottom,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    StartFrame,
    EndFrame,
    SetViewport(Rect),
    SetScissor(Rect),
    SetDepthMode(DepthMode),
    SetCullingMode(CullingMode),
    SetAlphaBlend(bool),
    SetCombiner(CombineMode),
    SetPrimColor(Rgba8),
    SetEnvColor(Rgba8),
    SetFogColor(Rgba8),
    SetLodFraction(u8),
    SetFog(Option<FogRange>),
    SetSampler {
        unit: u8,
        sampler: Sampler,
    },
    LoadTexture {
        unit: u8,
        key: TextureKey,
        texture: &'a Texture<'a>,
    },
    SetTransforms(&'a Transforms),
    SetClearColor {
        screen: Screen,
        color: Rgba8,
    },
    SetClearDepth {
        screen: Screen,
        depth: f32,
    },
    RequestClear {
        screen: Screen,
        flags: ClearFlags,
    },
    Draw(Batch<'a>),
}

const_assert!(size_of::<Action>() <= 64);

pub trait RenderModule {
    fn exec(&mut self, action: Action<'_>);

    /// Binds a previously loaded texture to `unit`. Returns `false` if it is not cached.
    fn bind_cached_texture(&mut self, unit: u8, key: &TextureKey) -> bool;

    /// Units whose texture was replaced by a load into another unit since the last call, as a
    /// bit mask. Such a unit has no texture until one is bound to it again.
    fn take_replaced_textures(&mut self) -> u8 {
        0
    }
}

/// An implementation of [`RenderModule`] that does nothing.
#[derive(Debug, Clone, Copy)]
pub struct NopRenderModule;

impl RenderModule for NopRenderModule {
    fn exec(&mut self, _: Action<'_>) {}

    fn bind_cached_texture(&mut self, _: u8, _: &TextureKey) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wrap_modes() {
        assert_eq!(Wrap::from_tile_mode(0), Wrap::Repeat);
        assert_eq!(Wrap::from_tile_mode(1), Wrap::Mirror);
        assert_eq!(Wrap::from_tile_mode(2), Wrap::Clamp);
        assert_eq!(Wrap::from_tile_mode(3), Wrap::Clamp);
    }

    #[test]
    fn strides() {
        assert_eq!(Attributes::empty().stride(), 4);
        assert_eq!(Attributes::TEXCOORD.stride(), 6);
        assert_eq!(Attributes::COLOR.stride(), 8);
        assert_eq!(Attributes::all().stride(), 10);
    }
}
