//! Fast3D graphics binary interface: opcodes, flags and the in-memory structures commands refer
//! to.

pub mod encode;

use bitflags::bitflags;
use bitos::integer::{u2, u3, u4, u5, u9, u10, u12};
use bitos::{BitUtils, bitos};
use glam::Mat4;
use strum::FromRepr;
use zerocopy::byteorder::big_endian::{I16, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// A display list opcode.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum Opcode {
    SpNoop            = 0x00,
    Mtx               = 0x01,
    MoveMem           = 0x03,
    Vtx               = 0x04,
    Dl                = 0x06,

    RdpHalfCont       = 0xB2,
    RdpHalf2          = 0xB3,
    RdpHalf1          = 0xB4,
    ClearGeometryMode = 0xB6,
    SetGeometryMode   = 0xB7,
    EndDl             = 0xB8,
    SetOtherModeL     = 0xB9,
    SetOtherModeH     = 0xBA,
    Texture           = 0xBB,
    MoveWord          = 0xBC,
    PopMtx            = 0xBD,
    CullDl            = 0xBE,
    Tri1              = 0xBF,

    TexRect           = 0xE4,
    TexRectFlip       = 0xE5,
    RdpLoadSync       = 0xE6,
    RdpPipeSync       = 0xE7,
    RdpTileSync       = 0xE8,
    RdpFullSync       = 0xE9,
    SetScissor        = 0xED,
    SetPrimDepth      = 0xEE,
    RdpSetOtherMode   = 0xEF,
    LoadTlut          = 0xF0,
    SetTileSize       = 0xF2,
    LoadBlock         = 0xF3,
    LoadTile          = 0xF4,
    SetTile           = 0xF5,
    FillRect          = 0xF6,
    SetFillColor      = 0xF7,
    SetFogColor       = 0xF8,
    SetBlendColor     = 0xF9,
    SetPrimColor      = 0xFA,
    SetEnvColor       = 0xFB,
    SetCombine        = 0xFC,
    SetTImg           = 0xFD,
    SetZImg           = 0xFE,
    SetCImg           = 0xFF,
}

/// A 64-bit display list command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command {
    pub w0: u32,
    pub w1: u32,
}

impl Command {
    #[inline(always)]
    pub const fn new(w0: u32, w1: u32) -> Self {
        Self { w0, w1 }
    }

    #[inline(always)]
    pub fn opcode(self) -> u8 {
        self.w0.bits(24, 32) as u8
    }

    /// Byte 2 of the first word, the parameters of MTX, MOVEMEM and DL.
    #[inline(always)]
    pub fn params(self) -> u32 {
        self.w0.bits(16, 24)
    }
}

/// Raw command as stored in memory.
pub type RawCommand = [U32; 2];

impl From<RawCommand> for Command {
    fn from(value: RawCommand) -> Self {
        Self::new(value[0].get(), value[1].get())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GeometryMode: u32 {
        const ZBUFFER            = 0x0000_0001;
        const TEXTURE_ENABLE     = 0x0000_0002;
        const SHADE              = 0x0000_0004;
        const SHADING_SMOOTH     = 0x0000_0200;
        const CULL_FRONT         = 0x0000_1000;
        const CULL_BACK          = 0x0000_2000;
        const FOG                = 0x0001_0000;
        const LIGHTING           = 0x0002_0000;
        const TEXTURE_GEN        = 0x0004_0000;
        const TEXTURE_GEN_LINEAR = 0x0008_0000;
        const LOD                = 0x0010_0000;
        const CLIPPING           = 0x0080_0000;
    }
}

/// MTX parameters.
pub mod mtx {
    pub const PROJECTION: u32 = 0x01;
    pub const LOAD: u32 = 0x02;
    pub const PUSH: u32 = 0x04;
}

/// MOVEMEM indices.
pub mod mv {
    pub const VIEWPORT: u32 = 0x80;
    pub const LOOKAT_Y: u32 = 0x82;
    pub const LOOKAT_X: u32 = 0x84;
    pub const L0: u32 = 0x86;
    pub const L7: u32 = 0x94;
}

/// MOVEWORD indices.
pub mod mw {
    pub const NUMLIGHT: u32 = 0x02;
    pub const SEGMENT: u32 = 0x06;
    pub const FOG: u32 = 0x08;
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleType {
    #[default]
    One  = 0x0,
    Two  = 0x1,
    Copy = 0x2,
    Fill = 0x3,
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    #[default]
    Point    = 0x0,
    Reserved = 0x1,
    Bilinear = 0x2,
    Average  = 0x3,
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlutMode {
    #[default]
    None     = 0x0,
    Reserved = 0x1,
    Rgba16   = 0x2,
    Ia16     = 0x3,
}

/// The high word of the other mode register.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtherModeH {
    #[bits(12..14)]
    pub texture_filter: TextureFilter,
    #[bits(14..16)]
    pub tlut: TlutMode,
    #[bits(20..22)]
    pub cycle_type: CycleType,
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaCompare {
    #[default]
    None      = 0x0,
    Threshold = 0x1,
    Reserved  = 0x2,
    Dither    = 0x3,
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthSource {
    #[default]
    Opaque           = 0x0,
    Interpenetrating = 0x1,
    Translucent      = 0x2,
    Decal            = 0x3,
}

/// Color input of the first blender cycle.
#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendColor {
    #[default]
    Input  = 0x0,
    Memory = 0x1,
    Blend  = 0x2,
    Fog    = 0x3,
}

/// The low word of the other mode register.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtherModeL {
    #[bits(0..2)]
    pub alpha_compare: AlphaCompare,
    #[bits(4)]
    pub depth_compare: bool,
    #[bits(5)]
    pub depth_update: bool,
    #[bits(10..12)]
    pub depth_mode: DepthSource,
    #[bits(12)]
    pub coverage_times_alpha: bool,
    /// `G_BL_A_MEM` in the first blender cycle.
    #[bits(18)]
    pub blend_alpha_memory: bool,
    #[bits(30..32)]
    pub blend_color: BlendColor,
}

/// The first word of SETOTHERMODE_L and SETOTHERMODE_H.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtherModeUpdate {
    #[bits(0..8)]
    pub len: u8,
    #[bits(8..16)]
    pub shift: u8,
}

/// A pair of coordinates in 10.2 fixed point, plus the tile of the commands that carry one.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coords {
    #[bits(0..12)]
    pub y: u12,
    #[bits(12..24)]
    pub x: u12,
    #[bits(24..27)]
    pub tile: u3,
}

/// A word split into two 16-bit halves.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Halves {
    #[bits(0..16)]
    pub low: u16,
    #[bits(16..32)]
    pub high: u16,
}

/// The first word of SETTIMG.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageFormat {
    #[bits(0..10)]
    pub width_minus_one: u10,
    #[bits(19..21)]
    pub size: u2,
    #[bits(21..24)]
    pub format: u3,
}

/// The first word of SETTILE.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileFormat {
    #[bits(0..9)]
    pub tmem: u9,
    /// Line length in 64-bit words.
    #[bits(9..18)]
    pub line: u9,
    #[bits(19..21)]
    pub size: u2,
    #[bits(21..24)]
    pub format: u3,
}

/// The second word of SETTILE.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileSampling {
    #[bits(0..4)]
    pub shift_s: u4,
    #[bits(4..8)]
    pub mask_s: u4,
    #[bits(8..10)]
    pub cms: u2,
    #[bits(10..14)]
    pub shift_t: u4,
    #[bits(14..18)]
    pub mask_t: u4,
    #[bits(18..20)]
    pub cmt: u2,
    #[bits(20..24)]
    pub palette: u4,
    #[bits(24..27)]
    pub tile: u3,
}

/// The first word of SETCOMBINE, first cycle fields only.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CombineHigh {
    #[bits(9..12)]
    pub alpha_c: u3,
    #[bits(12..15)]
    pub alpha_a: u3,
    #[bits(15..20)]
    pub color_c: u5,
    #[bits(20..24)]
    pub color_a: u4,
}

/// The second word of SETCOMBINE, first cycle fields only.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CombineLow {
    #[bits(9..12)]
    pub alpha_d: u3,
    #[bits(12..15)]
    pub alpha_b: u3,
    #[bits(15..18)]
    pub color_d: u3,
    #[bits(28..32)]
    pub color_b: u4,
}

/// The first word of VTX.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexLoad {
    #[bits(16..20)]
    pub dest: u4,
    #[bits(20..24)]
    pub count_minus_one: u4,
}

/// The first word of TEXTURE.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureState {
    #[bits(0..8)]
    pub on: u8,
    #[bits(8..11)]
    pub tile: u3,
}

/// The second word of TRI1. Indices are multiplied by 10.
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriangleIndices {
    #[bits(0..8)]
    pub v2: u8,
    #[bits(8..16)]
    pub v1: u8,
    #[bits(16..24)]
    pub v0: u8,
}

/// Color combiner mux selectors.
pub mod ccmux {
    pub const COMBINED: u32 = 0;
    pub const TEXEL0: u32 = 1;
    pub const TEXEL1: u32 = 2;
    pub const PRIMITIVE: u32 = 3;
    pub const SHADE: u32 = 4;
    pub const ENVIRONMENT: u32 = 5;
    pub const ONE: u32 = 6;
    pub const TEXEL0_ALPHA: u32 = 8;
    pub const LOD_FRACTION: u32 = 13;
    pub const ZERO: u32 = 31;
}

/// Alpha combiner mux selectors.
pub mod acmux {
    pub const COMBINED: u32 = 0;
    pub const TEXEL0: u32 = 1;
    pub const TEXEL1: u32 = 2;
    pub const PRIMITIVE: u32 = 3;
    pub const SHADE: u32 = 4;
    pub const ENVIRONMENT: u32 = 5;
    pub const ONE: u32 = 6;
    pub const ZERO: u32 = 7;
}

/// Tile descriptor used for rendering.
pub const RENDER_TILE: u32 = 0;
/// Tile descriptor used for loads.
pub const LOAD_TILE: u32 = 7;

/// A vertex as consumed by VTX.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Vtx {
    pub position: [I16; 3],
    pub flag: U16,
    pub tex_coord: [I16; 2],
    /// Color, or normal and alpha when lighting.
    pub color: [u8; 4],
}

/// A light as consumed by MOVEMEM.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Light {
    pub color: [u8; 3],
    pub _pad0: u8,
    pub color_copy: [u8; 3],
    pub _pad1: u8,
    pub direction: [i8; 3],
    pub _pad2: u8,
    pub _pad3: [u8; 4],
}

impl Light {
    pub fn new(color: [u8; 3], direction: [i8; 3]) -> Self {
        Self {
            color,
            color_copy: color,
            direction,
            ..Default::default()
        }
    }
}

/// A viewport as consumed by MOVEMEM.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Vp {
    pub scale: [I16; 4],
    pub translation: [I16; 4],
}

/// A s15.16 fixed point matrix as consumed by MTX. Integer halves come first, then fractions.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Mtx {
    pub words: [U32; 16],
}

impl Mtx {
    /// Decodes the matrix. Rows of the N64 matrix become columns of the [`Mat4`], so a row vector
    /// transform `v * M` becomes `mat * v`.
    pub fn to_mat4(&self) -> Mat4 {
        let mut rows = [[0.0f32; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for j in (0..4).step_by(2) {
                let int = self.words[i * 2 + j / 2].get();
                let frac = self.words[8 + i * 2 + j / 2].get();
                row[j] = ((int & 0xFFFF_0000) | (frac >> 16)) as i32 as f32 / 65536.0;
                row[j + 1] = ((int << 16) | (frac & 0xFFFF)) as i32 as f32 / 65536.0;
            }
        }

        Mat4::from_cols_array_2d(&rows)
    }

    /// Encodes a matrix, the inverse of [`Mtx::to_mat4`].
    pub fn from_mat4(mat: Mat4) -> Self {
        let rows = mat.to_cols_array_2d();
        let mut words = [U32::ZERO; 16];
        for (i, row) in rows.iter().enumerate() {
            for j in (0..4).step_by(2) {
                let a = (row[j] * 65536.0) as i32 as u32;
                let b = (row[j + 1] * 65536.0) as i32 as u32;
                words[i * 2 + j / 2] = U32::new((a & 0xFFFF_0000) | (b >> 16));
                words[8 + i * 2 + j / 2] = U32::new((a << 16) | (b & 0xFFFF));
            }
        }

        Self { words }
    }
}
