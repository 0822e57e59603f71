//! Reality Display Processor: tiles, texture loads, colors, modes and rectangles.

use std::ops::{Deref, DerefMut};

use bitos::BitUtils;
use color::Rgba8;
use easyerr::Error;
use glam::Mat4;
use picatex::{Converter, PaletteFormat, Source, SourceFormat, TexelSize};

use crate::modules::render::{Action, ClearFlags, Rect, Screen, Transforms};
use crate::system::combiner::CombineMode;
use crate::system::gbi::{
    CombineHigh, CombineLow, Command, Coords, CycleType, GeometryMode, Halves, ImageFormat,
    LOAD_TILE, OtherModeH, OtherModeL, OtherModeUpdate, RENDER_TILE, TextureFilter, TileFormat,
    TileSampling, TlutMode, Vp, acmux, ccmux,
};
use crate::system::mem::Memory;
use crate::system::rsp::MAX_VERTICES;
use crate::system::{SCREEN_HEIGHT, SCREEN_WIDTH, System, draw};

/// Size of texture memory, in bytes.
pub const TMEM_SIZE: usize = 4096;
/// Scale of rectangle vertex positions, which are stored as integers.
pub const RECT_SCALE: f32 = 4096.0;

/// A tile descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tile {
    pub format: u8,
    pub size: u8,
    /// Line length in 64-bit words.
    pub line: u16,
    pub tmem: u16,
    pub palette: u8,
    pub cms: u8,
    pub cmt: u8,
    /// Upper left and lower right corners, in 10.2 fixed point.
    pub uls: u16,
    pub ult: u16,
    pub lrs: u16,
    pub lrt: u16,
}

/// The image loads read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureImage {
    pub addr: u32,
    pub format: u8,
    pub size: u8,
    pub width: u16,
}

/// A texture loaded into one of the halves of TMEM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadedTexture {
    pub addr: u32,
    pub size_bytes: usize,
}

pub struct Interface {
    // textures
    pub texture_image: TextureImage,
    pub tiles: [Tile; 8],
    pub loaded: [LoadedTexture; 2],
    pub textures_changed: [bool; 2],
    pub palette: Option<u32>,

    // modes
    pub other_mode_l: OtherModeL,
    pub other_mode_h: OtherModeH,
    pub combine_mode: CombineMode,

    // colors
    pub prim_color: Rgba8,
    pub env_color: Rgba8,
    pub fog_color: Rgba8,
    pub blend_color: Rgba8,
    pub fill_color: Rgba8,
    pub lod_fraction: u8,
    pub prim_depth: [u16; 2],

    // targets
    pub viewport: Rect,
    pub scissor: Rect,
    pub color_image: u32,
    pub z_image: u32,

    // components
    pub converter: Converter,
}

impl Default for Interface {
    fn default() -> Self {
        let screen = Rect {
            x: 0.0,
            y: 0.0,
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
        };

        Self {
            texture_image: TextureImage::default(),
            tiles: [Tile::default(); 8],
            loaded: [LoadedTexture::default(); 2],
            textures_changed: [true; 2],
            palette: None,
            other_mode_l: OtherModeL::default(),
            other_mode_h: OtherModeH::default(),
            combine_mode: CombineMode::default(),
            prim_color: Rgba8::WHITE,
            env_color: Rgba8::WHITE,
            fog_color: Rgba8::BLACK,
            blend_color: Rgba8::BLACK,
            fill_color: Rgba8::BLACK,
            lod_fraction: 0,
            prim_depth: [0; 2],
            viewport: screen,
            scissor: screen,
            color_image: 0,
            z_image: 0,
            converter: Converter::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("texture format {format} with size {size} is invalid")]
    InvalidFormat { format: u8, size: u8 },
    #[error("render tile has no line length")]
    NoLine,
    #[error("texture at {addr:#010X} is out of bounds")]
    OutOfBounds { addr: u32 },
    #[error("color indexed texture without a loaded palette")]
    NoPalette,
}

impl Interface {
    #[inline(always)]
    pub fn render_tile(&self) -> &Tile {
        &self.tiles[RENDER_TILE as usize]
    }

    pub fn cycle_type(&self) -> CycleType {
        self.other_mode_h.cycle_type()
    }

    pub fn linear_filter(&self) -> bool {
        self.other_mode_h.texture_filter() != TextureFilter::Point
    }

    pub fn palette_format(&self) -> PaletteFormat {
        if self.other_mode_h.tlut() == TlutMode::Ia16 {
            PaletteFormat::Ia16
        } else {
            PaletteFormat::Rgba16
        }
    }

    /// The texture loaded into `unit`, as described by the render tile.
    pub fn texture_source<'a>(
        &self,
        mem: &'a Memory,
        unit: usize,
    ) -> Result<Source<'a>, TextureError> {
        let tile = self.render_tile();
        let loaded = &self.loaded[unit];

        let invalid = || TextureError::InvalidFormat {
            format: tile.format,
            size: tile.size,
        };
        let format = SourceFormat::from_repr(tile.format).ok_or_else(invalid)?;
        let size = TexelSize::from_repr(tile.size).ok_or_else(invalid)?;

        let line = usize::from(tile.line) * 8;
        if line == 0 {
            return Err(TextureError::NoLine);
        }

        let (width, height) = match size {
            TexelSize::Bits4 => (line * 2, loaded.size_bytes / line),
            TexelSize::Bits8 => (line, loaded.size_bytes / line),
            TexelSize::Bits16 => (line / 2, loaded.size_bytes / line),
            // 32-bit texels are split between the two halves of TMEM
            TexelSize::Bits32 => (line / 2, loaded.size_bytes / 2 / line),
        };

        let data = mem
            .tail(loaded.addr)
            .ok_or(TextureError::OutOfBounds { addr: loaded.addr })?;

        let palette = if format == SourceFormat::ColorIndex {
            let addr = self.palette.ok_or(TextureError::NoPalette)?;
            Some(mem.tail(addr).ok_or(TextureError::OutOfBounds { addr })?)
        } else {
            None
        };

        Ok(Source {
            format,
            size,
            width,
            height,
            data,
            palette,
            palette_format: self.palette_format(),
        })
    }
}

/// Converts a rectangle in quarter pixels of the N64 screen into render target pixels.
fn screen_rect(sys: &System, x: f32, y: f32, width: f32, height: f32) -> Rect {
    let scale_x = sys.dimensions.width as f32 / SCREEN_WIDTH;
    let scale_y = sys.dimensions.height as f32 / SCREEN_HEIGHT;

    Rect {
        x: x * scale_x,
        y: y * scale_y,
        width: width * scale_x,
        height: height * scale_y,
    }
}

pub fn set_viewport(sys: &mut System, vp: &Vp) {
    let [sx, sy, ..] = vp.scale.map(|c| f32::from(c.get()));
    let [tx, ty, ..] = vp.translation.map(|c| f32::from(c.get()));

    let width = 2.0 * sx / 4.0;
    let height = 2.0 * sy / 4.0;
    let x = tx / 4.0 - width / 2.0;
    let y = SCREEN_HEIGHT - (ty / 4.0 + height / 2.0);

    sys.rdp.viewport = screen_rect(sys, x, y, width, height);
}

pub fn set_scissor(sys: &mut System, cmd: Command) {
    let (ul, lr) = (Coords::from_bits(cmd.w0), Coords::from_bits(cmd.w1));
    let ulx = f32::from(ul.x().value());
    let uly = f32::from(ul.y().value());
    let lrx = f32::from(lr.x().value());
    let lry = f32::from(lr.y().value());

    sys.rdp.scissor = screen_rect(
        sys,
        ulx / 4.0,
        SCREEN_HEIGHT - lry / 4.0,
        (lrx - ulx) / 4.0,
        (lry - uly) / 4.0,
    );
}

/// `word` with the bits selected by a SETOTHERMODE command replaced by its data.
fn masked_other_mode(word: u32, cmd: Command) -> u32 {
    let update = OtherModeUpdate::from_bits(cmd.w0);
    let shift = u32::from(update.shift()).min(32);
    let len = u32::from(update.len()).min(32);
    let mask = (((1u64 << len) - 1) << shift) as u32;
    (word & !mask) | (cmd.w1 & mask)
}

pub fn set_other_mode_l(sys: &mut System, cmd: Command) {
    let word = masked_other_mode(sys.rdp.other_mode_l.to_bits(), cmd);
    sys.rdp.other_mode_l = OtherModeL::from_bits(word);
}

pub fn set_other_mode_h(sys: &mut System, cmd: Command) {
    let word = masked_other_mode(sys.rdp.other_mode_h.to_bits(), cmd);
    sys.rdp.other_mode_h = OtherModeH::from_bits(word);
}

pub fn set_other_mode_both(sys: &mut System, cmd: Command) {
    sys.rdp.other_mode_h = OtherModeH::from_bits(cmd.w0.bits(0, 24));
    sys.rdp.other_mode_l = OtherModeL::from_bits(cmd.w1);
}

pub fn set_combine(sys: &mut System, cmd: Command) {
    let (high, low) = (CombineHigh::from_bits(cmd.w0), CombineLow::from_bits(cmd.w1));
    let color = [
        high.color_a().value(),
        low.color_b().value(),
        high.color_c().value(),
        low.color_d().value(),
    ];
    let alpha = [
        high.alpha_a().value(),
        low.alpha_b().value(),
        high.alpha_c().value(),
        low.alpha_d().value(),
    ];

    sys.rdp.combine_mode =
        CombineMode::from_muxes(color.map(u32::from), alpha.map(u32::from));
}

pub fn set_prim_color(sys: &mut System, cmd: Command) {
    sys.rdp.prim_color = Rgba8::from_rgba32(cmd.w1);
    sys.rdp.lod_fraction = cmd.w0.bits(0, 8) as u8;
}

pub fn set_prim_depth(sys: &mut System, cmd: Command) {
    let depth = Halves::from_bits(cmd.w1);
    sys.rdp.prim_depth = [depth.high(), depth.low()];
}

pub fn set_fill_color(sys: &mut System, cmd: Command) {
    sys.rdp.fill_color = Rgba8::from_rgba5551(cmd.w1 as u16);
}

pub fn set_texture_image(sys: &mut System, cmd: Command) {
    let image = ImageFormat::from_bits(cmd.w0);
    sys.rdp.texture_image = TextureImage {
        addr: sys.mem.resolve(cmd.w1),
        format: image.format().value(),
        size: image.size().value(),
        width: image.width_minus_one().value() + 1,
    };
}

pub fn set_tile(sys: &mut System, cmd: Command) {
    let format = TileFormat::from_bits(cmd.w0);
    let sampling = TileSampling::from_bits(cmd.w1);
    let index = u32::from(sampling.tile().value());

    let tile = &mut sys.rdp.tiles[index as usize];
    tile.format = format.format().value();
    tile.size = format.size().value();
    tile.line = format.line().value();
    tile.tmem = format.tmem().value();
    tile.palette = sampling.palette().value();
    tile.cmt = sampling.cmt().value();
    tile.cms = sampling.cms().value();

    if index == RENDER_TILE {
        sys.rdp.textures_changed = [true; 2];
    }
}

pub fn set_tile_size(sys: &mut System, cmd: Command) {
    let (ul, lr) = (Coords::from_bits(cmd.w0), Coords::from_bits(cmd.w1));
    let index = u32::from(lr.tile().value());

    let tile = &mut sys.rdp.tiles[index as usize];
    tile.uls = ul.x().value();
    tile.ult = ul.y().value();
    tile.lrs = lr.x().value();
    tile.lrt = lr.y().value();

    if index == RENDER_TILE {
        sys.rdp.textures_changed = [true; 2];
    }
}

/// Shift converting a texel count of the texture image into bytes. 4-bit images are loaded as
/// 8-bit ones.
fn word_size_shift(size: u8) -> usize {
    match size {
        2 => 1,
        3 => 2,
        _ => 0,
    }
}

fn load(sys: &mut System, tile: u32, size_bytes: usize) {
    let size_bytes = if size_bytes > TMEM_SIZE {
        sys.malformed(format_args!("loading {size_bytes} bytes into TMEM"));
        TMEM_SIZE
    } else {
        size_bytes
    };

    let unit = usize::from(sys.rdp.tiles[tile as usize].tmem / 256).min(1);
    sys.rdp.loaded[unit] = LoadedTexture {
        addr: sys.rdp.texture_image.addr,
        size_bytes,
    };
    sys.rdp.textures_changed[unit] = true;
}

pub fn load_block(sys: &mut System, cmd: Command) {
    let lr = Coords::from_bits(cmd.w1);
    let tile = u32::from(lr.tile().value());
    // tile 1 is only loaded as the second half of 32-bit textures
    if tile == 1 {
        return;
    }

    if tile != LOAD_TILE {
        tracing::debug!("LOADBLOCK into tile {tile}");
    }

    let lrs = usize::from(lr.x().value());
    let size_bytes = (lrs + 1) << word_size_shift(sys.rdp.texture_image.size);
    load(sys, tile, size_bytes);
}

pub fn load_tile(sys: &mut System, cmd: Command) {
    let (ul, lr) = (Coords::from_bits(cmd.w0), Coords::from_bits(cmd.w1));
    let index = u32::from(lr.tile().value());
    let (lrs, lrt) = (lr.x().value(), lr.y().value());

    let tile = &mut sys.rdp.tiles[index as usize];
    tile.uls = ul.x().value();
    tile.ult = ul.y().value();
    tile.lrs = lrs;
    tile.lrt = lrt;

    let texels = (usize::from(lrs >> 2) + 1) * (usize::from(lrt >> 2) + 1);
    let size_bytes = texels << word_size_shift(sys.rdp.texture_image.size);
    load(sys, index, size_bytes);
}

pub fn load_tlut(sys: &mut System, _: Command) {
    sys.rdp.palette = Some(sys.rdp.texture_image.addr);
    sys.rdp.textures_changed = [true; 2];
}

/// Overrides the state a rectangle is drawn with and restores it when dropped.
pub struct RectGuard<'a> {
    sys: &'a mut System,
    geometry_mode: GeometryMode,
    viewport: Rect,
    transforms: Transforms,
    other_mode_h: OtherModeH,
    combine_mode: CombineMode,
}

impl<'a> RectGuard<'a> {
    pub fn new(sys: &'a mut System) -> Self {
        let guard = Self {
            geometry_mode: sys.rsp.geometry_mode,
            viewport: sys.rdp.viewport,
            transforms: sys.rsp.vertex_transforms,
            other_mode_h: sys.rdp.other_mode_h,
            combine_mode: sys.rdp.combine_mode,
            sys,
        };

        let sys = &mut *guard.sys;
        sys.rsp.geometry_mode = GeometryMode::empty();
        sys.rdp.viewport = Rect {
            x: 0.0,
            y: 0.0,
            width: sys.dimensions.width as f32,
            height: sys.dimensions.height as f32,
        };
        sys.rsp.vertex_transforms = Transforms {
            model_view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            aspect: sys.aspect(),
        };

        guard
    }
}

impl Deref for RectGuard<'_> {
    type Target = System;

    fn deref(&self) -> &Self::Target {
        self.sys
    }
}

impl DerefMut for RectGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.sys
    }
}

impl Drop for RectGuard<'_> {
    fn drop(&mut self) {
        self.sys.rsp.geometry_mode = self.geometry_mode;
        self.sys.rdp.viewport = self.viewport;
        self.sys.rsp.vertex_transforms = self.transforms;
        self.sys.rdp.other_mode_h = self.other_mode_h;
        self.sys.rdp.combine_mode = self.combine_mode;
    }
}

/// Corners of a rectangle, in the order upper left, lower left, lower right, upper right.
const RECT_CORNERS: [usize; 4] = [
    MAX_VERTICES,
    MAX_VERTICES + 1,
    MAX_VERTICES + 2,
    MAX_VERTICES + 3,
];

/// Draws a rectangle given in quarter pixels with the vertices already in the rectangle slots.
/// Expects the state to be overridden by a [`RectGuard`].
fn draw_rectangle(sys: &mut System, ulx: u32, uly: u32, lrx: u32, lry: u32) {
    let x = |v: u32| (v as f32 / (2.0 * SCREEN_WIDTH) - 1.0) * RECT_SCALE;
    let y = |v: u32| (1.0 - v as f32 / (2.0 * SCREEN_HEIGHT)) * RECT_SCALE;
    let (left, right, top, bottom) = (x(ulx), x(lrx), y(uly), y(lry));

    let corners = [(left, top), (left, bottom), (right, bottom), (right, top)];
    for (&index, (cx, cy)) in RECT_CORNERS.iter().zip(corners) {
        // float to int casts saturate
        sys.rsp.vertices[index].position = [
            cx as i16,
            cy as i16,
            -RECT_SCALE as i16,
            RECT_SCALE as i16,
        ];
    }

    let [ul, ll, lr, ur] = RECT_CORNERS;
    draw::triangle(sys, [ul, ll, ur]);
    draw::triangle(sys, [ll, lr, ur]);
}

pub fn fill_rect(sys: &mut System, cmd: Command) {
    let (lr, ul) = (Coords::from_bits(cmd.w0), Coords::from_bits(cmd.w1));
    let mut lrx = u32::from(lr.x().value());
    let mut lry = u32::from(lr.y().value());
    let ulx = u32::from(ul.x().value());
    let uly = u32::from(ul.y().value());

    if sys.rdp.color_image == sys.rdp.z_image {
        draw::flush(sys, format_args!("depth clear"));
        sys.modules.render.exec(Action::RequestClear {
            screen: Screen::Top,
            flags: ClearFlags::DEPTH,
        });
        return;
    }

    if matches!(sys.rdp.cycle_type(), CycleType::Copy | CycleType::Fill) {
        lrx += 4;
        lry += 4;
    }

    let color = sys.rdp.fill_color;
    for index in RECT_CORNERS {
        sys.rsp.vertices[index].color = color;
    }

    let mut guard = RectGuard::new(sys);
    guard.rdp.combine_mode = CombineMode::from_muxes(
        [0, 0, 0, ccmux::SHADE],
        [0, 0, 0, acmux::SHADE],
    );
    draw_rectangle(&mut guard, ulx, uly, lrx, lry);
}

/// Texture rectangle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexRect {
    /// Screen corners, in quarter pixels.
    pub ulx: u32,
    pub uly: u32,
    pub lrx: u32,
    pub lry: u32,
    pub tile: u32,
    /// Texture coordinates of the upper left corner, s10.5.
    pub s: i16,
    pub t: i16,
    /// Texture coordinate deltas per pixel, s5.10.
    pub dsdx: i16,
    pub dtdy: i16,
    pub flip: bool,
}

pub fn texture_rect(sys: &mut System, rect: TexRect) {
    let TexRect {
        ulx,
        uly,
        mut lrx,
        mut lry,
        mut dsdx,
        dtdy,
        s,
        t,
        flip,
        ..
    } = rect;

    let mut guard = RectGuard::new(sys);
    if guard.rdp.cycle_type() == CycleType::Copy {
        // copy mode steps four texels per pixel
        dsdx >>= 2;
        lrx += 4;
        lry += 4;

        guard.rdp.other_mode_h.set_texture_filter(TextureFilter::Point);
        guard.rdp.combine_mode = CombineMode::from_muxes(
            [0, 0, 0, ccmux::TEXEL0],
            [0, 0, 0, acmux::TEXEL0],
        );
    }

    let width = lrx.saturating_sub(ulx) as i32;
    let height = lry.saturating_sub(uly) as i32;
    let (width, height) = if flip { (height, width) } else { (width, height) };

    let s0 = i32::from(s);
    let t0 = i32::from(t);
    let s1 = (((s0 << 7) + i32::from(dsdx) * width) >> 7) as i16;
    let t1 = (((t0 << 7) + i32::from(dtdy) * height) >> 7) as i16;

    let [ul, ll, lr, ur] = RECT_CORNERS;
    let vertices = &mut guard.rsp.vertices;
    vertices[ul].tex_coord = [s, t];
    vertices[lr].tex_coord = [s1, t1];
    if flip {
        vertices[ll].tex_coord = [s1, t];
        vertices[ur].tex_coord = [s, t1];
    } else {
        vertices[ll].tex_coord = [s, t1];
        vertices[ur].tex_coord = [s1, t];
    }

    for index in RECT_CORNERS {
        vertices[index].color = Rgba8::WHITE;
    }

    draw_rectangle(&mut guard, ulx, uly, lrx, lry);
}
