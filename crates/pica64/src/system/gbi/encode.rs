//! Builders for display list commands, mirroring the `gSP*`/`gDP*` macros.
//!
//! Coordinates taken by rectangle and scissor builders are in pixels; everything else is passed
//! through in its native fixed point encoding.

use color::Rgba8;

use super::{Command, Opcode, mtx};

#[inline(always)]
fn op(opcode: Opcode) -> u32 {
    (opcode as u32) << 24
}

/// Serializes commands into big endian display list bytes.
pub fn to_bytes(commands: &[Command]) -> Vec<u8> {
    commands
        .iter()
        .flat_map(|c| {
            let mut bytes = [0; 8];
            bytes[..4].copy_from_slice(&c.w0.to_be_bytes());
            bytes[4..].copy_from_slice(&c.w1.to_be_bytes());
            bytes
        })
        .collect()
}

pub fn sp_matrix(addr: u32, params: u32) -> Command {
    Command::new(op(Opcode::Mtx) | (params << 16) | 64, addr)
}

pub fn sp_load_model_view(addr: u32, push: bool) -> Command {
    let push = if push { mtx::PUSH } else { 0 };
    sp_matrix(addr, mtx::LOAD | push)
}

pub fn sp_load_projection(addr: u32) -> Command {
    sp_matrix(addr, mtx::LOAD | mtx::PROJECTION)
}

pub fn sp_pop_matrix() -> Command {
    Command::new(op(Opcode::PopMtx), 0)
}

pub fn sp_vertex(addr: u32, count: u32, dest: u32) -> Command {
    debug_assert!((1..=16).contains(&count));
    Command::new(
        op(Opcode::Vtx) | ((count - 1) << 20) | (dest << 16) | (count * 16),
        addr,
    )
}

pub fn sp_display_list(addr: u32) -> Command {
    Command::new(op(Opcode::Dl), addr)
}

pub fn sp_branch_list(addr: u32) -> Command {
    Command::new(op(Opcode::Dl) | (1 << 16), addr)
}

pub fn sp_end_display_list() -> Command {
    Command::new(op(Opcode::EndDl), 0)
}

pub fn sp_set_geometry_mode(mode: u32) -> Command {
    Command::new(op(Opcode::SetGeometryMode), mode)
}

pub fn sp_clear_geometry_mode(mode: u32) -> Command {
    Command::new(op(Opcode::ClearGeometryMode), mode)
}

pub fn sp_texture(s: u16, t: u16, level: u32, tile: u32, on: bool) -> Command {
    Command::new(
        op(Opcode::Texture) | (level << 11) | (tile << 8) | u32::from(on),
        (u32::from(s) << 16) | u32::from(t),
    )
}

fn sp_move_word(index: u32, offset: u32, data: u32) -> Command {
    Command::new(op(Opcode::MoveWord) | (offset << 8) | index, data)
}

/// Sets the number of directional lights. The ambient light comes after them.
pub fn sp_num_lights(directional: u32) -> Command {
    sp_move_word(
        super::mw::NUMLIGHT,
        0,
        (directional + 1) * 32 + 0x8000_0000,
    )
}

pub fn sp_segment(segment: u32, base: u32) -> Command {
    sp_move_word(super::mw::SEGMENT, segment * 4, base)
}

pub fn sp_fog_factor(multiplier: i16, offset: i16) -> Command {
    sp_move_word(
        super::mw::FOG,
        0,
        (u32::from(multiplier as u16) << 16) | u32::from(offset as u16),
    )
}

/// Fog starting at `min` and saturating at `max`, both in `0..=1000`.
pub fn sp_fog_position(min: i32, max: i32) -> Command {
    let multiplier = 128_000 / (max - min);
    let offset = (500 - min) * 256 / (max - min);
    sp_fog_factor(multiplier as i16, offset as i16)
}

fn sp_move_mem(index: u32, addr: u32) -> Command {
    Command::new(op(Opcode::MoveMem) | (index << 16) | 16, addr)
}

pub fn sp_viewport(addr: u32) -> Command {
    sp_move_mem(super::mv::VIEWPORT, addr)
}

/// Loads light `n`, starting at 1.
pub fn sp_light(addr: u32, n: u32) -> Command {
    sp_move_mem(super::mv::L0 + (n - 1) * 2, addr)
}

pub fn sp_look_at_x(addr: u32) -> Command {
    sp_move_mem(super::mv::LOOKAT_X, addr)
}

pub fn sp_look_at_y(addr: u32) -> Command {
    sp_move_mem(super::mv::LOOKAT_Y, addr)
}

pub fn sp_1triangle(v0: u32, v1: u32, v2: u32) -> Command {
    Command::new(op(Opcode::Tri1), (v0 * 10) << 16 | (v1 * 10) << 8 | (v2 * 10))
}

pub fn sp_set_other_mode_l(shift: u32, len: u32, data: u32) -> Command {
    Command::new(op(Opcode::SetOtherModeL) | (shift << 8) | len, data)
}

pub fn sp_set_other_mode_h(shift: u32, len: u32, data: u32) -> Command {
    Command::new(op(Opcode::SetOtherModeH) | (shift << 8) | len, data)
}

pub fn dp_set_other_mode(high: u32, low: u32) -> Command {
    Command::new(op(Opcode::RdpSetOtherMode) | (high & 0x00FF_FFFF), low)
}

/// Sets both combiner cycles to `(a - b) * c + d` with the given color and alpha muxes.
pub fn dp_set_combine(color: [u32; 4], alpha: [u32; 4]) -> Command {
    let [a, b, c, d] = color;
    let [aa, ab, ac, ad] = alpha;
    let w0 = op(Opcode::SetCombine)
        | (a & 0xF) << 20
        | (c & 0x1F) << 15
        | (aa & 0x7) << 12
        | (ac & 0x7) << 9
        | (a & 0xF) << 5
        | (c & 0x1F);
    let w1 = (b & 0xF) << 28
        | (b & 0xF) << 24
        | (aa & 0x7) << 21
        | (ac & 0x7) << 18
        | (d & 0x7) << 15
        | (ab & 0x7) << 12
        | (ad & 0x7) << 9
        | (d & 0x7) << 6
        | (ab & 0x7) << 3
        | (ad & 0x7);

    Command::new(w0, w1)
}

pub fn dp_set_prim_color(color: Rgba8, min_level: u32, lod_fraction: u8) -> Command {
    Command::new(
        op(Opcode::SetPrimColor) | (min_level << 8) | u32::from(lod_fraction),
        color.to_rgba32(),
    )
}

pub fn dp_set_env_color(color: Rgba8) -> Command {
    Command::new(op(Opcode::SetEnvColor), color.to_rgba32())
}

pub fn dp_set_fog_color(color: Rgba8) -> Command {
    Command::new(op(Opcode::SetFogColor), color.to_rgba32())
}

pub fn dp_set_blend_color(color: Rgba8) -> Command {
    Command::new(op(Opcode::SetBlendColor), color.to_rgba32())
}

/// Sets the fill color to a packed pair of 5-5-5-1 pixels.
pub fn dp_set_fill_color(packed: u32) -> Command {
    Command::new(op(Opcode::SetFillColor), packed)
}

pub fn dp_fill_rectangle(ulx: u32, uly: u32, lrx: u32, lry: u32) -> Command {
    Command::new(
        op(Opcode::FillRect) | (lrx << 2) << 12 | (lry << 2),
        (ulx << 2) << 12 | (uly << 2),
    )
}

pub fn dp_set_scissor(mode: u32, ulx: u32, uly: u32, lrx: u32, lry: u32) -> Command {
    Command::new(
        op(Opcode::SetScissor) | (ulx << 2) << 12 | (uly << 2),
        mode << 24 | (lrx << 2) << 12 | (lry << 2),
    )
}

pub fn dp_set_texture_image(format: u32, size: u32, width: u32, addr: u32) -> Command {
    Command::new(
        op(Opcode::SetTImg) | format << 21 | size << 19 | (width - 1),
        addr,
    )
}

pub fn dp_set_color_image(format: u32, size: u32, width: u32, addr: u32) -> Command {
    Command::new(
        op(Opcode::SetCImg) | format << 21 | size << 19 | (width - 1),
        addr,
    )
}

pub fn dp_set_depth_image(addr: u32) -> Command {
    Command::new(op(Opcode::SetZImg), addr)
}

/// Tile descriptor fields of SETTILE.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileParams {
    pub format: u32,
    pub size: u32,
    /// Line length in 64-bit words.
    pub line: u32,
    pub tmem: u32,
    pub tile: u32,
    pub palette: u32,
    pub cmt: u32,
    pub mask_t: u32,
    pub shift_t: u32,
    pub cms: u32,
    pub mask_s: u32,
    pub shift_s: u32,
}

pub fn dp_set_tile(params: TileParams) -> Command {
    let p = params;
    Command::new(
        op(Opcode::SetTile) | p.format << 21 | p.size << 19 | p.line << 9 | p.tmem,
        p.tile << 24
            | p.palette << 20
            | p.cmt << 18
            | p.mask_t << 14
            | p.shift_t << 10
            | p.cms << 8
            | p.mask_s << 4
            | p.shift_s,
    )
}

/// Sets the size of a tile, with coordinates in 10.2 fixed point.
pub fn dp_set_tile_size(tile: u32, uls: u32, ult: u32, lrs: u32, lrt: u32) -> Command {
    Command::new(
        op(Opcode::SetTileSize) | uls << 12 | ult,
        tile << 24 | lrs << 12 | lrt,
    )
}

pub fn dp_load_block(tile: u32, uls: u32, ult: u32, lrs: u32, dxt: u32) -> Command {
    Command::new(
        op(Opcode::LoadBlock) | uls << 12 | ult,
        tile << 24 | lrs << 12 | dxt,
    )
}

/// Loads a rectangle of texels, with coordinates in 10.2 fixed point.
pub fn dp_load_tile(tile: u32, uls: u32, ult: u32, lrs: u32, lrt: u32) -> Command {
    Command::new(
        op(Opcode::LoadTile) | uls << 12 | ult,
        tile << 24 | lrs << 12 | lrt,
    )
}

pub fn dp_load_tlut(tile: u32, count: u32) -> Command {
    Command::new(op(Opcode::LoadTlut), tile << 24 | (count & 0x3FF) << 14)
}

pub fn dp_set_prim_depth(z: u16, dz: u16) -> Command {
    Command::new(
        op(Opcode::SetPrimDepth),
        u32::from(z) << 16 | u32::from(dz),
    )
}

pub fn dp_pipe_sync() -> Command {
    Command::new(op(Opcode::RdpPipeSync), 0)
}

pub fn dp_load_sync() -> Command {
    Command::new(op(Opcode::RdpLoadSync), 0)
}

pub fn dp_tile_sync() -> Command {
    Command::new(op(Opcode::RdpTileSync), 0)
}

pub fn dp_full_sync() -> Command {
    Command::new(op(Opcode::RdpFullSync), 0)
}

/// Texture rectangle. Screen coordinates are in pixels, `s`/`t` in s10.5 and the deltas in
/// s5.10.
#[expect(clippy::too_many_arguments, reason = "mirrors the command layout")]
pub fn sp_texture_rectangle(
    ulx: u32,
    uly: u32,
    lrx: u32,
    lry: u32,
    tile: u32,
    s: i16,
    t: i16,
    dsdx: i16,
    dtdy: i16,
    flip: bool,
) -> [Command; 3] {
    let opcode = if flip {
        Opcode::TexRectFlip
    } else {
        Opcode::TexRect
    };

    [
        Command::new(
            op(opcode) | (lrx << 2) << 12 | (lry << 2),
            tile << 24 | (ulx << 2) << 12 | (uly << 2),
        ),
        Command::new(
            op(Opcode::RdpHalf2),
            u32::from(s as u16) << 16 | u32::from(t as u16),
        ),
        Command::new(
            op(Opcode::RdpHalfCont),
            u32::from(dsdx as u16) << 16 | u32::from(dtdy as u16),
        ),
    ]
}
