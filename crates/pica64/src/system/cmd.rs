//! Display list walker and the command dispatch table.

use crate::system::gbi::{Command, Coords, Halves, Opcode, TriangleIndices};
use crate::system::rdp::{self, TexRect};
use crate::system::{System, draw, rsp};

/// Depth of the display list return stack.
pub const MAX_DEPTH: usize = 18;

/// Position in the display list being executed.
#[derive(Debug, Clone)]
pub struct DisplayList {
    /// Physical address of the next command.
    pub pc: u32,
    stack: Vec<u32>,
    done: bool,
}

impl DisplayList {
    pub fn new(pc: u32) -> Self {
        Self {
            pc,
            stack: Vec::with_capacity(MAX_DEPTH),
            done: false,
        }
    }

    /// Fetches the next command, advancing the program counter.
    pub fn next(&mut self, sys: &System) -> Option<Command> {
        if self.done {
            return None;
        }

        let Some(cmd) = sys.mem.command(self.pc) else {
            sys.malformed(format_args!("command at {:#010X} is out of bounds", self.pc));
            self.done = true;
            return None;
        };

        self.pc = self.pc.wrapping_add(8);
        Some(cmd)
    }

    fn call(&mut self, sys: &System, target: u32) {
        if self.stack.len() == MAX_DEPTH {
            sys.malformed(format_args!("display list call stack overflow"));
            return;
        }

        self.stack.push(self.pc);
        self.pc = target;
    }

    fn ret(&mut self) {
        match self.stack.pop() {
            Some(pc) => self.pc = pc,
            None => self.done = true,
        }
    }
}

type Handler = fn(&mut System, &mut DisplayList, Command);

fn nop(_: &mut System, _: &mut DisplayList, _: Command) {}

fn unknown(sys: &mut System, _: &mut DisplayList, cmd: Command) {
    sys.stats.unknown += 1;
    if sys.first_warning(cmd.opcode()) {
        tracing::warn!(
            "unknown opcode {:#04X} ({:08X} {:08X})",
            cmd.opcode(),
            cmd.w0,
            cmd.w1
        );
    }
}

fn display_list(sys: &mut System, list: &mut DisplayList, cmd: Command) {
    let target = sys.mem.resolve(cmd.w1);
    if cmd.params() == 0 {
        list.call(sys, target);
    } else {
        list.pc = target;
    }
}

fn end_display_list(_: &mut System, list: &mut DisplayList, _: Command) {
    list.ret();
}

fn pop_matrix(sys: &mut System, _: &mut DisplayList, _: Command) {
    rsp::pop_matrix(sys);
}

fn tri1(sys: &mut System, _: &mut DisplayList, cmd: Command) {
    let indices = TriangleIndices::from_bits(cmd.w1);
    let indices = [indices.v0(), indices.v1(), indices.v2()];
    draw::triangle(sys, indices.map(|i| usize::from(i) / 10));
}

fn texture_rect(sys: &mut System, list: &mut DisplayList, cmd: Command) {
    let (Some(st), Some(deltas)) = (list.next(sys), list.next(sys)) else {
        return;
    };

    let (lr, ul) = (Coords::from_bits(cmd.w0), Coords::from_bits(cmd.w1));
    let (st, deltas) = (Halves::from_bits(st.w1), Halves::from_bits(deltas.w1));

    rdp::texture_rect(
        sys,
        TexRect {
            ulx: u32::from(ul.x().value()),
            uly: u32::from(ul.y().value()),
            lrx: u32::from(lr.x().value()),
            lry: u32::from(lr.y().value()),
            tile: u32::from(ul.tile().value()),
            s: st.high() as i16,
            t: st.low() as i16,
            dsdx: deltas.high() as i16,
            dtdy: deltas.low() as i16,
            flip: cmd.opcode() == Opcode::TexRectFlip as u8,
        },
    );
}

fn set_color_image(sys: &mut System, _: &mut DisplayList, cmd: Command) {
    sys.rdp.color_image = sys.mem.resolve(cmd.w1);
}

fn set_depth_image(sys: &mut System, _: &mut DisplayList, cmd: Command) {
    sys.rdp.z_image = sys.mem.resolve(cmd.w1);
}

/// Adapts a handler that only needs the command.
macro_rules! simple {
    ($handler:path) => {{
        fn handler(sys: &mut System, _: &mut DisplayList, cmd: Command) {
            $handler(sys, cmd)
        }

        handler as Handler
    }};
}

/// Adapts a handler that stores the command into an RDP register.
macro_rules! store {
    (|$sys:ident, $cmd:ident| $body:expr) => {{
        fn handler($sys: &mut System, _: &mut DisplayList, $cmd: Command) {
            $body;
        }

        handler as Handler
    }};
}

static HANDLERS: [Handler; 256] = {
    use color::Rgba8;

    let mut table = [unknown as Handler; 256];
    macro_rules! set {
        ($($opcode:ident => $handler:expr),* $(,)?) => {
            $(table[Opcode::$opcode as usize] = $handler;)*
        };
    }

    set! {
        SpNoop => nop,
        Mtx => simple!(rsp::matrix),
        MoveMem => simple!(rsp::move_mem),
        Vtx => simple!(rsp::vertices),
        Dl => display_list,
        RdpHalfCont => nop,
        RdpHalf2 => nop,
        RdpHalf1 => nop,
        ClearGeometryMode => simple!(rsp::clear_geometry_mode),
        SetGeometryMode => simple!(rsp::set_geometry_mode),
        EndDl => end_display_list,
        SetOtherModeL => simple!(rdp::set_other_mode_l),
        SetOtherModeH => simple!(rdp::set_other_mode_h),
        Texture => simple!(rsp::texture),
        MoveWord => simple!(rsp::move_word),
        PopMtx => pop_matrix,
        CullDl => nop,
        Tri1 => tri1,
        TexRect => texture_rect,
        TexRectFlip => texture_rect,
        RdpLoadSync => nop,
        RdpPipeSync => nop,
        RdpTileSync => nop,
        RdpFullSync => nop,
        SetScissor => simple!(rdp::set_scissor),
        SetPrimDepth => simple!(rdp::set_prim_depth),
        RdpSetOtherMode => simple!(rdp::set_other_mode_both),
        LoadTlut => simple!(rdp::load_tlut),
        SetTileSize => simple!(rdp::set_tile_size),
        LoadBlock => simple!(rdp::load_block),
        LoadTile => simple!(rdp::load_tile),
        SetTile => simple!(rdp::set_tile),
        FillRect => simple!(rdp::fill_rect),
        SetFillColor => simple!(rdp::set_fill_color),
        SetFogColor => store!(|sys, cmd| sys.rdp.fog_color = Rgba8::from_rgba32(cmd.w1)),
        SetBlendColor => store!(|sys, cmd| sys.rdp.blend_color = Rgba8::from_rgba32(cmd.w1)),
        SetPrimColor => simple!(rdp::set_prim_color),
        SetEnvColor => store!(|sys, cmd| sys.rdp.env_color = Rgba8::from_rgba32(cmd.w1)),
        SetCombine => simple!(rdp::set_combine),
        SetTImg => simple!(rdp::set_texture_image),
        SetZImg => set_depth_image,
        SetCImg => set_color_image,
    }

    table
};

/// Executes the display list at segmented address `entry` until it ends.
pub fn run(sys: &mut System, entry: u32) {
    let mut list = DisplayList::new(sys.mem.resolve(entry));
    while let Some(cmd) = list.next(sys) {
        if sys.stats.commands as usize >= sys.config.max_commands {
            sys.malformed(format_args!(
                "display list exceeded {} commands",
                sys.config.max_commands
            ));
            break;
        }

        sys.stats.commands += 1;
        tracing::trace!("{:#010X}: {:08X} {:08X}", list.pc.wrapping_sub(8), cmd.w0, cmd.w1);
        HANDLERS[cmd.opcode() as usize](sys, &mut list, cmd);
    }
}
