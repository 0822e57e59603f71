//! State of the system (i.e. RSP, RDP and the interpreter around them).

pub mod cmd;
pub mod combiner;
pub mod draw;
pub mod gbi;
pub mod mem;
pub mod rdp;
pub mod rsp;

use color::Rgba8;
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::modules::platform::{Dimensions, PlatformModule};
use crate::modules::render::{Action, RenderModule, Screen};
use crate::system::mem::Memory;

/// Width of the N64 framebuffer the display lists are authored for.
pub const SCREEN_WIDTH: f32 = 320.0;
/// Height of the N64 framebuffer the display lists are authored for.
pub const SCREEN_HEIGHT: f32 = 240.0;

/// System configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Panic on malformed display lists instead of skipping the offending command.
    pub strict: bool,
    /// Commands executed per frame before the display list is considered runaway.
    pub max_commands: usize,
    /// Squeeze 4:3 content horizontally so it keeps its proportions on the target.
    pub aspect_fix: bool,
    pub clear_color: Rgba8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict: false,
            max_commands: 1 << 20,
            aspect_fix: true,
            clear_color: Rgba8::BLACK,
        }
    }
}

/// System modules.
pub struct Modules {
    pub render: Box<dyn RenderModule>,
    pub platform: Box<dyn PlatformModule>,
}

/// Per frame interpreter statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub commands: u32,
    pub vertices: u32,
    pub triangles: u32,
    /// Flush requests, including the ones with nothing to draw.
    pub flushes: u32,
    pub draws: u32,
    pub texture_loads: u32,
    pub texture_cache_hits: u32,
    pub texture_failures: u32,
    pub unknown: u32,
}

impl std::ops::AddAssign for Stats {
    fn add_assign(&mut self, rhs: Self) {
        self.commands += rhs.commands;
        self.vertices += rhs.vertices;
        self.triangles += rhs.triangles;
        self.flushes += rhs.flushes;
        self.draws += rhs.draws;
        self.texture_loads += rhs.texture_loads;
        self.texture_cache_hits += rhs.texture_cache_hits;
        self.texture_failures += rhs.texture_failures;
        self.unknown += rhs.unknown;
    }
}

/// System state.
pub struct System {
    /// System configuration.
    pub config: Config,
    /// System modules.
    pub modules: Modules,
    /// RDRAM.
    pub mem: Memory,
    /// Vertex processor state.
    pub rsp: rsp::Interface,
    /// Rasterizer state.
    pub rdp: rdp::Interface,
    /// Batching and the state last forwarded to the renderer.
    pub draw: draw::Interface,
    /// Statistics of the current frame.
    pub stats: Stats,
    /// Dimensions of the render target for the current frame.
    pub dimensions: Dimensions,
    warned: FxHashSet<u8>,
}

impl System {
    pub fn new(modules: Modules, config: Config, ram: Vec<u8>) -> Self {
        let dimensions = modules.platform.dimensions();
        Self {
            mem: Memory::new(ram),
            rsp: rsp::Interface::default(),
            rdp: rdp::Interface::default(),
            draw: draw::Interface::default(),
            stats: Stats::default(),
            dimensions,
            warned: FxHashSet::default(),

            config,
            modules,
        }
    }

    /// Horizontal scale applied after projection.
    pub fn aspect(&self) -> f32 {
        if self.config.aspect_fix {
            (SCREEN_WIDTH / SCREEN_HEIGHT) / self.dimensions.aspect_ratio()
        } else {
            1.0
        }
    }

    /// Reports malformed input. Panics in strict mode.
    pub fn malformed(&self, args: std::fmt::Arguments) {
        if self.config.strict {
            panic!("malformed display list: {args}");
        }

        tracing::warn!("malformed display list: {args}");
    }

    /// Returns `true` the first time it is called for `opcode`.
    pub(crate) fn first_warning(&mut self, opcode: u8) -> bool {
        self.warned.insert(opcode)
    }

    /// Runs the display list at segmented address `entry` as a whole frame. Returns `None` if the
    /// platform dropped the frame.
    pub fn run_frame(&mut self, entry: u32) -> Option<Stats> {
        self.modules.platform.poll_events();
        if !self.modules.platform.start_frame() {
            tracing::debug!("frame dropped by the platform");
            return None;
        }

        self.stats = Stats::default();
        self.dimensions = self.modules.platform.dimensions();
        rsp::reset(self);
        draw::reset(self);

        self.modules.render.exec(Action::StartFrame);
        self.modules.render.exec(Action::SetClearColor {
            screen: Screen::Top,
            color: self.config.clear_color,
        });
        self.modules.render.exec(Action::SetClearDepth {
            screen: Screen::Top,
            depth: 1.0,
        });

        cmd::run(self, entry);
        draw::flush(self, format_args!("end of frame"));

        self.modules.render.exec(Action::EndFrame);
        self.modules.platform.swap_begin();
        self.modules.platform.swap_end();

        let stats = self.stats;
        tracing::debug!(
            commands = stats.commands,
            triangles = stats.triangles,
            draws = stats.draws,
            texture_loads = stats.texture_loads,
            "frame done"
        );

        Some(stats)
    }
}
