use std::cell::RefCell;
use std::rc::Rc;

use color::Rgba8;
use glam::{Mat4, Vec3};
use picatex::NativeFormat;
use rustc_hash::FxHashSet;
use zerocopy::IntoBytes;
use zerocopy::byteorder::big_endian::{I16, U16};

use crate::modules::platform::{Dimensions, NopPlatformModule, PlatformModule};
use crate::modules::render::{
    Action, Attributes, ClearFlags, RenderModule, Sampler, TexCoordTransform, TextureKey,
};
use crate::system::combiner::CombineMode;
use crate::system::gbi::encode::{self, TileParams};
use crate::system::gbi::{
    Command, CycleType, GeometryMode, Light, Mtx, OtherModeH, TextureFilter, Vp, Vtx, acmux,
    ccmux,
};
use crate::system::rdp::RECT_SCALE;
use crate::{Config, Modules, System};

const DL: u32 = 0x1000;
const SUB_DL: u32 = 0x1800;
const MTX: u32 = 0x2000;
const MTX2: u32 = 0x2040;
const VTX: u32 = 0x2100;
const LIGHTS: u32 = 0x2200;
const VIEWPORT: u32 = 0x2300;
const TEX: u32 = 0x3000;
const TEX2: u32 = 0x3100;
const RAM_SIZE: usize = 0x10000;

const RED: Rgba8 = Rgba8::new(255, 0, 0, 255);
const BLUE: Rgba8 = Rgba8::new(0, 0, 255, 255);

#[derive(Debug, Clone)]
enum Recorded {
    Draw {
        attributes: Attributes,
        tex_coords: [TexCoordTransform; 2],
        vertices: Vec<f32>,
        triangles: u32,
    },
    LoadTexture {
        key: TextureKey,
        format: NativeFormat,
        width: usize,
        height: usize,
        untiled: Vec<u8>,
    },
    Sampler(Sampler),
    Clear(ClearFlags),
    Other(String),
}

#[derive(Default)]
struct Recorder {
    log: Rc<RefCell<Vec<Recorded>>>,
    cached: FxHashSet<TextureKey>,
    bound: [Option<TextureKey>; 2],
    /// Units whose texture is replaced by the next load into another unit.
    replacing: u8,
    replaced: u8,
}

impl RenderModule for Recorder {
    fn exec(&mut self, action: Action<'_>) {
        let recorded = match action {
            Action::Draw(batch) => Recorded::Draw {
                attributes: batch.attributes,
                tex_coords: batch.tex_coords,
                vertices: batch.vertices.to_vec(),
                triangles: batch.triangles,
            },
            Action::LoadTexture { unit, key, texture } => {
                let others = self.replacing & !(1 << unit);
                if others != 0 {
                    for other in (0..2).filter(|other| others & (1 << other) != 0) {
                        if let Some(old) = self.bound[other].take() {
                            self.cached.remove(&old);
                        }
                    }

                    self.replaced |= others;
                    self.replacing = 0;
                }

                self.cached.insert(key);
                self.bound[usize::from(unit)] = Some(key);
                Recorded::LoadTexture {
                    key,
                    format: texture.format,
                    width: texture.logical_width,
                    height: texture.logical_height,
                    untiled: texture.untiled(),
                }
            }
            Action::SetSampler { sampler, .. } => Recorded::Sampler(sampler),
            Action::RequestClear { flags, .. } => Recorded::Clear(flags),
            other => Recorded::Other(format!("{other:?}")),
        };

        self.log.borrow_mut().push(recorded);
    }

    fn bind_cached_texture(&mut self, unit: u8, key: &TextureKey) -> bool {
        let hit = self.cached.contains(key);
        if hit {
            self.bound[usize::from(unit)] = Some(*key);
        }

        hit
    }

    fn take_replaced_textures(&mut self) -> u8 {
        std::mem::take(&mut self.replaced)
    }
}

struct DroppingPlatform;

impl PlatformModule for DroppingPlatform {
    fn poll_events(&mut self) {}

    fn start_frame(&mut self) -> bool {
        false
    }

    fn swap_begin(&mut self) {}

    fn swap_end(&mut self) {}

    fn dimensions(&self) -> Dimensions {
        Dimensions::default()
    }
}

struct Setup {
    ram: Vec<u8>,
    config: Config,
}

impl Setup {
    fn new() -> Self {
        let mut setup = Self {
            ram: vec![0; RAM_SIZE],
            config: Config::default(),
        };

        setup.put(MTX, Mtx::from_mat4(Mat4::IDENTITY).as_bytes());
        setup.put(
            VTX,
            [
                vtx([-10, -10, 0], [0, 0], [255, 255, 255, 255]),
                vtx([10, -10, 0], [512, 0], [0, 255, 0, 255]),
                vtx([0, 10, 0], [0, 512], [0, 0, 255, 128]),
            ]
            .as_bytes(),
        );

        setup
    }

    fn put(&mut self, addr: u32, bytes: &[u8]) {
        let addr = addr as usize;
        self.ram[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    fn list(&mut self, addr: u32, commands: &[Command]) {
        self.put(addr, &encode::to_bytes(commands));
    }

    fn system(self) -> (System, Rc<RefCell<Vec<Recorded>>>) {
        self.system_with(Recorder::default())
    }

    fn system_with(self, recorder: Recorder) -> (System, Rc<RefCell<Vec<Recorded>>>) {
        let log = recorder.log.clone();
        let modules = Modules {
            render: Box::new(recorder),
            platform: Box::new(NopPlatformModule::default()),
        };

        (System::new(modules, self.config, self.ram), log)
    }
}

fn vtx(position: [i16; 3], tex_coord: [i16; 2], color: [u8; 4]) -> Vtx {
    Vtx {
        position: position.map(I16::new),
        flag: U16::ZERO,
        tex_coord: tex_coord.map(I16::new),
        color,
    }
}

fn draws(log: &[Recorded]) -> Vec<(Attributes, [TexCoordTransform; 2], Vec<f32>, u32)> {
    log.iter()
        .filter_map(|r| match r {
            Recorded::Draw {
                attributes,
                tex_coords,
                vertices,
                triangles,
            } => Some((*attributes, *tex_coords, vertices.clone(), *triangles)),
            _ => None,
        })
        .collect()
}

fn count_actions(log: &[Recorded], prefix: &str) -> usize {
    log.iter()
        .filter(|r| matches!(r, Recorded::Other(s) if s.starts_with(prefix)))
        .count()
}

fn texture_loads(log: &[Recorded]) -> usize {
    log.iter()
        .filter(|r| matches!(r, Recorded::LoadTexture { .. }))
        .count()
}

fn prim_combiner() -> Command {
    encode::dp_set_combine([0, 0, 0, ccmux::PRIMITIVE], [0, 0, 0, acmux::PRIMITIVE])
}

fn shade_combiner() -> Command {
    encode::dp_set_combine([0, 0, 0, ccmux::SHADE], [0, 0, 0, acmux::SHADE])
}

fn texel_combiner() -> Command {
    encode::dp_set_combine([0, 0, 0, ccmux::TEXEL0], [0, 0, 0, acmux::TEXEL0])
}

#[test]
fn single_red_triangle() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::sp_load_model_view(MTX, false),
            encode::sp_vertex(VTX, 3, 0),
            prim_combiner(),
            encode::dp_set_prim_color(RED, 0, 0),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.commands, 6);
    assert_eq!(stats.vertices, 3);
    assert_eq!(stats.triangles, 1);
    assert_eq!(stats.draws, 1);

    let log = log.borrow();
    let draws = draws(&log);
    assert_eq!(draws.len(), 1);

    let (attributes, _, vertices, triangles) = &draws[0];
    assert_eq!(*attributes, Attributes::empty());
    assert_eq!(*triangles, 1);
    assert_eq!(
        vertices,
        &[-10.0, -10.0, 0.0, 1.0, 10.0, -10.0, 0.0, 1.0, 0.0, 10.0, 0.0, 1.0]
    );

    assert_eq!(count_actions(&log, "SetCombiner"), 1);
    assert_eq!(count_actions(&log, "SetPrimColor"), 1);
    let prim_color = format!("{:?}", Action::SetPrimColor(RED));
    assert!(
        log.iter()
            .any(|r| matches!(r, Recorded::Other(s) if *s == prim_color))
    );

    // frame boundaries come first and last
    assert!(matches!(&log[0], Recorded::Other(s) if s == "StartFrame"));
    assert!(matches!(log.last(), Some(Recorded::Other(s)) if s == "EndFrame"));
}

#[test]
fn same_state_is_batched() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::sp_vertex(VTX, 3, 0),
            prim_combiner(),
            encode::dp_set_prim_color(RED, 0, 0),
            encode::sp_1triangle(0, 1, 2),
            encode::dp_pipe_sync(),
            encode::dp_set_prim_color(RED, 0, 0),
            encode::sp_1triangle(2, 1, 0),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    sys.run_frame(DL).unwrap();

    let log = log.borrow();
    let draws = draws(&log);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].3, 2);
    assert_eq!(draws[0].2.len(), 2 * 3 * 4);
    assert_eq!(count_actions(&log, "SetPrimColor"), 1);
}

#[test]
fn used_state_changes_flush() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::sp_vertex(VTX, 3, 0),
            prim_combiner(),
            encode::dp_set_prim_color(RED, 0, 0),
            encode::sp_1triangle(0, 1, 2),
            encode::dp_set_prim_color(BLUE, 0, 0),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.draws, 2);
    assert_eq!(count_actions(&log.borrow(), "SetPrimColor"), 2);
}

#[test]
fn unused_state_changes_do_not_flush() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::sp_vertex(VTX, 3, 0),
            shade_combiner(),
            encode::dp_set_prim_color(RED, 0, 0),
            encode::sp_1triangle(0, 1, 2),
            encode::dp_set_prim_color(BLUE, 0, 0),
            encode::dp_set_env_color(BLUE),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.draws, 1);

    let log = log.borrow();
    assert_eq!(count_actions(&log, "SetPrimColor"), 0);
    assert_eq!(count_actions(&log, "SetEnvColor"), 0);

    // shade is interleaved after the position
    let draws = draws(&log);
    let (attributes, _, vertices, _) = &draws[0];
    assert_eq!(*attributes, Attributes::COLOR);
    assert_eq!(attributes.stride(), 8);
    assert_eq!(&vertices[12..16], &[0.0, 1.0, 0.0, 1.0]);
    assert_eq!(vertices[23], 128.0 / 255.0);
}

#[test]
fn state_is_resent_every_frame() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::sp_vertex(VTX, 3, 0),
            prim_combiner(),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    sys.run_frame(DL).unwrap();
    sys.run_frame(DL).unwrap();
    assert_eq!(count_actions(&log.borrow(), "SetCombiner"), 2);
}

#[test]
fn matrix_stack() {
    let mut setup = Setup::new();
    let mut commands = vec![encode::sp_load_model_view(MTX, true); 12];
    commands.extend([encode::sp_pop_matrix(); 3]);
    commands.push(encode::sp_end_display_list());
    setup.list(DL, &commands);

    // the last matrix is never popped
    setup.list(
        SUB_DL,
        &[
            encode::sp_load_model_view(MTX, true),
            encode::sp_pop_matrix(),
            encode::sp_pop_matrix(),
            encode::sp_pop_matrix(),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, _) = setup.system();
    sys.run_frame(DL).unwrap();
    assert_eq!(sys.rsp.depth, 8);

    sys.run_frame(SUB_DL).unwrap();
    assert_eq!(sys.rsp.depth, 1);
}

#[test]
fn matrix_composition() {
    let translation = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    let scale = Mat4::from_scale(Vec3::splat(2.0));

    let mut setup = Setup::new();
    setup.put(MTX, Mtx::from_mat4(translation).as_bytes());
    setup.put(MTX2, Mtx::from_mat4(scale).as_bytes());
    setup.list(
        DL,
        &[
            encode::sp_load_model_view(MTX, false),
            encode::sp_matrix(MTX2, 0),
            encode::sp_load_projection(MTX2),
            encode::sp_matrix(MTX, 1),
            encode::sp_vertex(VTX, 3, 0),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, _) = setup.system();
    sys.run_frame(DL).unwrap();

    // the operand is applied to vertices first
    assert_eq!(sys.rsp.model_view(), translation * scale);
    assert_eq!(sys.rsp.projection, scale * translation);
    assert_eq!(sys.rsp.vertex_transforms.model_view, translation * scale);
    assert_eq!(
        sys.rsp.vertex_transforms.projection,
        scale * translation
    );
    assert!(!sys.rsp.matrices_dirty);
}

#[test]
fn matrix_changes_end_the_batch_at_the_next_load() {
    let mut setup = Setup::new();
    setup.put(MTX2, Mtx::from_mat4(Mat4::from_scale(Vec3::splat(2.0))).as_bytes());
    setup.list(
        DL,
        &[
            encode::sp_load_model_view(MTX, false),
            encode::sp_vertex(VTX, 3, 0),
            prim_combiner(),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_load_model_view(MTX2, false),
            // still drawn with the transforms the vertices were loaded with
            encode::sp_1triangle(0, 1, 2),
            encode::sp_vertex(VTX, 3, 0),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.draws, 2);

    let log = log.borrow();
    let draws = draws(&log);
    assert_eq!(draws[0].3, 2);
    assert_eq!(draws[1].3, 1);
    assert_eq!(count_actions(&log, "SetTransforms"), 2);
}

#[test]
fn lighting() {
    let mut setup = Setup::new();
    setup.put(
        LIGHTS,
        [
            Light::new([100, 150, 200], [0, 0, 127]),
            Light::new([50, 50, 100], [0, 0, 0]),
        ]
        .as_bytes(),
    );
    setup.put(
        VTX,
        [
            vtx([0, 0, 0], [0, 0], [0, 0, 127, 255]),
            vtx([0, 0, 0], [0, 0], [0, 0, 0x81, 77]),
        ]
        .as_bytes(),
    );
    setup.list(
        DL,
        &[
            encode::sp_set_geometry_mode((GeometryMode::LIGHTING | GeometryMode::SHADE).bits()),
            encode::sp_num_lights(1),
            encode::sp_light(LIGHTS, 1),
            encode::sp_light(LIGHTS + 16, 2),
            encode::sp_vertex(VTX, 2, 0),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, _) = setup.system();
    sys.run_frame(DL).unwrap();

    assert_eq!(sys.rsp.num_lights, 2);
    assert_eq!(sys.rsp.vertices[0].color, Rgba8::new(150, 200, 255, 255));
    assert_eq!(sys.rsp.vertices[1].color, Rgba8::new(50, 50, 100, 77));
}

#[test]
fn viewport_and_scissor() {
    let mut setup = Setup::new();
    let vp = Vp {
        scale: [640, 480, 511, 0].map(I16::new),
        translation: [640, 480, 511, 0].map(I16::new),
    };
    setup.put(VIEWPORT, vp.as_bytes());
    setup.list(
        DL,
        &[
            encode::sp_viewport(VIEWPORT),
            encode::dp_set_scissor(0, 0, 0, 160, 120),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, _) = setup.system();
    sys.run_frame(DL).unwrap();

    let viewport = sys.rdp.viewport;
    assert_eq!(
        [viewport.x, viewport.y, viewport.width, viewport.height],
        [0.0, 0.0, 400.0, 240.0]
    );

    // the upper left quarter of the screen
    let scissor = sys.rdp.scissor;
    assert_eq!(
        [scissor.x, scissor.y, scissor.width, scissor.height],
        [0.0, 120.0, 200.0, 120.0]
    );
}

/// Loads a 16x16 I4 texture whose texels are `(x + y) % 16`.
fn load_i4_texture(setup: &mut Setup) -> Vec<Command> {
    let mut texels = vec![0u8; 128];
    for y in 0..16 {
        for x in (0..16).step_by(2) {
            let hi = ((x + y) % 16) as u8;
            let lo = ((x + 1 + y) % 16) as u8;
            texels[(y * 16 + x) / 2] = hi << 4 | lo;
        }
    }
    setup.put(TEX, &texels);

    vec![
        encode::dp_set_texture_image(4, 2, 1, TEX),
        encode::dp_set_tile(TileParams {
            format: 4,
            size: 2,
            tile: 7,
            ..Default::default()
        }),
        encode::dp_load_sync(),
        encode::dp_load_block(7, 0, 0, 63, 0),
        encode::dp_pipe_sync(),
        encode::dp_set_tile(TileParams {
            format: 4,
            size: 0,
            line: 1,
            tile: 0,
            ..Default::default()
        }),
        encode::dp_set_tile_size(0, 0, 0, 15 << 2, 15 << 2),
        encode::sp_texture(0xFFFF, 0xFFFF, 0, 0, true),
    ]
}

#[test]
fn i4_texture() {
    let mut setup = Setup::new();
    let mut commands = load_i4_texture(&mut setup);
    commands.extend([
        encode::sp_vertex(VTX, 3, 0),
        texel_combiner(),
        encode::sp_1triangle(0, 1, 2),
        encode::sp_end_display_list(),
    ]);
    setup.list(DL, &commands);

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.texture_loads, 1);
    assert_eq!(stats.texture_failures, 0);

    let log = log.borrow();
    let load = log
        .iter()
        .find_map(|r| match r {
            Recorded::LoadTexture {
                key,
                format,
                width,
                height,
                untiled,
            } => Some((key, format, width, height, untiled)),
            _ => None,
        })
        .unwrap();

    let (key, format, width, height, untiled) = load;
    assert_eq!(key.addr, TEX);
    assert_eq!(*format, NativeFormat::La4);
    assert_eq!((*width, *height), (16, 16));
    for y in 0..16 {
        for x in 0..16 {
            let intensity = ((x + y) % 16) as u8;
            assert_eq!(untiled[y * 16 + x], intensity * 17, "texel ({x}, {y})");
        }
    }

    let sampler = log.iter().find_map(|r| match r {
        Recorded::Sampler(sampler) => Some(*sampler),
        _ => None,
    });
    assert_eq!(sampler, Some(Sampler::default()));

    let draws = draws(&log);
    let (attributes, tex_coords, vertices, _) = &draws[0];
    assert_eq!(*attributes, Attributes::TEXCOORD);
    assert_eq!(tex_coords[0].scale, [1.0 / 512.0; 2]);
    assert_eq!(tex_coords[0].offset, [0.0; 2]);
    // texture coordinates are scaled by 0xFFFF / 0x10000
    assert_eq!(&vertices[10..12], &[511.0, 0.0]);
}

/// Loads a second 16x16 I4 texture into the upper half of TMEM, which feeds unit 1.
fn load_second_texture(setup: &mut Setup) -> Vec<Command> {
    setup.put(TEX2, &[0x5A; 128]);

    vec![
        encode::dp_set_texture_image(4, 2, 1, TEX2),
        encode::dp_set_tile(TileParams {
            format: 4,
            size: 2,
            tmem: 256,
            tile: 7,
            ..Default::default()
        }),
        encode::dp_load_sync(),
        encode::dp_load_block(7, 0, 0, 63, 0),
        encode::dp_pipe_sync(),
    ]
}

#[test]
fn replaced_textures_are_loaded_again() {
    let mut setup = Setup::new();
    let mut commands = load_i4_texture(&mut setup);
    commands.extend(load_second_texture(&mut setup));
    commands.extend([
        encode::sp_vertex(VTX, 3, 0),
        encode::dp_set_combine([ccmux::TEXEL0, 0, ccmux::TEXEL1, 0], [0, 0, 0, acmux::TEXEL0]),
        encode::sp_1triangle(0, 1, 2),
        encode::sp_end_display_list(),
    ]);
    setup.list(DL, &commands);

    // loading unit 1 replaces the texture of unit 0
    let recorder = Recorder {
        replacing: 0b01,
        ..Default::default()
    };
    let (mut sys, log) = setup.system_with(recorder);
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.texture_loads, 3);

    let log = log.borrow();
    let loads = log
        .iter()
        .filter_map(|r| match r {
            Recorded::LoadTexture { key, .. } => Some(key.addr),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(loads, [TEX, TEX2, TEX]);

    let last_load = log
        .iter()
        .rposition(|r| matches!(r, Recorded::LoadTexture { .. }))
        .unwrap();
    let draw = log
        .iter()
        .position(|r| matches!(r, Recorded::Draw { .. }))
        .unwrap();
    assert!(last_load < draw);
}

#[test]
fn textures_are_reused_across_frames() {
    let mut setup = Setup::new();
    let mut commands = load_i4_texture(&mut setup);
    commands.extend([
        encode::sp_vertex(VTX, 3, 0),
        texel_combiner(),
        encode::sp_1triangle(0, 1, 2),
        encode::sp_end_display_list(),
    ]);
    setup.list(DL, &commands);

    let (mut sys, log) = setup.system();
    sys.run_frame(DL).unwrap();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.texture_loads, 0);
    assert_eq!(stats.texture_cache_hits, 1);
    assert_eq!(texture_loads(&log.borrow()), 1);

    // same address, different contents
    sys.mem.ram_mut()[TEX as usize] ^= 0xFF;
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.texture_loads, 1);
    assert_eq!(texture_loads(&log.borrow()), 2);
}

#[test]
fn broken_textures_are_skipped() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::dp_set_texture_image(0, 3, 1, TEX),
            encode::dp_set_tile(TileParams {
                format: 0,
                size: 3,
                tile: 7,
                ..Default::default()
            }),
            encode::dp_load_block(7, 0, 0, 7, 0),
            // a line longer than the load leaves no rows
            encode::dp_set_tile(TileParams {
                format: 0,
                size: 3,
                line: 8,
                tile: 0,
                ..Default::default()
            }),
            encode::sp_vertex(VTX, 3, 0),
            texel_combiner(),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.texture_failures, 1);
    assert_eq!(stats.draws, 1);
    assert_eq!(texture_loads(&log.borrow()), 0);
}

#[test]
fn fill_rectangle() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::dp_set_color_image(0, 2, 320, 0x8000),
            encode::dp_set_depth_image(0x9000),
            encode::sp_set_geometry_mode((GeometryMode::ZBUFFER | GeometryMode::CULL_BACK).bits()),
            encode::dp_set_other_mode(
                OtherModeH::default()
                    .with_cycle_type(CycleType::Fill)
                    .to_bits(),
                0,
            ),
            encode::dp_set_fill_color(0xF801_F801),
            encode::dp_fill_rectangle(0, 0, 319, 239),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.triangles, 2);
    assert_eq!(stats.draws, 1);

    let log = log.borrow();
    let draws = draws(&log);
    let (attributes, _, vertices, triangles) = &draws[0];
    assert_eq!(*attributes, Attributes::COLOR);
    assert_eq!(*triangles, 2);

    let s = RECT_SCALE;
    // upper left, lower left, upper right
    assert_eq!(&vertices[0..8], &[-s, s, -s, s, 1.0, 0.0, 0.0, 1.0]);
    assert_eq!(&vertices[8..12], &[-s, -s, -s, s]);
    assert_eq!(&vertices[16..20], &[s, s, -s, s]);

    assert!(
        log.iter()
            .any(|r| matches!(r, Recorded::Other(s) if s == "SetCullingMode(None)"))
    );

    // the overridden state is restored
    assert_eq!(
        sys.rsp.geometry_mode,
        GeometryMode::ZBUFFER | GeometryMode::CULL_BACK
    );
    assert_eq!(sys.rdp.combine_mode, CombineMode::default());
}

#[test]
fn depth_fill_clears() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::dp_set_color_image(0, 2, 320, 0x9000),
            encode::dp_set_depth_image(0x9000),
            encode::dp_fill_rectangle(0, 0, 319, 239),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.draws, 0);

    let log = log.borrow();
    let clears: Vec<_> = log
        .iter()
        .filter_map(|r| match r {
            Recorded::Clear(flags) => Some(*flags),
            _ => None,
        })
        .collect();
    assert_eq!(clears, [ClearFlags::DEPTH]);
}

#[test]
fn copy_mode_texture_rectangle() {
    let mut setup = Setup::new();
    let copy_mode = OtherModeH::default()
        .with_cycle_type(CycleType::Copy)
        .with_texture_filter(TextureFilter::Bilinear);

    let mut commands = load_i4_texture(&mut setup);
    commands.push(encode::dp_set_other_mode(copy_mode.to_bits(), 0));
    commands.push(shade_combiner());
    commands.extend(encode::sp_texture_rectangle(
        10, 10, 26, 26, 0, 0, 0, 4 << 10, 1 << 10, false,
    ));
    commands.push(encode::sp_end_display_list());
    setup.list(DL, &commands);

    let (mut sys, log) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.triangles, 2);
    assert_eq!(stats.texture_loads, 1);

    let log = log.borrow();
    let sampler = log.iter().find_map(|r| match r {
        Recorded::Sampler(sampler) => Some(*sampler),
        _ => None,
    });
    assert_eq!(sampler.map(|s| s.linear), Some(false));

    // 16 pixels plus the extra one of copy mode, in s10.5
    let draws = draws(&log);
    let (attributes, _, vertices, _) = &draws[0];
    assert_eq!(*attributes, Attributes::TEXCOORD);
    // upper left, then lower left
    assert_eq!(&vertices[4..6], &[0.0, 0.0]);
    assert_eq!(&vertices[10..12], &[0.0, 544.0]);
    // second triangle: lower left, lower right
    assert_eq!(&vertices[28..30], &[544.0, 544.0]);

    // the point filter only lasts for the rectangle
    assert_eq!(sys.rdp.other_mode_h, copy_mode);
}

#[test]
fn nested_display_lists() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::sp_vertex(VTX, 3, 0),
            prim_combiner(),
            encode::sp_display_list(SUB_DL),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_branch_list(SUB_DL + 0x100),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_end_display_list(),
        ],
    );
    setup.list(
        SUB_DL,
        &[encode::sp_1triangle(0, 1, 2), encode::sp_end_display_list()],
    );
    setup.list(SUB_DL + 0x100, &[encode::sp_end_display_list()]);

    let (mut sys, _) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.triangles, 2);
    assert_eq!(stats.commands, 8);
}

#[test]
fn runaway_display_lists_stop() {
    let mut setup = Setup::new();
    setup.config.max_commands = 100;
    setup.list(DL, &[encode::dp_pipe_sync(), encode::sp_branch_list(DL)]);

    let (mut sys, _) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.commands, 100);
}

#[test]
fn unknown_opcodes_are_skipped() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            Command::new(0x0200_0000, 0),
            Command::new(0x0200_0000, 0),
            encode::sp_vertex(VTX, 3, 0),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, _) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    assert_eq!(stats.unknown, 2);
    assert_eq!(stats.vertices, 3);
}

#[test]
fn malformed_input_is_clamped() {
    let mut setup = Setup::new();
    setup.list(
        DL,
        &[
            encode::sp_vertex(VTX, 3, 0),
            prim_combiner(),
            Command::new(0xBF00_0000, 0x00FA_0A14),
            encode::sp_display_list(0x00FF_0000),
            encode::sp_1triangle(0, 1, 2),
            encode::sp_end_display_list(),
        ],
    );

    let (mut sys, _) = setup.system();
    let stats = sys.run_frame(DL).unwrap();
    // the bad triangle is dropped and the list ends at the bad call
    assert_eq!(stats.triangles, 0);
}

#[test]
#[should_panic(expected = "malformed display list")]
fn strict_mode_panics() {
    let mut setup = Setup::new();
    setup.config.strict = true;
    setup.list(DL, &[encode::sp_display_list(0x00FF_0000)]);

    let (mut sys, _) = setup.system();
    sys.run_frame(DL);
}

#[test]
fn dropped_frames_do_nothing() {
    let setup = Setup::new();
    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let modules = Modules {
        render: Box::new(recorder),
        platform: Box::new(DroppingPlatform),
    };

    let mut sys = System::new(modules, setup.config, setup.ram);
    assert_eq!(sys.run_frame(DL), None);
    assert!(log.borrow().is_empty());
}
