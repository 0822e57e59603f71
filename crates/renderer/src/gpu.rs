//! The PICA200 command sink the renderer drives.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use color::Rgba8;
use glam::Mat4;
use pica64::modules::render::{Attributes, ClearFlags, CullingMode, DepthMode, Rect, Sampler};
use picatex::NativeFormat;
use static_assertions::const_assert;

use crate::render::tev::TevStage;

/// Number of entries of a fog lookup table.
pub const FOG_LUT_LEN: usize = 128;

/// A GPU side vertex program, one per vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u8);

/// A GPU side vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u8);

/// A slot of the texture pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureSlot(pub u16);

/// A slot of the fog lookup table pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FogSlot(pub u8);

/// Render targets: the screens, with the top one split per eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    TopLeft,
    TopRight,
    Bottom,
}

/// Matrix uniforms of the vertex programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixUniform {
    ModelView,
    Projection,
    /// Screen rotation, depth range and aspect correction applied after projection.
    Preset,
}

/// Vector uniforms of the vertex programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorUniform {
    /// Scale and offset mapping raw texture coordinates of a unit into the texture, as
    /// `[scale_s, scale_t, offset_s, offset_t]`.
    TexCoord(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command<'a> {
    BeginFrame,
    EndFrame,

    // programs and buffers
    CreateProgram {
        id: ProgramId,
        attributes: Attributes,
    },
    BindProgram(ProgramId),
    CreateBuffer {
        id: BufferId,
        stride: usize,
    },
    BindBuffer(BufferId),
    UploadVertices {
        buffer: BufferId,
        data: Cow<'a, [f32]>,
    },
    SetMatrix {
        uniform: MatrixUniform,
        value: Mat4,
    },
    SetVector {
        uniform: VectorUniform,
        value: [f32; 4],
    },

    // fragment pipeline
    SetTevStages(Cow<'a, [TevStage]>),
    SetTevConstant {
        stage: u8,
        color: Rgba8,
    },
    /// Discards fragments with alpha below the reference. `None` disables the test.
    SetAlphaTest(Option<u8>),
    SetBlend(bool),
    UploadFogLut {
        slot: FogSlot,
        lut: Cow<'a, [u32]>,
    },
    /// Selects the fog table. `None` disables fog.
    SelectFogLut(Option<FogSlot>),
    SetFogColor(Rgba8),

    // textures
    CreateTexture {
        slot: TextureSlot,
        format: NativeFormat,
        width: u16,
        height: u16,
    },
    UploadTexture {
        slot: TextureSlot,
        data: Cow<'a, [u8]>,
    },
    BindTexture {
        unit: u8,
        slot: TextureSlot,
    },
    SetSampler {
        unit: u8,
        sampler: Sampler,
    },

    // raster state
    SetTarget(Target),
    SetViewport(Rect),
    SetScissor(Rect),
    SetDepth(DepthMode),
    SetCulling(CullingMode),
    Clear {
        target: Target,
        flags: ClearFlags,
        color: Rgba8,
        depth: f32,
    },
    Draw {
        vertices: u32,
    },
}

impl Command<'_> {
    /// Copies borrowed payloads so the command can outlive them.
    pub fn into_owned(self) -> Command<'static> {
        match self {
            Self::UploadVertices { buffer, data } => Command::UploadVertices {
                buffer,
                data: Cow::Owned(data.into_owned()),
            },
            Self::SetTevStages(stages) => Command::SetTevStages(Cow::Owned(stages.into_owned())),
            Self::UploadFogLut { slot, lut } => Command::UploadFogLut {
                slot,
                lut: Cow::Owned(lut.into_owned()),
            },
            Self::UploadTexture { slot, data } => Command::UploadTexture {
                slot,
                data: Cow::Owned(data.into_owned()),
            },
            Self::BeginFrame => Command::BeginFrame,
            Self::EndFrame => Command::EndFrame,
            Self::CreateProgram { id, attributes } => Command::CreateProgram { id, attributes },
            Self::BindProgram(id) => Command::BindProgram(id),
            Self::CreateBuffer { id, stride } => Command::CreateBuffer { id, stride },
            Self::BindBuffer(id) => Command::BindBuffer(id),
            Self::SetMatrix { uniform, value } => Command::SetMatrix { uniform, value },
            Self::SetVector { uniform, value } => Command::SetVector { uniform, value },
            Self::SetTevConstant { stage, color } => Command::SetTevConstant { stage, color },
            Self::SetAlphaTest(reference) => Command::SetAlphaTest(reference),
            Self::SetBlend(enabled) => Command::SetBlend(enabled),
            Self::SelectFogLut(slot) => Command::SelectFogLut(slot),
            Self::SetFogColor(color) => Command::SetFogColor(color),
            Self::CreateTexture {
                slot,
                format,
                width,
                height,
            } => Command::CreateTexture {
                slot,
                format,
                width,
                height,
            },
            Self::BindTexture { unit, slot } => Command::BindTexture { unit, slot },
            Self::SetSampler { unit, sampler } => Command::SetSampler { unit, sampler },
            Self::SetTarget(target) => Command::SetTarget(target),
            Self::SetViewport(rect) => Command::SetViewport(rect),
            Self::SetScissor(rect) => Command::SetScissor(rect),
            Self::SetDepth(mode) => Command::SetDepth(mode),
            Self::SetCulling(mode) => Command::SetCulling(mode),
            Self::Clear {
                target,
                flags,
                color,
                depth,
            } => Command::Clear {
                target,
                flags,
                color,
                depth,
            },
            Self::Draw { vertices } => Command::Draw { vertices },
        }
    }
}

// commands are recorded by value
const_assert!(size_of::<Command>() <= 96);

pub trait Gpu {
    fn submit(&mut self, command: Command<'_>);
}

/// A [`Gpu`] that records every command it receives.
///
/// This type is reference counted and therefore cheaply clonable: clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingGpu {
    commands: Rc<RefCell<Vec<Command<'static>>>>,
}

impl RecordingGpu {
    /// Removes and returns the recorded commands.
    pub fn take(&self) -> Vec<Command<'static>> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.commands.borrow().len()
    }
}

impl Gpu for RecordingGpu {
    fn submit(&mut self, command: Command<'_>) {
        self.commands.borrow_mut().push(command.into_owned());
    }
}

/// A [`Gpu`] that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGpu;

impl Gpu for NullGpu {
    fn submit(&mut self, _: Command<'_>) {}
}
