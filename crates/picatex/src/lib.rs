//! Conversion of N64 textures into formats the PICA200 can sample.
//!
//! Formats with a native PICA equivalent are copied with their bytes reordered. The rest are
//! widened into the closest native format without losing precision. The result is padded to
//! power of two dimensions and laid out in 8x8 tiles (see [`tile`]).

pub mod tile;


use std::hash::Hasher;

use bitos::BitUtils;
use color::Rgba8;
use easyerr::Error;
use strum::FromRepr;
use twox_hash::XxHash3_64;

/// Size of the conversion scratch buffer, in bytes.
pub const SCRATCH_CAPACITY: usize = 128 * 1024;
/// Smallest texture side the PICA accepts.
pub const MIN_DIMENSION: usize = 8;

/// Texel format as encoded in the RDP tile descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum SourceFormat {
    Rgba = 0,
    Yuv = 1,
    ColorIndex = 2,
    IntensityAlpha = 3,
    Intensity = 4,
}

/// Texel size as encoded in the RDP tile descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum TexelSize {
    Bits4 = 0,
    Bits8 = 1,
    Bits16 = 2,
    Bits32 = 3,
}

impl TexelSize {
    /// Bytes occupied by `texels` texels of this size.
    #[inline(always)]
    pub const fn bytes_for(self, texels: usize) -> usize {
        (texels << self as usize) >> 1
    }

    /// Texels that fit in `bytes` bytes.
    #[inline(always)]
    pub const fn texels_in(self, bytes: usize) -> usize {
        (bytes << 1) >> self as usize
    }
}

/// Format of the entries of a palette (TLUT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PaletteFormat {
    #[default]
    Rgba16,
    Ia16,
}

/// Texture formats the PICA200 samples natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeFormat {
    Rgba8,
    Rgba5551,
    La8,
    La4,
}

impl NativeFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgba5551 | Self::La8 => 2,
            Self::La4 => 1,
        }
    }

    /// The native format a source format is converted into.
    pub fn resolve(
        format: SourceFormat,
        size: TexelSize,
        palette: PaletteFormat,
    ) -> Result<Self, ConvertError> {
        use SourceFormat as F;
        use TexelSize as S;

        Ok(match (format, size) {
            (F::Rgba, S::Bits16) => Self::Rgba5551,
            (F::Rgba, S::Bits32) => Self::Rgba8,
            (F::IntensityAlpha, S::Bits4) => Self::La8,
            (F::IntensityAlpha, S::Bits8) => Self::La4,
            (F::IntensityAlpha, S::Bits16) => Self::La8,
            (F::Intensity, S::Bits4) => Self::La4,
            (F::Intensity, S::Bits8) => Self::La8,
            (F::ColorIndex, S::Bits4 | S::Bits8) => match palette {
                PaletteFormat::Rgba16 => Self::Rgba5551,
                PaletteFormat::Ia16 => Self::La8,
            },
            _ => return Err(ConvertError::Unsupported { format, size }),
        })
    }

    /// Decodes a single native texel.
    pub fn decode(self, bytes: &[u8]) -> Rgba8 {
        match self {
            Self::Rgba8 => Rgba8::new(bytes[3], bytes[2], bytes[1], bytes[0]),
            Self::Rgba5551 => Rgba8::from_rgba5551(u16::from_le_bytes([bytes[0], bytes[1]])),
            Self::La8 => Rgba8::gray(bytes[1], bytes[0]),
            Self::La4 => Rgba8::from_ia8(bytes[0]),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("texture of {required} bytes exceeds the scratch capacity of {capacity} bytes")]
    TooLarge { required: usize, capacity: usize },
    #[error("texture needs {required} bytes but only {available} are available")]
    Truncated { required: usize, available: usize },
    #[error("unsupported texture format {format:?} with {size:?} texels")]
    Unsupported {
        format: SourceFormat,
        size: TexelSize,
    },
    #[error("color indexed texture without a palette")]
    MissingPalette,
    #[error("texture has no texels")]
    Empty,
}

/// A texture as laid out in N64 memory.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    pub format: SourceFormat,
    pub size: TexelSize,
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
    pub palette: Option<&'a [u8]>,
    pub palette_format: PaletteFormat,
}

impl Source<'_> {
    /// Bytes of texel data this texture spans.
    pub fn byte_len(&self) -> usize {
        self.size.bytes_for(self.width * self.height)
    }

    fn palette_len(&self) -> usize {
        match (self.format, self.size) {
            (SourceFormat::ColorIndex, TexelSize::Bits4) => 16 * 2,
            (SourceFormat::ColorIndex, _) => 256 * 2,
            _ => 0,
        }
    }

    /// xxHash3 of the bytes the texture spans, including the palette entries it can reference.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = XxHash3_64::with_seed(0);
        hasher.write_usize(self.width);
        hasher.write_usize(self.height);
        hasher.write(&self.data[..self.byte_len().min(self.data.len())]);
        if let Some(palette) = self.palette {
            hasher.write(&palette[..self.palette_len().min(palette.len())]);
        }

        hasher.finish()
    }
}

/// A converted texture, ready for upload.
#[derive(Debug, Clone, Copy)]
pub struct Texture<'a> {
    pub format: NativeFormat,
    /// Physical width, a power of two.
    pub width: usize,
    /// Physical height, a power of two.
    pub height: usize,
    pub logical_width: usize,
    pub logical_height: usize,
    /// Tiled texel data.
    pub data: &'a [u8],
}

impl Texture<'_> {
    /// Ratio of logical to physical size, per axis.
    pub fn scale(&self) -> [f32; 2] {
        [
            self.logical_width as f32 / self.width as f32,
            self.logical_height as f32 / self.height as f32,
        ]
    }

    /// Texel data in row-major order.
    pub fn untiled(&self) -> Vec<u8> {
        tile::untile(
            self.width,
            self.height,
            self.format.bytes_per_pixel(),
            self.data,
        )
    }
}

/// Physical size of a texture side of `logical` texels.
#[inline(always)]
pub const fn padded_dimension(logical: usize) -> usize {
    let value = if logical < MIN_DIMENSION {
        MIN_DIMENSION
    } else {
        logical
    };

    value.next_power_of_two()
}

#[inline(always)]
fn read_u16(data: &[u8], index: usize) -> u16 {
    u16::from_be_bytes([data[2 * index], data[2 * index + 1]])
}

#[inline(always)]
fn read_u32(data: &[u8], index: usize) -> u32 {
    u32::from_be_bytes([
        data[4 * index],
        data[4 * index + 1],
        data[4 * index + 2],
        data[4 * index + 3],
    ])
}

/// Even texels live in the high nibble.
#[inline(always)]
fn read_nibble(data: &[u8], index: usize) -> u8 {
    let byte = data[index / 2];
    if index % 2 == 0 {
        byte.bits(4, 8)
    } else {
        byte.bits(0, 4)
    }
}

#[inline(always)]
fn la8(intensity: u8, alpha: u8) -> u32 {
    u32::from(u16::from_be_bytes([intensity, alpha]))
}

/// Converts textures using a fixed scratch buffer.
pub struct Converter {
    scratch: Box<[u8]>,
}

impl Default for Converter {
    fn default() -> Self {
        Self {
            scratch: vec![0; SCRATCH_CAPACITY].into_boxed_slice(),
        }
    }
}

impl Converter {
    /// Converts `source` into its native format. The returned texture borrows the scratch buffer.
    pub fn convert(&mut self, source: &Source<'_>) -> Result<Texture<'_>, ConvertError> {
        use SourceFormat as F;
        use TexelSize as S;

        if source.width == 0 || source.height == 0 {
            return Err(ConvertError::Empty);
        }

        let format = NativeFormat::resolve(source.format, source.size, source.palette_format)?;
        let bpp = format.bytes_per_pixel();
        let width = padded_dimension(source.width);
        let height = padded_dimension(source.height);

        let required = width * height * bpp;
        if required > self.scratch.len() {
            return Err(ConvertError::TooLarge {
                required,
                capacity: self.scratch.len(),
            });
        }

        let available = source.data.len();
        if source.byte_len() > available {
            return Err(ConvertError::Truncated {
                required: source.byte_len(),
                available,
            });
        }

        let palette = if source.format == F::ColorIndex {
            let palette = source.palette.ok_or(ConvertError::MissingPalette)?;
            if palette.len() < source.palette_len() {
                return Err(ConvertError::Truncated {
                    required: source.palette_len(),
                    available: palette.len(),
                });
            }

            palette
        } else {
            &[]
        };

        let data = source.data;
        let (src_width, src_height) = (source.width, source.height);
        let at = |x: usize, y: usize| (y % src_height) * src_width + x % src_width;
        let out = &mut self.scratch[..required];

        match (source.format, source.size) {
            (F::Rgba, S::Bits16) => tile::encode(width, height, bpp, out, |x, y| {
                u32::from(read_u16(data, at(x, y)))
            }),
            (F::Rgba, S::Bits32) => {
                tile::encode(width, height, bpp, out, |x, y| read_u32(data, at(x, y)))
            }
            (F::IntensityAlpha, S::Bits4) => tile::encode(width, height, bpp, out, |x, y| {
                let texel = Rgba8::from_ia4(read_nibble(data, at(x, y)));
                la8(texel.r, texel.a)
            }),
            (F::IntensityAlpha, S::Bits8) => {
                tile::encode(width, height, bpp, out, |x, y| u32::from(data[at(x, y)]))
            }
            (F::IntensityAlpha, S::Bits16) => tile::encode(width, height, bpp, out, |x, y| {
                u32::from(read_u16(data, at(x, y)))
            }),
            (F::Intensity, S::Bits4) => tile::encode(width, height, bpp, out, |x, y| {
                let intensity = read_nibble(data, at(x, y));
                u32::from((intensity << 4) | intensity)
            }),
            (F::Intensity, S::Bits8) => tile::encode(width, height, bpp, out, |x, y| {
                let intensity = data[at(x, y)];
                la8(intensity, intensity)
            }),
            (F::ColorIndex, S::Bits4) => tile::encode(width, height, bpp, out, |x, y| {
                let index = read_nibble(data, at(x, y));
                u32::from(read_u16(palette, usize::from(index)))
            }),
            (F::ColorIndex, S::Bits8) => tile::encode(width, height, bpp, out, |x, y| {
                let index = data[at(x, y)];
                u32::from(read_u16(palette, usize::from(index)))
            }),
            (format, size) => return Err(ConvertError::Unsupported { format, size }),
        }

        Ok(Texture {
            format,
            width,
            height,
            logical_width: source.width,
            logical_height: source.height,
            data: &self.scratch[..required],
        })
    }
}
