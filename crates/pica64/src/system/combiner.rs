//! Color combiner compiler.
//!
//! A [`CombineMode`] describes the RDP combiner equation `(A - B) * C + D` for the color and
//! alpha channels in terms of semantic inputs. [`generate`] canonicalizes it into a
//! [`CombinerId`], where the non-texture inputs are replaced by numbered generic inputs, plus the
//! [`InputMapping`] that resolves them back. [`compile`] derives everything a backend needs to
//! know about an id.

use bitflags::bitflags;
use strum::FromRepr;

use crate::system::gbi::ccmux;

/// Bits of a single combiner field.
const FIELD_BITS: u32 = 3;
/// Bits used by the fields of a channel.
const CHANNEL_BITS: u32 = 4 * FIELD_BITS;
/// Mask of the fields of both channels.
const FIELDS_MASK: u32 = (1 << (2 * CHANNEL_BITS)) - 1;
/// Mask of the alpha channel fields.
const ALPHA_MASK: u32 = ((1 << CHANNEL_BITS) - 1) << CHANNEL_BITS;

/// Maximum number of generic inputs.
pub const MAX_INPUTS: usize = 4;

/// A semantic combiner input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromRepr)]
#[repr(u8)]
pub enum Input {
    #[default]
    Zero = 0,
    Texel0 = 1,
    Texel1 = 2,
    Prim = 3,
    Shade = 4,
    Env = 5,
    Texel0Alpha = 6,
    LodFraction = 7,
}

impl Input {
    /// Maps a color or alpha mux selector. Selectors without an equivalent become [`Input::Zero`].
    pub fn from_mux(mux: u32) -> Self {
        match mux {
            ccmux::TEXEL0 => Self::Texel0,
            ccmux::TEXEL1 => Self::Texel1,
            ccmux::PRIMITIVE => Self::Prim,
            ccmux::SHADE => Self::Shade,
            ccmux::ENVIRONMENT => Self::Env,
            ccmux::TEXEL0_ALPHA => Self::Texel0Alpha,
            ccmux::LOD_FRACTION => Self::LodFraction,
            _ => Self::Zero,
        }
    }

    /// Whether this input is fed through a generic input rather than a texture.
    pub fn is_generic(self) -> bool {
        matches!(
            self,
            Self::Prim | Self::Shade | Self::Env | Self::LodFraction
        )
    }
}

/// An operand of a canonical combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromRepr)]
#[repr(u8)]
pub enum Operand {
    #[default]
    Zero = 0,
    Input1 = 1,
    Input2 = 2,
    Input3 = 3,
    Input4 = 4,
    Texel0 = 5,
    Texel0Alpha = 6,
    Texel1 = 7,
}

impl Operand {
    /// Index of the generic input this operand reads, if any.
    pub fn input_index(self) -> Option<usize> {
        match self {
            Self::Input1 | Self::Input2 | Self::Input3 | Self::Input4 => Some(self as usize - 1),
            _ => None,
        }
    }

    fn generic(index: usize) -> Self {
        match index {
            0 => Self::Input1,
            1 => Self::Input2,
            2 => Self::Input3,
            _ => Self::Input4,
        }
    }
}

bitflags! {
    /// Options that accompany a combiner.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CombinerFlags: u32 {
        const ALPHA        = 1 << 24;
        const FOG          = 1 << 25;
        const TEXTURE_EDGE = 1 << 26;
        const NOISE        = 1 << 27;
    }
}

/// A channel of the combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Color = 0,
    Alpha = 1,
}

impl Channel {
    pub const ALL: [Self; 2] = [Self::Color, Self::Alpha];
}

#[inline(always)]
fn field(word: u32, channel: usize, index: usize) -> u8 {
    ((word >> (channel as u32 * CHANNEL_BITS + index as u32 * FIELD_BITS)) & 0b111) as u8
}

#[inline(always)]
fn pack(fields: [[u8; 4]; 2]) -> u32 {
    let mut word = 0;
    for (channel, values) in fields.into_iter().enumerate() {
        for (index, value) in values.into_iter().enumerate() {
            word |= u32::from(value) << (channel as u32 * CHANNEL_BITS + index as u32 * FIELD_BITS);
        }
    }

    word
}

/// A combiner equation over semantic inputs, plus [`CombinerFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CombineMode(pub u32);

impl CombineMode {
    pub fn new(color: [Input; 4], alpha: [Input; 4]) -> Self {
        Self(pack([color.map(|i| i as u8), alpha.map(|i| i as u8)]))
    }

    /// Builds a mode from RDP mux selectors, ordered `[a, b, c, d]`.
    pub fn from_muxes(color: [u32; 4], alpha: [u32; 4]) -> Self {
        Self::new(color.map(Input::from_mux), alpha.map(Input::from_mux))
    }

    pub fn with_flags(self, flags: CombinerFlags) -> Self {
        Self(self.0 | flags.bits())
    }

    /// The mode with its alpha equation cleared.
    pub fn without_alpha(self) -> Self {
        Self(self.0 & !ALPHA_MASK)
    }

    pub fn flags(self) -> CombinerFlags {
        CombinerFlags::from_bits_truncate(self.0)
    }

    pub fn inputs(self, channel: Channel) -> [Input; 4] {
        std::array::from_fn(|i| {
            Input::from_repr(field(self.0, channel as usize, i)).unwrap_or_default()
        })
    }
}

/// A canonical combiner equation over [`Operand`]s, plus [`CombinerFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CombinerId(pub u32);

impl CombinerId {
    pub fn flags(self) -> CombinerFlags {
        CombinerFlags::from_bits_truncate(self.0)
    }

    pub fn operands(self, channel: Channel) -> [Operand; 4] {
        std::array::from_fn(|i| {
            Operand::from_repr(field(self.0, channel as usize, i)).unwrap_or_default()
        })
    }

    /// Whether both channels use the same equation.
    pub fn color_alpha_same(self) -> bool {
        (self.0 & 0xFFF) == ((self.0 >> CHANNEL_BITS) & 0xFFF)
    }
}

/// The semantic input behind each generic input, per channel.
pub type InputMapping = [[Input; MAX_INPUTS]; 2];

/// Canonicalizes a combine mode.
///
/// A channel where `A == B` or `C` is zero only depends on `D`, so `A`, `B` and `C` are zeroed.
/// Generic inputs are numbered per channel in order of first use.
pub fn generate(mode: CombineMode) -> (CombinerId, InputMapping) {
    let mut mapping = InputMapping::default();
    let mut fields = [[0u8; 4]; 2];

    for channel in Channel::ALL {
        let mut inputs = mode.inputs(channel);
        if inputs[0] == inputs[1] || inputs[2] == Input::Zero {
            inputs[0] = Input::Zero;
            inputs[1] = Input::Zero;
            inputs[2] = Input::Zero;
        }

        let map = &mut mapping[channel as usize];
        let mut next = 0;
        for (index, input) in inputs.into_iter().enumerate() {
            let operand = match input {
                Input::Zero => Operand::Zero,
                Input::Texel0 => Operand::Texel0,
                Input::Texel1 => Operand::Texel1,
                Input::Texel0Alpha => Operand::Texel0Alpha,
                Input::Prim | Input::Shade | Input::Env | Input::LodFraction => {
                    let slot = match map[..next].iter().position(|&i| i == input) {
                        Some(slot) => slot,
                        None => {
                            map[next] = input;
                            next += 1;
                            next - 1
                        }
                    };

                    Operand::generic(slot)
                }
            };

            fields[channel as usize][index] = operand as u8;
        }
    }

    let flags = mode.0 & !FIELDS_MASK;
    (CombinerId(flags | pack(fields)), mapping)
}

/// The simplest form a channel equation reduces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `D`
    Single,
    /// `A * C`
    Multiply,
    /// `(A - B) * C + B`, an interpolation between `B` and `A`.
    Mix,
    /// `(A - B) * C + D`
    Full,
}

/// Properties of a [`CombinerId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CombinerFeatures {
    pub operands: [[Operand; 4]; 2],
    pub flags: CombinerFlags,
    pub used_textures: [bool; 2],
    /// Highest generic input used.
    pub num_inputs: u8,
    pub single: [bool; 2],
    pub multiply: [bool; 2],
    pub mix: [bool; 2],
    pub color_alpha_same: bool,
}

pub fn compile(id: CombinerId) -> CombinerFeatures {
    let operands = [id.operands(Channel::Color), id.operands(Channel::Alpha)];

    let mut used_textures = [false; 2];
    let mut num_inputs = 0;
    for operand in operands.iter().flatten().copied() {
        if let Some(index) = operand.input_index() {
            num_inputs = num_inputs.max(index as u8 + 1);
        }

        match operand {
            Operand::Texel0 | Operand::Texel0Alpha => used_textures[0] = true,
            Operand::Texel1 => used_textures[1] = true,
            _ => (),
        }
    }

    let single = operands.map(|[_, _, c, _]| c == Operand::Zero);
    let multiply = operands.map(|[_, b, _, d]| b == Operand::Zero && d == Operand::Zero);
    let mix = operands.map(|[_, b, _, d]| b == d);

    CombinerFeatures {
        operands,
        flags: id.flags(),
        used_textures,
        num_inputs,
        single,
        multiply,
        mix,
        color_alpha_same: id.color_alpha_same(),
    }
}

impl CombinerFeatures {
    pub fn shape(&self, channel: Channel) -> Shape {
        let c = channel as usize;
        if self.single[c] {
            Shape::Single
        } else if self.multiply[c] {
            Shape::Multiply
        } else if self.mix[c] {
            Shape::Mix
        } else {
            Shape::Full
        }
    }

    pub fn uses_texture(&self) -> bool {
        self.used_textures[0] || self.used_textures[1]
    }

    /// Rebuilds a combine mode equivalent to the compiled one.
    pub fn to_mode(&self, mapping: &InputMapping) -> CombineMode {
        let inputs = std::array::from_fn::<_, 2, _>(|channel| {
            self.operands[channel].map(|operand| match operand {
                Operand::Zero => Input::Zero,
                Operand::Texel0 => Input::Texel0,
                Operand::Texel0Alpha => Input::Texel0Alpha,
                Operand::Texel1 => Input::Texel1,
                generic => generic
                    .input_index()
                    .map(|index| mapping[channel][index])
                    .unwrap_or_default(),
            })
        });

        CombineMode::new(inputs[0], inputs[1]).with_flags(self.flags)
    }
}

/// A combine mode together with everything derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Combiner {
    pub mode: CombineMode,
    pub id: CombinerId,
    pub mapping: InputMapping,
    pub features: CombinerFeatures,
}

impl Combiner {
    pub fn new(mode: CombineMode) -> Self {
        let (id, mapping) = generate(mode);
        Self {
            mode,
            id,
            mapping,
            features: compile(id),
        }
    }

    /// Whether a generic input of either channel reads `input`.
    pub fn uses(&self, input: Input) -> bool {
        let used = usize::from(self.features.num_inputs);
        self.mapping
            .iter()
            .any(|channel| channel[..used].contains(&input))
    }
}

#[cfg(test)]
mod test {
    use std::fmt::Write;

    use super::*;
    use crate::system::gbi::{acmux, ccmux};

    fn mode(color: [u32; 4], alpha: [u32; 4]) -> CombineMode {
        CombineMode::from_muxes(color, alpha)
    }

    #[test]
    fn mux_mapping() {
        assert_eq!(Input::from_mux(ccmux::TEXEL0_ALPHA), Input::Texel0Alpha);
        assert_eq!(Input::from_mux(ccmux::LOD_FRACTION), Input::LodFraction);
        assert_eq!(Input::from_mux(ccmux::ONE), Input::Zero);
        assert_eq!(Input::from_mux(ccmux::COMBINED), Input::Zero);
        assert_eq!(Input::from_mux(acmux::ZERO), Input::Zero);
    }

    #[test]
    fn canonicalizes_degenerate_channels() {
        // (prim - prim) * shade + env
        let (id, mapping) = generate(CombineMode::new(
            [Input::Prim, Input::Prim, Input::Shade, Input::Env],
            [Input::Texel0, Input::Shade, Input::Zero, Input::Prim],
        ));

        let features = compile(id);
        assert_eq!(
            features.operands[0],
            [Operand::Zero, Operand::Zero, Operand::Zero, Operand::Input1]
        );
        assert_eq!(mapping[0], [Input::Env, Input::Zero, Input::Zero, Input::Zero]);
        assert_eq!(
            features.operands[1],
            [Operand::Zero, Operand::Zero, Operand::Zero, Operand::Input1]
        );
        assert_eq!(mapping[1][0], Input::Prim);
        assert_eq!(features.shape(Channel::Color), Shape::Single);
        assert!(!features.uses_texture());
    }

    #[test]
    fn numbers_inputs_in_order_of_use() {
        let (id, mapping) = generate(CombineMode::new(
            [Input::Env, Input::Prim, Input::Texel0, Input::Prim],
            [Input::Zero; 4],
        ));

        let features = compile(id);
        assert_eq!(
            features.operands[0],
            [
                Operand::Input1,
                Operand::Input2,
                Operand::Texel0,
                Operand::Input2
            ]
        );
        assert_eq!(mapping[0][..2], [Input::Env, Input::Prim]);
        assert_eq!(features.num_inputs, 2);
        assert_eq!(features.used_textures, [true, false]);
        assert_eq!(features.shape(Channel::Color), Shape::Mix);
        assert_eq!(features.shape(Channel::Alpha), Shape::Single);
    }

    #[test]
    fn flags_survive_generation() {
        let flags = CombinerFlags::ALPHA | CombinerFlags::FOG;
        let mode = CombineMode::new([Input::Zero; 4], [Input::Zero; 4]).with_flags(flags);
        let (id, _) = generate(mode);
        assert_eq!(id.flags(), flags);
        assert_eq!(compile(id).flags, flags);
    }

    #[test]
    fn without_alpha_clears_alpha_fields() {
        let mode = mode(
            [ccmux::TEXEL0, 0, ccmux::SHADE, 0],
            [acmux::TEXEL0, 0, acmux::SHADE, 0],
        );
        assert_eq!(mode.without_alpha().inputs(Channel::Alpha), [Input::Zero; 4]);
        assert_eq!(
            mode.without_alpha().inputs(Channel::Color),
            mode.inputs(Channel::Color)
        );
    }

    #[test]
    fn round_trips_through_features() {
        // every combination of inputs for the color channel, with a varying alpha channel
        for value in 0..(1u32 << CHANNEL_BITS) {
            let alpha = value.rotate_left(5) & 0xFFF;
            let mode = CombineMode(value | alpha << CHANNEL_BITS)
                .with_flags(CombinerFlags::from_bits_truncate(value << 20));

            let combiner = Combiner::new(mode);
            let rebuilt = combiner.features.to_mode(&combiner.mapping);
            let again = Combiner::new(rebuilt);

            assert_eq!(again.id, combiner.id, "mode {:#x}", mode.0);
            assert_eq!(again.features, combiner.features);
            for channel in Channel::ALL {
                assert_eq!(
                    again.features.shape(channel),
                    combiner.features.shape(channel)
                );
            }
        }
    }

    #[test]
    fn uses_only_mapped_inputs() {
        let combiner = Combiner::new(mode(
            [ccmux::TEXEL0, 0, ccmux::SHADE, 0],
            [acmux::TEXEL0, 0, acmux::PRIMITIVE, 0],
        ));

        assert!(combiner.uses(Input::Shade));
        assert!(combiner.uses(Input::Prim));
        assert!(!combiner.uses(Input::Env));
    }

    #[test]
    fn feature_table() {
        let modes = [
            (
                "shade",
                mode([0, 0, 0, ccmux::SHADE], [0, 0, 0, acmux::SHADE]),
            ),
            (
                "primitive",
                mode([0, 0, 0, ccmux::PRIMITIVE], [0, 0, 0, acmux::PRIMITIVE]),
            ),
            (
                "decalrgba",
                mode([0, 0, 0, ccmux::TEXEL0], [0, 0, 0, acmux::TEXEL0]),
            ),
            (
                "modulatergba",
                mode(
                    [ccmux::TEXEL0, 0, ccmux::SHADE, 0],
                    [acmux::TEXEL0, 0, acmux::SHADE, 0],
                ),
            ),
            (
                "blendrgba",
                mode(
                    [ccmux::TEXEL0, ccmux::SHADE, ccmux::TEXEL0_ALPHA, ccmux::SHADE],
                    [0, 0, 0, acmux::SHADE],
                ),
            ),
            (
                "fadea",
                mode(
                    [ccmux::TEXEL0, 0, ccmux::ENVIRONMENT, 0],
                    [acmux::TEXEL0, 0, acmux::ENVIRONMENT, 0],
                ),
            ),
            (
                "blendpe",
                mode(
                    [
                        ccmux::PRIMITIVE,
                        ccmux::ENVIRONMENT,
                        ccmux::TEXEL0,
                        ccmux::ENVIRONMENT,
                    ],
                    [acmux::TEXEL0, 0, acmux::SHADE, 0],
                ),
            ),
            (
                "full",
                mode(
                    [ccmux::TEXEL1, ccmux::PRIMITIVE, ccmux::LOD_FRACTION, ccmux::SHADE],
                    [acmux::TEXEL1, acmux::TEXEL0, acmux::PRIMITIVE, acmux::ENVIRONMENT],
                ),
            ),
        ];

        let mut table = String::new();
        for (name, mode) in modes {
            let combiner = Combiner::new(mode);
            let f = combiner.features;
            writeln!(
                table,
                "{name}: mode={:06x} id={:06x} inputs={} textures={:?} shapes={:?}/{:?} same={}",
                mode.0,
                combiner.id.0,
                f.num_inputs,
                f.used_textures,
                f.shape(Channel::Color),
                f.shape(Channel::Alpha),
                f.color_alpha_same,
            )
            .unwrap();
            writeln!(table, "    mapping={:?}", combiner.mapping).unwrap();
        }

        insta::assert_snapshot!("combiner_features", table);
    }
}
