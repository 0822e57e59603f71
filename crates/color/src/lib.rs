//! Colors and the N64 texel encodings.
//!
//! Every decoder returns a plain [`Rgba8`]. Intensity formats replicate the intensity into all
//! three color channels.

use bitos::BitUtils;
use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Rescales `value` from `0..=FROM` into `0..=TO`, rounding to nearest.
#[inline(always)]
pub const fn convert_range<const FROM: u32, const TO: u32>(value: u8) -> u8 {
    ((value as u32 * TO + FROM / 2) / FROM) as u8
}

#[inline(always)]
const fn alpha_bit(set: bool) -> u8 {
    if set { 255 } else { 0 }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    IntoBytes,
    FromBytes,
    Immutable,
    KnownLayout,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    #[inline(always)]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[inline(always)]
    pub const fn gray(intensity: u8, alpha: u8) -> Self {
        Self::new(intensity, intensity, intensity, alpha)
    }

    /// Unpacks a `0xRRGGBBAA` word, the layout of the RDP color registers.
    #[inline(always)]
    pub const fn from_rgba32(word: u32) -> Self {
        let [r, g, b, a] = word.to_be_bytes();
        Self { r, g, b, a }
    }

    #[inline(always)]
    pub const fn to_rgba32(self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    /// Decodes a 5-5-5-1 texel (`RRRRRGGGGGBBBBBA`).
    #[inline(always)]
    pub fn from_rgba5551(value: u16) -> Self {
        Self {
            r: convert_range::<31, 255>(value.bits(11, 16) as u8),
            g: convert_range::<31, 255>(value.bits(6, 11) as u8),
            b: convert_range::<31, 255>(value.bits(1, 6) as u8),
            a: alpha_bit(value.bit(0)),
        }
    }

    #[inline(always)]
    pub fn to_rgba5551(self) -> u16 {
        0u16.with_bits(11, 16, convert_range::<255, 31>(self.r) as u16)
            .with_bits(6, 11, convert_range::<255, 31>(self.g) as u16)
            .with_bits(1, 6, convert_range::<255, 31>(self.b) as u16)
            .with_bit(0, self.a >= 128)
    }

    /// Decodes a 16-bit intensity/alpha texel (`IIIIIIIIAAAAAAAA`).
    #[inline(always)]
    pub fn from_ia16(value: u16) -> Self {
        let [i, a] = value.to_be_bytes();
        Self::gray(i, a)
    }

    /// Decodes an 8-bit intensity/alpha texel (`IIIIAAAA`).
    #[inline(always)]
    pub fn from_ia8(value: u8) -> Self {
        Self::gray(
            convert_range::<15, 255>(value.bits(4, 8)),
            convert_range::<15, 255>(value.bits(0, 4)),
        )
    }

    /// Decodes a 4-bit intensity/alpha texel (`IIIA`).
    #[inline(always)]
    pub fn from_ia4(value: u8) -> Self {
        Self::gray(
            convert_range::<7, 255>(value.bits(1, 4)),
            alpha_bit(value.bit(0)),
        )
    }

    #[inline(always)]
    pub fn from_i8(value: u8) -> Self {
        Self::gray(value, value)
    }

    #[inline(always)]
    pub fn from_i4(value: u8) -> Self {
        let intensity = convert_range::<15, 255>(value.bits(0, 4));
        Self::gray(intensity, intensity)
    }

    /// Channels normalized to `0.0..=1.0`.
    #[inline(always)]
    pub fn to_unorm(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a].map(|c| f32::from(c) / 255.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn convert_range_rounds() {
        // round(v * 255 / 7)
        let expected = [0, 36, 73, 109, 146, 182, 219, 255];
        for (v, e) in expected.into_iter().enumerate() {
            assert_eq!(convert_range::<7, 255>(v as u8), e);
        }

        assert_eq!(convert_range::<31, 255>(31), 255);
        assert_eq!(convert_range::<15, 255>(1), 17);
        assert_eq!(convert_range::<255, 31>(255), 31);
    }

    #[test]
    fn rgba5551() {
        assert_eq!(Rgba8::from_rgba5551(0xF801), Rgba8::new(255, 0, 0, 255));
        assert_eq!(Rgba8::from_rgba5551(0x07C0), Rgba8::new(0, 255, 0, 0));
        assert_eq!(Rgba8::from_rgba5551(0x003E), Rgba8::new(0, 0, 255, 0));

        for value in [0x0000u16, 0xFFFF, 0x1234, 0xABCD, 0x8421] {
            assert_eq!(Rgba8::from_rgba5551(value).to_rgba5551(), value);
        }
    }

    #[test]
    fn intensity_alpha() {
        assert_eq!(Rgba8::from_ia16(0x80FF), Rgba8::new(0x80, 0x80, 0x80, 0xFF));
        assert_eq!(Rgba8::from_ia8(0xF0), Rgba8::new(255, 255, 255, 0));
        assert_eq!(Rgba8::from_ia4(0b0111), Rgba8::new(109, 109, 109, 255));
        assert_eq!(Rgba8::from_ia4(0b1110), Rgba8::new(255, 255, 255, 0));
        assert_eq!(Rgba8::from_i4(0x8), Rgba8::gray(136, 136));
        assert_eq!(Rgba8::from_i8(0x42), Rgba8::gray(0x42, 0x42));
    }

    #[test]
    fn rgba32_word() {
        let color = Rgba8::from_rgba32(0xFF00_80C0);
        assert_eq!(color, Rgba8::new(0xFF, 0x00, 0x80, 0xC0));
        assert_eq!(color.to_rgba32(), 0xFF00_80C0);
        assert_eq!(Rgba8::WHITE.to_unorm(), [1.0; 4]);
    }
}
