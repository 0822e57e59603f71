//! Screen presets and stereoscopic projection.

use glam::{Mat4, Vec4};
use pica64::modules::render::Rect;
use serde::Deserialize;

use crate::gpu::Target;

/// Strengths of the stereoscopic effect.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    /// Horizontal shift per unit of clip depth at full slider.
    pub depth: f32,
    /// Clip depth, relative to `w`, that appears at the screen plane.
    pub pop: f32,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            depth: 0.05,
            pop: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub fn target(self) -> Target {
        match self {
            Self::Left => Target::TopLeft,
            Self::Right => Target::TopRight,
        }
    }

    fn sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

/// The passes a frame on the top screen takes for a 3D slider position.
pub fn eyes(slider: f32) -> &'static [Eye] {
    if slider > 0.0 {
        &[Eye::Left, Eye::Right]
    } else {
        &[Eye::Left]
    }
}

/// Tilt applied after the projection for an eye: `x' = x + k * (z - pop * w)` with
/// `k = ±slider * depth`. It is the identity when the slider is off.
pub fn tilt(eye: Eye, slider: f32, config: StereoConfig) -> Mat4 {
    let k = eye.sign() * slider * config.depth;
    Mat4::from_cols(
        Vec4::X,
        Vec4::Y,
        Vec4::Z + Vec4::X * k,
        Vec4::W - Vec4::X * (k * config.pop),
    )
}

/// Transform from game clip space to PICA clip space: horizontal aspect correction, depth
/// remapped from `-1..1` to `-1..0` and a quarter turn for the portrait framebuffer.
pub fn preset(aspect: f32) -> Mat4 {
    let aspect = Mat4::from_scale(glam::vec3(aspect, 1.0, 1.0));
    let depth = Mat4::from_cols(
        Vec4::X,
        Vec4::Y,
        Vec4::Z * 0.5,
        Vec4::W - Vec4::Z * 0.5,
    );
    let rotation = Mat4::from_cols(Vec4::Y, -Vec4::X, Vec4::Z, Vec4::W);

    rotation * depth * aspect
}

/// Maps a rectangle of a landscape screen `height` pixels tall to the portrait framebuffer.
pub fn rotate(rect: Rect, height: f32) -> Rect {
    Rect {
        x: height - rect.y - rect.height,
        y: rect.x,
        width: rect.height,
        height: rect.width,
    }
}

#[cfg(test)]
mod test {
    use glam::{Vec4Swizzles, vec4};

    use super::*;

    #[test]
    fn no_tilt_without_slider() {
        let config = StereoConfig::default();
        assert_eq!(tilt(Eye::Left, 0.0, config), Mat4::IDENTITY);
        assert_eq!(eyes(0.0), &[Eye::Left]);
        assert_eq!(eyes(0.5).len(), 2);
    }

    #[test]
    fn eyes_shift_in_opposite_directions() {
        let config = StereoConfig {
            depth: 0.1,
            pop: 0.5,
        };

        let far = vec4(0.0, 0.0, 1.0, 1.0);
        let left = tilt(Eye::Left, 1.0, config) * far;
        let right = tilt(Eye::Right, 1.0, config) * far;
        assert!((left.x + 0.05).abs() < 1e-6);
        assert!((right.x - 0.05).abs() < 1e-6);
        assert_eq!(left.yzw(), far.yzw());

        // geometry at the pop depth sits on the screen plane
        let screen = vec4(0.3, 0.0, 0.5, 1.0);
        assert!(((tilt(Eye::Right, 1.0, config) * screen).x - 0.3).abs() < 1e-6);
    }

    #[test]
    fn preset_maps_into_pica_clip_space() {
        let preset = preset(0.8);

        // right edge of the screen, near plane
        let v = preset * vec4(1.0, 0.0, -1.0, 1.0);
        assert!((v.x - 0.0).abs() < 1e-6);
        assert!((v.y - 0.8).abs() < 1e-6);
        assert!((v.z + 1.0).abs() < 1e-6);

        // top edge, far plane
        let v = preset * vec4(0.0, 1.0, 1.0, 1.0);
        assert!((v.x + 1.0).abs() < 1e-6);
        assert!(v.z.abs() < 1e-6);
    }

    #[test]
    fn rotates_rectangles() {
        let rect = Rect {
            x: 10.0,
            y: 20.0,
            width: 300.0,
            height: 200.0,
        };

        assert_eq!(
            rotate(rect, 240.0),
            Rect {
                x: 20.0,
                y: 10.0,
                width: 200.0,
                height: 300.0
            }
        );

        let full = Rect {
            x: 0.0,
            y: 0.0,
            width: 400.0,
            height: 240.0,
        };

        assert_eq!(
            rotate(full, 240.0),
            Rect {
                x: 0.0,
                y: 0.0,
                width: 240.0,
                height: 400.0
            }
        );
    }
}
