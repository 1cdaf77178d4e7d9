//! RGB color value with hue/saturation/brightness conversion.
//!
//! The color-transition macros interpolate in HSB space so the animation
//! moves through perceptually sensible intermediate colors rather than
//! straight-line RGB blends.

use serde::{Deserialize, Serialize};

/// An RGB triple as written to the robot's main LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to `(hue, saturation, brightness)`, each in `[0, 1]`.
    pub fn to_hsb(self) -> (f32, f32, f32) {
        let r = f32::from(self.r) / 255.0;
        let g = f32::from(self.g) / 255.0;
        let b = f32::from(self.b) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let brightness = max;
        let saturation = if max > 0.0 { delta / max } else { 0.0 };

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            (((g - b) / delta).rem_euclid(6.0)) / 6.0
        } else if max == g {
            (((b - r) / delta) + 2.0) / 6.0
        } else {
            (((r - g) / delta) + 4.0) / 6.0
        };

        (hue, saturation, brightness)
    }

    /// Build a color from `(hue, saturation, brightness)`, each clamped to
    /// `[0, 1]`.
    pub fn from_hsb(hue: f32, saturation: f32, brightness: f32) -> Self {
        let h = crate::clamp(hue, 0.0, 1.0) * 6.0;
        let s = crate::clamp(saturation, 0.0, 1.0);
        let v = crate::clamp(brightness, 0.0, 1.0);

        let c = v * s;
        let x = c * (1.0 - ((h % 2.0) - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Self {
            r: ((r + m) * 255.0).round() as u8,
            g: ((g + m) * 255.0).round() as u8,
            b: ((b + m) * 255.0).round() as u8,
        }
    }
}
