//! Procedural covering patterns
//!
//! Patterns are rasterized directly at the target size. Shading comes from the
//! pattern geometry (slat outlines, gaps, highlights) and a material-specific
//! noise term derived from pixel position only, so the same inputs always give
//! the same pixels.

use std::f32::consts::TAU;

use image::{Rgb as Pixel, RgbImage};

use crate::covering::{Material, PatternKind, Rgb};

/// Horizontal slat and gap heights
const HORIZONTAL_SLAT: (u32, u32) = (8, 2);
/// Vertical slat and gap widths
const VERTICAL_SLAT: (u32, u32) = (12, 2);
/// Roman pleat and fold-shadow heights
const ROMAN_PLEAT: (u32, u32) = (20, 5);
const ROLLER_LINE_SPACING: u32 = 4;
const ROLLER_HEAD_RAIL: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tone {
    Base,
    Darken(f32),
    Lighten(f32),
}

impl Tone {
    fn apply(self, channel: f32) -> f32 {
        match self {
            Tone::Base => channel,
            Tone::Darken(f) => channel * (1.0 - f),
            Tone::Lighten(f) => channel + (255.0 - channel) * f,
        }
    }
}

/// Shade along one axis of repeating slats separated by gaps
fn slat_tone(pos: u32, (slat, gap): (u32, u32)) -> Tone {
    let p = pos % (slat + gap);
    if p >= slat {
        Tone::Darken(0.5)
    } else if p == 0 || p == slat - 1 {
        Tone::Darken(0.2)
    } else if p == slat / 2 {
        Tone::Lighten(0.3)
    } else {
        Tone::Base
    }
}

fn pattern_tone(pattern: PatternKind, x: u32, y: u32) -> Tone {
    match pattern {
        PatternKind::Horizontal => slat_tone(y, HORIZONTAL_SLAT),
        PatternKind::Vertical => slat_tone(x, VERTICAL_SLAT),
        PatternKind::Roller => {
            if y < ROLLER_HEAD_RAIL {
                Tone::Darken(0.3)
            } else if y % ROLLER_LINE_SPACING == 0 {
                Tone::Darken(0.08)
            } else {
                Tone::Base
            }
        }
        PatternKind::Roman => {
            let (pleat, fold) = ROMAN_PLEAT;
            let p = y % (pleat + fold);
            if p >= pleat {
                Tone::Darken(0.3)
            } else if p < pleat / 5 {
                Tone::Lighten(0.2)
            } else {
                Tone::Base
            }
        }
        PatternKind::Flat => Tone::Base,
    }
}

/// Integer mix of a pixel position
fn position_hash(x: u32, y: u32) -> u32 {
    let mut h = x.wrapping_mul(0x8da6_b343) ^ y.wrapping_mul(0xd816_3841);
    h ^= h >> 13;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 16;
    h
}

/// Uniform value in `-amplitude..=amplitude`
fn spread(hash: u32, amplitude: u32) -> f32 {
    (hash % (2 * amplitude + 1)) as f32 - amplitude as f32
}

fn material_noise(material: Material, x: u32, y: u32, width: u32) -> f32 {
    match material {
        Material::Fabric => spread(position_hash(x, y), 5),
        Material::Wood => spread(position_hash(x, 0), 8),
        Material::Metal => (x as f32 / width.max(1) as f32 * TAU).sin() * 3.0,
        Material::Plastic => spread(position_hash(x, y), 2),
    }
}

/// Rasterize a pattern in the given material and color
pub fn render_pattern(
    pattern: PatternKind,
    material: Material,
    color: Rgb,
    width: u32,
    height: u32,
) -> RgbImage {
    let base = color.0.map(|c| c.clamp(0.0, 1.0) * 255.0);

    RgbImage::from_fn(width, height, |x, y| {
        let tone = pattern_tone(pattern, x, y);
        let noise = material_noise(material, x, y, width);
        Pixel(base.map(|c| (tone.apply(c) + noise).round().clamp(0.0, 255.0) as u8))
    })
}
