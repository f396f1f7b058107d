//! Minimum-quality predicate for candidate masks

use crate::compose::aspect_compatible;
use crate::config::DetectionConfig;
use crate::imagery::DetectionMask;

/// Why a candidate mask was not accepted
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Buffer does not match its dimensions, or the frame is empty
    Malformed,
    /// Aspect ratio too far from the image to resize without distortion
    Irreconcilable {
        mask: (u32, u32),
        image: (u32, u32),
    },
    /// Covers less than the configured minimum
    TooSmall(f32),
    /// Covers more than the configured maximum
    TooLarge(f32),
}

impl Rejection {
    /// Structural problems, as opposed to a merely implausible area
    pub fn is_structural(&self) -> bool {
        matches!(self, Rejection::Malformed | Rejection::Irreconcilable { .. })
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Malformed => write!(f, "malformed mask buffer"),
            Rejection::Irreconcilable { mask, image } => write!(
                f,
                "mask {}x{} cannot be reconciled with image {}x{}",
                mask.0, mask.1, image.0, image.1
            ),
            Rejection::TooSmall(ratio) => write!(f, "covers only {:.1}% of frame", ratio * 100.0),
            Rejection::TooLarge(ratio) => write!(f, "covers {:.1}% of frame", ratio * 100.0),
        }
    }
}

/// Area and shape bounds a mask must satisfy to be accepted
#[derive(Debug, Clone, Copy)]
pub struct MaskQuality {
    pub min_area_ratio: f32,
    pub max_area_ratio: f32,
    pub aspect_tolerance: f32,
}

impl Default for MaskQuality {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

impl MaskQuality {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            min_area_ratio: config.min_area_ratio,
            max_area_ratio: config.max_area_ratio,
            aspect_tolerance: config.aspect_tolerance,
        }
    }

    /// Whether a coverage ratio is inside the accepted band
    pub fn area_ok(&self, coverage: f32) -> bool {
        coverage >= self.min_area_ratio && coverage <= self.max_area_ratio
    }

    /// Judge a candidate mask against the image it was produced for
    pub fn check(&self, mask: &DetectionMask, image_w: u32, image_h: u32) -> Result<(), Rejection> {
        if !mask.is_well_formed() {
            return Err(Rejection::Malformed);
        }
        if !aspect_compatible(
            (mask.width(), mask.height()),
            (image_w, image_h),
            self.aspect_tolerance,
        ) {
            return Err(Rejection::Irreconcilable {
                mask: (mask.width(), mask.height()),
                image: (image_w, image_h),
            });
        }

        let coverage = mask.coverage();
        if coverage < self.min_area_ratio {
            return Err(Rejection::TooSmall(coverage));
        }
        if coverage > self.max_area_ratio {
            return Err(Rejection::TooLarge(coverage));
        }
        Ok(())
    }
}
