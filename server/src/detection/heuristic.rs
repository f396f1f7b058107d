//! Local edge-density heuristic
//!
//! Needs no network and always produces a mask:
//! 1. grayscale and downscale to a working width
//! 2. Sobel gradient magnitude, keep the strongest quarter of edge pixels
//! 3. project strong edges onto rows and columns; dense rows/columns bound
//!    the surface
//! 4. pad the bounding box and feather its edges
//!
//! When the box is implausibly small or large, a centred rectangle with low
//! quality is returned instead. The mask stays at working resolution; the
//! overlay engine resizes it to the image.

use std::time::Duration;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::debug;

use crate::compose::aspect_compatible;
use crate::config::DetectionConfig;
use crate::imagery::SourceImage;

use super::detector::SurfaceDetector;
use super::types::{Detection, DetectorError, DetectorKind, PixelRect, paint_rects};

pub const DEFAULT_WORKING_WIDTH: u32 = 320;

/// Share of a row/column that must be strong edges for it to count
const DENSITY_THRESHOLD: f32 = 0.05;
/// Frame border ignored by the projection (fraction of each side)
const BORDER_FRACTION: f32 = 0.02;
/// Bounding-box padding as a fraction of its size
const PADDING_FRACTION: f32 = 0.10;
/// Minimum padding in source-image pixels
const MIN_PADDING_PX: f32 = 20.0;
const FEATHER_SIGMA: f32 = 2.0;
const FALLBACK_QUALITY: f32 = 0.2;
/// Largest aspect change the downscale may introduce
const MAX_ASPECT_DRIFT: f32 = 0.005;

/// Edge/projection window finder that runs entirely on the CPU
#[derive(Debug, Clone)]
pub struct LocalHeuristicDetector {
    working_width: u32,
    budget: Duration,
    min_area_ratio: f32,
    max_area_ratio: f32,
}

impl LocalHeuristicDetector {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            working_width: DEFAULT_WORKING_WIDTH,
            budget: config.local_budget,
            min_area_ratio: config.min_area_ratio,
            max_area_ratio: config.max_area_ratio,
        }
    }

    pub fn with_working_width(mut self, width: u32) -> Self {
        self.working_width = width.max(8);
        self
    }

    /// Processing budget the orchestrator grants this detector
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run detection synchronously; call from a blocking context
    pub fn detect_blocking(&self, image: &SourceImage) -> Result<Detection, DetectorError> {
        let gray = imageops::grayscale(image.pixels());
        let (gray, scale) = match self.working_size(gray.width(), gray.height()) {
            Some((w, h)) => (
                imageops::resize(&gray, w, h, FilterType::Triangle),
                w as f32 / gray.width() as f32,
            ),
            None => (gray, 1.0),
        };
        let (width, height) = gray.dimensions();

        let (rect, quality) = match self.locate(&gray, scale) {
            Some(found) => found,
            None => {
                debug!("No edge-dense region in {}, using centred fallback", image.id());
                (centre_rect(width, height), FALLBACK_QUALITY)
            }
        };

        let alpha = imageops::blur(&paint_rects(width, height, &[rect]), FEATHER_SIGMA);
        Ok(Detection { alpha, quality })
    }

    /// Downscaled size, or `None` to work at full resolution
    ///
    /// Thin images whose rounded height would skew the aspect ratio are kept
    /// at full size so the mask always reconciles with the source.
    fn working_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width <= self.working_width {
            return None;
        }
        let scale = self.working_width as f32 / width as f32;
        let scaled = ((height as f32 * scale).round() as u32).max(1);
        aspect_compatible((self.working_width, scaled), (width, height), MAX_ASPECT_DRIFT)
            .then_some((self.working_width, scaled))
    }

    /// Bounding box of the edge-dense region and its quality, if plausible
    fn locate(&self, gray: &GrayImage, scale: f32) -> Option<(PixelRect, f32)> {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return None;
        }

        let magnitude = sobel_magnitude(gray);
        let mut nonzero: Vec<u16> = magnitude.iter().copied().filter(|&m| m > 0).collect();
        if nonzero.is_empty() {
            return None;
        }
        let cut = nonzero.len() * 3 / 4;
        let (_, threshold, _) = nonzero.select_nth_unstable(cut);
        let threshold = *threshold;
        let strong = |x: u32, y: u32| magnitude[(y * width + x) as usize] >= threshold;

        let border_x = ((width as f32 * BORDER_FRACTION).round() as u32).max(1);
        let border_y = ((height as f32 * BORDER_FRACTION).round() as u32).max(1);
        let (x_lo, x_hi) = (border_x, width.saturating_sub(border_x));
        let (y_lo, y_hi) = (border_y, height.saturating_sub(border_y));
        if x_lo >= x_hi || y_lo >= y_hi {
            return None;
        }

        let row_min = ((x_hi - x_lo) as f32 * DENSITY_THRESHOLD).max(1.0) as usize;
        let col_min = ((y_hi - y_lo) as f32 * DENSITY_THRESHOLD).max(1.0) as usize;

        let dense_rows: Vec<u32> = (y_lo..y_hi)
            .filter(|&y| (x_lo..x_hi).filter(|&x| strong(x, y)).count() >= row_min)
            .collect();
        let dense_cols: Vec<u32> = (x_lo..x_hi)
            .filter(|&x| (y_lo..y_hi).filter(|&y| strong(x, y)).count() >= col_min)
            .collect();

        let (&top, &bottom) = (dense_rows.first()?, dense_rows.last()?);
        let (&left, &right) = (dense_cols.first()?, dense_cols.last()?);

        let bbox = PixelRect {
            x: left as f32,
            y: top as f32,
            width: (right - left + 1) as f32,
            height: (bottom - top + 1) as f32,
        };
        let pad = (bbox.width.max(bbox.height) * PADDING_FRACTION).max(MIN_PADDING_PX * scale);
        let rect = bbox.padded(pad, width, height);

        let area_ratio = rect.area() / (width * height) as f32;
        if area_ratio < self.min_area_ratio || area_ratio > self.max_area_ratio {
            debug!("Edge region covers {:.1}% of frame, discarding", area_ratio * 100.0);
            return None;
        }

        let mut inside = 0usize;
        let mut total = 0usize;
        for y in y_lo..y_hi {
            for x in x_lo..x_hi {
                if strong(x, y) {
                    total += 1;
                    if x >= left && x <= right && y >= top && y <= bottom {
                        inside += 1;
                    }
                }
            }
        }
        let share = if total == 0 {
            0.0
        } else {
            inside as f32 / total as f32
        };

        Some((rect, 0.3 + 0.4 * share))
    }
}

/// Central 60% of the frame
fn centre_rect(width: u32, height: u32) -> PixelRect {
    PixelRect {
        x: width as f32 * 0.2,
        y: height as f32 * 0.2,
        width: width as f32 * 0.6,
        height: height as f32 * 0.6,
    }
}

/// |Gx| + |Gy| of the 3x3 Sobel operator; border pixels are zero
fn sobel_magnitude(gray: &GrayImage) -> Vec<u16> {
    let (width, height) = gray.dimensions();
    let raw = gray.as_raw();
    let px = |x: u32, y: u32| raw[(y * width + x) as usize] as i32;
    let mut out = vec![0u16; (width * height) as usize];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = px(x + 1, y - 1) + 2 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2 * px(x - 1, y)
                - px(x - 1, y + 1);
            let gy = px(x - 1, y + 1) + 2 * px(x, y + 1) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2 * px(x, y - 1)
                - px(x + 1, y - 1);
            out[(y * width + x) as usize] = (gx.unsigned_abs() + gy.unsigned_abs()) as u16;
        }
    }
    out
}

#[async_trait]
impl SurfaceDetector for LocalHeuristicDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::LocalHeuristic
    }

    fn timeout(&self) -> Duration {
        self.budget
    }

    async fn detect(&self, image: &SourceImage) -> Result<Detection, DetectorError> {
        let detector = self.clone();
        let image = image.clone();
        tokio::task::spawn_blocking(move || detector.detect_blocking(&image))
            .await
            .map_err(|e| DetectorError::Failed(format!("heuristic task failed: {}", e)))?
    }
}
