//! Detection-related types and error definitions

use std::time::Duration;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur inside a detector adapter
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No surface found")]
    NoSurface,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Mask rejected: {0}")]
    Rejected(String),

    #[error("Detector failed: {0}")]
    Failed(String),
}

/// Which detector produced a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    CloudVision,
    GenerativeAi,
    LocalHeuristic,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::CloudVision => "cloud-vision",
            DetectorKind::GenerativeAi => "generative-ai",
            DetectorKind::LocalHeuristic => "local-heuristic",
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw adapter output, before the orchestrator tags and judges it
#[derive(Debug, Clone)]
pub struct Detection {
    /// Soft-alpha mask (0-255), ideally at image resolution
    pub alpha: GrayImage,
    /// Adapter confidence in [0, 1]
    pub quality: f32,
}

/// Axis-aligned rectangle in image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    /// Grow on every side by `pad`, then clip to the frame
    pub fn padded(self, pad: f32, frame_w: u32, frame_h: u32) -> Self {
        let x0 = (self.x - pad).max(0.0);
        let y0 = (self.y - pad).max(0.0);
        let x1 = (self.x + self.width + pad).min(frame_w as f32);
        let y1 = (self.y + self.height + pad).min(frame_h as f32);
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Paint rectangles at full opacity into a fresh mask
pub fn paint_rects(width: u32, height: u32, rects: &[PixelRect]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let raw: &mut [u8] = &mut mask;
    for rect in rects {
        let x0 = (rect.x.max(0.0).floor() as u32).min(width);
        let y0 = (rect.y.max(0.0).floor() as u32).min(height);
        let x1 = ((rect.x + rect.width).ceil().max(0.0) as u32).clamp(x0, width);
        let y1 = ((rect.y + rect.height).ceil().max(0.0) as u32).min(height);
        for y in y0..y1 {
            let row = (y * width) as usize;
            raw[row + x0 as usize..row + x1 as usize].fill(255);
        }
    }
    mask
}

/// Blur rectangle edges, then snap back to a hard mask
pub fn smooth_edges(mask: &GrayImage, sigma: f32) -> GrayImage {
    let mut smoothed = image::imageops::blur(mask, sigma);
    for value in smoothed.iter_mut() {
        *value = if *value > 128 { 255 } else { 0 };
    }
    smoothed
}
