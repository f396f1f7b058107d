//! Pixel-carrying domain types shared by detection, compositing and storage
//!
//! - `SourceImage`: decoded upload, immutable once loaded
//! - `DetectionMask`: soft-alpha surface mask plus the detector that made it
//! - `OverlayResult`: composited output for one (image, covering) pair

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::covering::{CoveringSpec, Fingerprint};
use crate::detection::DetectorKind;
use crate::storage::ArtifactLocator;

/// Mask pixels at or above this value count toward coverage
pub const MASK_ON_THRESHOLD: u8 = 128;

/// Errors that can occur when decoding or encoding pixel data
#[derive(Debug, Error)]
pub enum ImageryError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Mask buffer does not match {width}x{height}")]
    MalformedMask { width: u32, height: u32 },
}

/// A decoded source photograph
#[derive(Debug, Clone)]
pub struct SourceImage {
    id: String,
    pixels: RgbImage,
    channels: u8,
    encoded: Bytes,
    content_type: String,
}

impl SourceImage {
    /// Decode an uploaded image, keeping the original bytes for remote detectors
    pub fn decode(id: &str, bytes: Bytes) -> Result<Self, ImageryError> {
        let format = image::guess_format(&bytes).map_err(|e| ImageryError::Decode(e.to_string()))?;
        let decoded = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| ImageryError::Decode(e.to_string()))?;

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(ImageryError::Empty {
                width: decoded.width(),
                height: decoded.height(),
            });
        }

        Ok(Self {
            id: id.to_string(),
            channels: decoded.color().channel_count(),
            pixels: decoded.into_rgb8(),
            encoded: bytes,
            content_type: format.to_mime_type().to_string(),
        })
    }

    /// Wrap an in-memory RGB buffer, encoding it as PNG for remote detectors
    pub fn from_rgb(id: &str, pixels: RgbImage) -> Result<Self, ImageryError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(ImageryError::Empty {
                width: pixels.width(),
                height: pixels.height(),
            });
        }
        let encoded = encode_png(pixels.as_raw(), pixels.width(), pixels.height(), ExtendedColorType::Rgb8)?;
        Ok(Self {
            id: id.to_string(),
            pixels,
            channels: 3,
            encoded,
            content_type: "image/png".to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Channel count of the uploaded file (pixels are always held as RGB8)
    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Original encoded bytes
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// Sidecar metadata persisted next to a mask bitmap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskMetadata {
    pub image_id: String,
    pub produced_by: DetectorKind,
    pub quality: f32,
    pub width: u32,
    pub height: u32,
}

/// A per-pixel surface mask (0 = untouched, 255 = fully covered)
#[derive(Debug, Clone)]
pub struct DetectionMask {
    id: String,
    image_id: String,
    alpha: GrayImage,
    produced_by: DetectorKind,
    quality: f32,
}

impl DetectionMask {
    pub fn new(image_id: &str, alpha: GrayImage, produced_by: DetectorKind, quality: f32) -> Self {
        Self {
            id: Self::id_for(image_id),
            image_id: image_id.to_string(),
            alpha,
            produced_by,
            quality: quality.clamp(0.0, 1.0),
        }
    }

    /// Mask identifiers are derived from the source image identifier
    pub fn id_for(image_id: &str) -> String {
        format!("mask_{}", image_id)
    }

    /// Rebuild a persisted mask from its PNG bytes and sidecar
    pub fn from_png(bytes: &[u8], meta: &MaskMetadata) -> Result<Self, ImageryError> {
        let alpha = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|e| ImageryError::Decode(e.to_string()))?
            .into_luma8();
        if alpha.width() != meta.width || alpha.height() != meta.height {
            return Err(ImageryError::MalformedMask {
                width: meta.width,
                height: meta.height,
            });
        }
        Ok(Self::new(&meta.image_id, alpha, meta.produced_by, meta.quality))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn width(&self) -> u32 {
        self.alpha.width()
    }

    pub fn height(&self) -> u32 {
        self.alpha.height()
    }

    pub fn alpha(&self) -> &GrayImage {
        &self.alpha
    }

    pub fn produced_by(&self) -> DetectorKind {
        self.produced_by
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Buffer length matches dimensions and the frame is non-empty
    pub fn is_well_formed(&self) -> bool {
        let (w, h) = (self.alpha.width() as usize, self.alpha.height() as usize);
        w > 0 && h > 0 && self.alpha.as_raw().len() == w * h
    }

    /// Fraction of the frame at or above `MASK_ON_THRESHOLD`
    pub fn coverage(&self) -> f32 {
        let raw = self.alpha.as_raw();
        if raw.is_empty() {
            return 0.0;
        }
        let on = raw.iter().filter(|&&v| v >= MASK_ON_THRESHOLD).count();
        on as f32 / raw.len() as f32
    }

    pub fn metadata(&self) -> MaskMetadata {
        MaskMetadata {
            image_id: self.image_id.clone(),
            produced_by: self.produced_by,
            quality: self.quality,
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn to_png(&self) -> Result<Bytes, ImageryError> {
        encode_png(self.alpha.as_raw(), self.width(), self.height(), ExtendedColorType::L8)
    }
}

/// Composited try-on output; never mutated once shared
#[derive(Debug, Clone)]
pub struct OverlayResult {
    pub id: Fingerprint,
    pub pixels: RgbImage,
    pub image_id: String,
    pub mask_id: String,
    pub covering: CoveringSpec,
    pub locator: Option<ArtifactLocator>,
}

impl OverlayResult {
    /// Attach the storage locator after persistence, before the result is shared
    pub fn persisted_at(self, locator: ArtifactLocator) -> Self {
        Self {
            locator: Some(locator),
            ..self
        }
    }

    pub fn to_png(&self) -> Result<Bytes, ImageryError> {
        encode_png(
            self.pixels.as_raw(),
            self.pixels.width(),
            self.pixels.height(),
            ExtendedColorType::Rgb8,
        )
    }
}

/// Encode a raw buffer as PNG
fn encode_png(raw: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Result<Bytes, ImageryError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(raw, width, height, color)
        .map_err(|e| ImageryError::Encode(e.to_string()))?;
    Ok(Bytes::from(buffer))
}
