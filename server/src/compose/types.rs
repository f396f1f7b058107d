//! Overlay engine types and error definitions

use thiserror::Error;

/// Errors that can occur while compositing a covering
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Mask {mask:?} cannot be reconciled with image {image:?}")]
    Irreconcilable { mask: (u32, u32), image: (u32, u32) },

    #[error("Texture not found: {0}")]
    TextureNotFound(String),

    #[error("Failed to load texture {reference}: {reason}")]
    TextureLoad { reference: String, reason: String },

    #[error("Texture {0} has no pixels")]
    EmptyTexture(String),
}

impl ComposeError {
    /// Caused by the request rather than by the system
    pub fn is_input(&self) -> bool {
        matches!(self, ComposeError::TextureNotFound(_))
    }
}

/// Overlay engine settings
#[derive(Debug, Clone, Copy)]
pub struct BlendSettings {
    /// How strongly texture pixels are pulled toward the requested color (0-1)
    pub tint_strength: f32,
    /// Covering opacity where the mask is fully set (0-1)
    pub opacity: f32,
    /// Allowed relative aspect-ratio difference when resizing masks
    pub aspect_tolerance: f32,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            tint_strength: 0.85,
            opacity: 0.9,
            aspect_tolerance: 0.05,
        }
    }
}
