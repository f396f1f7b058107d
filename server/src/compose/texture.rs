//! Texture library and texture coverings
//!
//! Textures are tiled at native size across the target, then tinted toward
//! the requested color with a multiplicative blend:
//! `out = src * (1 - s) + src * color * s`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use image::{Rgb as Pixel, RgbImage};
use tracing::debug;

use crate::covering::Rgb;

use super::types::ComposeError;

const FALLBACK_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Texture bitmaps on disk, decoded once and kept in memory
#[derive(Debug)]
pub struct TextureLibrary {
    root: PathBuf,
    loaded: DashMap<String, Arc<RgbImage>>,
}

impl TextureLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loaded: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File names of the textures available under the library root, sorted
    pub async fn list(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Texture directory {:?} unreadable: {}", self.root, e);
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    FALLBACK_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                });
            if !known || !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        names
    }

    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let direct = self.root.join(reference);
        if direct.is_file() {
            return Some(direct);
        }
        if direct.extension().is_some() {
            return None;
        }
        FALLBACK_EXTENSIONS
            .iter()
            .map(|ext| direct.with_extension(ext))
            .find(|p| p.is_file())
    }

    /// Load a texture by reference; blocking
    pub fn load(&self, reference: &str) -> Result<Arc<RgbImage>, ComposeError> {
        if let Some(texture) = self.loaded.get(reference) {
            return Ok(texture.clone());
        }

        let path = self
            .resolve(reference)
            .ok_or_else(|| ComposeError::TextureNotFound(reference.to_string()))?;
        let texture = image::open(&path)
            .map_err(|e| ComposeError::TextureLoad {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?
            .into_rgb8();
        if texture.width() == 0 || texture.height() == 0 {
            return Err(ComposeError::EmptyTexture(reference.to_string()));
        }

        debug!(
            "Loaded texture {} ({}x{}) from {:?}",
            reference,
            texture.width(),
            texture.height(),
            path
        );
        let texture = Arc::new(texture);
        self.loaded.insert(reference.to_string(), texture.clone());
        Ok(texture)
    }
}

/// Tile `texture` over `width` x `height` and tint it toward `color`
pub fn render_texture(
    texture: &RgbImage,
    color: Rgb,
    tint_strength: f32,
    width: u32,
    height: u32,
) -> RgbImage {
    let s = tint_strength.clamp(0.0, 1.0);
    let (tw, th) = texture.dimensions();
    let factor = color.0.map(|c| (1.0 - s) + c.clamp(0.0, 1.0) * s);

    RgbImage::from_fn(width, height, |x, y| {
        let src = texture.get_pixel(x % tw, y % th).0;
        Pixel([
            (src[0] as f32 * factor[0]).round() as u8,
            (src[1] as f32 * factor[1]).round() as u8,
            (src[2] as f32 * factor[2]).round() as u8,
        ])
    })
}
