//! Overlay engine: covering rasterization and alpha compositing

use std::time::Instant;

use image::{GrayImage, RgbImage};
use metrics::histogram;
use tracing::debug;

use crate::config::OverlayConfig;
use crate::covering::{Covering, CoveringSpec, Fingerprint};
use crate::imagery::{DetectionMask, OverlayResult, SourceImage};

use super::pattern::render_pattern;
use super::reconcile::reconcile_mask;
use super::texture::{TextureLibrary, render_texture};
use super::types::{BlendSettings, ComposeError};

/// Composites coverings onto source images; CPU-bound and blocking
#[derive(Debug)]
pub struct OverlayEngine {
    textures: TextureLibrary,
    settings: BlendSettings,
}

impl OverlayEngine {
    pub fn new(textures: TextureLibrary, settings: BlendSettings) -> Self {
        Self { textures, settings }
    }

    pub fn from_config(config: &OverlayConfig, aspect_tolerance: f32) -> Self {
        Self::new(
            TextureLibrary::new(&config.textures_dir),
            BlendSettings {
                tint_strength: config.tint_strength,
                opacity: config.opacity,
                aspect_tolerance,
            },
        )
    }

    pub fn settings(&self) -> &BlendSettings {
        &self.settings
    }

    pub fn textures(&self) -> &TextureLibrary {
        &self.textures
    }

    /// Rasterize the covering at image size
    fn render_covering(
        &self,
        spec: &CoveringSpec,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, ComposeError> {
        match &spec.covering {
            Covering::Texture { reference } => {
                let texture = self.textures.load(reference)?;
                Ok(render_texture(
                    &texture,
                    spec.color,
                    self.settings.tint_strength,
                    width,
                    height,
                ))
            }
            Covering::Generated { pattern, material } => {
                Ok(render_pattern(*pattern, *material, spec.color, width, height))
            }
        }
    }

    /// Composite `spec` into the masked region of `image`
    ///
    /// The output has the image's dimensions; pixels where the mask is zero are
    /// copied from the source unchanged.
    pub fn compose(
        &self,
        image: &SourceImage,
        mask: &DetectionMask,
        spec: &CoveringSpec,
    ) -> Result<OverlayResult, ComposeError> {
        let start = Instant::now();
        let (width, height) = (image.width(), image.height());

        let alpha = reconcile_mask(mask.alpha(), width, height, self.settings.aspect_tolerance)?;
        let covering = self.render_covering(spec, width, height)?;
        let pixels = composite(image.pixels(), &alpha, &covering, self.settings.opacity);

        histogram!("blindview_compose_duration_seconds", "mode" => spec.mode().as_str())
            .record(start.elapsed());
        debug!(
            "Composed {} covering onto {} ({}x{}) in {:?}",
            spec.mode().as_str(),
            image.id(),
            width,
            height,
            start.elapsed()
        );

        Ok(OverlayResult {
            id: Fingerprint::for_try_on(image.id(), spec),
            pixels,
            image_id: image.id().to_string(),
            mask_id: mask.id().to_string(),
            covering: spec.clone(),
            locator: None,
        })
    }
}

/// Blend `covering` over `source` weighted by `alpha * opacity`
///
/// All three buffers must have the same dimensions.
pub fn composite(source: &RgbImage, alpha: &GrayImage, covering: &RgbImage, opacity: f32) -> RgbImage {
    debug_assert_eq!(source.dimensions(), alpha.dimensions());
    debug_assert_eq!(source.dimensions(), covering.dimensions());

    let opacity = (opacity.clamp(0.0, 1.0) * 255.0).round() as u32;
    let mut out = source.clone();
    let dst: &mut [u8] = &mut out;

    dst.chunks_exact_mut(3)
        .zip(alpha.as_raw())
        .zip(covering.as_raw().chunks_exact(3))
        .for_each(|((px, &m), cov)| {
            if m == 0 {
                return;
            }
            let a = (m as u32 * opacity + 127) / 255;
            for (d, &c) in px.iter_mut().zip(cov) {
                *d = ((*d as u32 * (255 - a) + c as u32 * a + 127) / 255) as u8;
            }
        });

    out
}
