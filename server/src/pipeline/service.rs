//! Try-on pipeline: cache, detection, compositing and persistence
//!
//! Flow for `try_on`:
//! 1. validate the covering (input errors stop here, before any caching)
//! 2. look up the result cache by fingerprint; on a miss, one computation runs
//! 3. the computation gets the image's mask (itself cached and single-flight),
//!    composes on a blocking thread, and persists the result
//! 4. only a persisted result is inserted into the cache

use std::sync::Arc;

use tracing::{error, info};

use crate::cache::ResultCache;
use crate::compose::OverlayEngine;
use crate::config::CacheConfig;
use crate::covering::{CoveringRequest, CoveringSpec, Fingerprint};
use crate::detection::DetectionOrchestrator;
use crate::imagery::{DetectionMask, OverlayResult};
use crate::storage::ArtifactRepository;

use super::types::{PipelineError, PipelineSnapshot, PipelineStats, SurfaceReport, TryOnOutcome};

/// Everything a detached computation needs
struct PipelineContext {
    repository: ArtifactRepository,
    orchestrator: DetectionOrchestrator,
    engine: Arc<OverlayEngine>,
    masks: ResultCache<DetectionMask, PipelineError>,
    stats: PipelineStats,
}

impl PipelineContext {
    /// Mask for an image: cached, then persisted, then freshly detected
    async fn mask_for(self: &Arc<Self>, image_id: &str) -> Result<Arc<DetectionMask>, PipelineError> {
        let context = self.clone();
        let image_id = image_id.to_string();
        self.masks
            .get_or_compute(&DetectionMask::id_for(&image_id), move || async move {
                context.load_or_detect(&image_id).await
            })
            .await
    }

    async fn load_or_detect(&self, image_id: &str) -> Result<DetectionMask, PipelineError> {
        if let Some(mask) = self.repository.load_mask(image_id).await? {
            info!("Reusing persisted {} mask for {}", mask.produced_by(), image_id);
            return Ok(mask);
        }

        let image = Arc::new(self.repository.load_source_image(image_id).await?);
        self.stats.record_detection();
        let mask = self.orchestrator.detect(image).await.map_err(|e| {
            error!("Detection failed for {}: {}", image_id, e);
            PipelineError::from(e)
        })?;

        self.repository.save_mask(&mask).await.map_err(|e| {
            error!("Failed to persist mask for {}: {}", image_id, e);
            PipelineError::Internal(format!("mask write failed: {}", e))
        })?;
        Ok(mask)
    }

    async fn compute_result(
        self: Arc<Self>,
        image_id: String,
        spec: CoveringSpec,
    ) -> Result<OverlayResult, PipelineError> {
        let mask = self.mask_for(&image_id).await?;
        let image = self.repository.load_source_image(&image_id).await?;

        self.stats.record_composition();
        let engine = self.engine.clone();
        let result = tokio::task::spawn_blocking(move || engine.compose(&image, &mask, &spec))
            .await
            .map_err(|e| PipelineError::Internal(format!("compose task failed: {}", e)))?
            .map_err(|e| {
                error!("Compose failed for {}: {}", image_id, e);
                PipelineError::from(e)
            })?;

        let locator = self.repository.save_result(&result).await.map_err(|e| {
            error!("Failed to persist result {} for {}: {}", result.id.short(), image_id, e);
            PipelineError::Internal(format!("result write failed: {}", e))
        })?;
        info!("Stored try-on result for {} at {}", image_id, locator);
        Ok(result.persisted_at(locator))
    }
}

/// Entry point for surface detection and try-on requests
pub struct TryOnPipeline {
    context: Arc<PipelineContext>,
    results: ResultCache<OverlayResult, PipelineError>,
}

impl TryOnPipeline {
    pub fn new(
        repository: ArtifactRepository,
        orchestrator: DetectionOrchestrator,
        engine: OverlayEngine,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            context: Arc::new(PipelineContext {
                repository,
                orchestrator,
                engine: Arc::new(engine),
                masks: ResultCache::from_config("masks", cache),
                stats: PipelineStats::default(),
            }),
            results: ResultCache::from_config("results", cache),
        }
    }

    pub fn repository(&self) -> &ArtifactRepository {
        &self.context.repository
    }

    pub fn orchestrator(&self) -> &DetectionOrchestrator {
        &self.context.orchestrator
    }

    pub fn engine(&self) -> &OverlayEngine {
        &self.context.engine
    }

    /// Locate the coverable surface of a stored image
    pub async fn detect_surface(&self, image_id: &str) -> Result<SurfaceReport, PipelineError> {
        let mask = self.context.mask_for(image_id).await?;
        Ok(SurfaceReport {
            mask_id: mask.id().to_string(),
            produced_by: mask.produced_by(),
            quality: mask.quality(),
            coverage: mask.coverage(),
        })
    }

    /// Composite a covering onto a stored image and return where the result lives
    pub async fn try_on(
        &self,
        image_id: &str,
        request: CoveringRequest,
    ) -> Result<TryOnOutcome, PipelineError> {
        let spec = CoveringSpec::try_from(request)?;
        let fingerprint = Fingerprint::for_try_on(image_id, &spec);

        let context = self.context.clone();
        let (owned_id, owned_spec) = (image_id.to_string(), spec.clone());
        let result = self
            .results
            .get_or_compute(fingerprint.as_str(), move || {
                context.compute_result(owned_id, owned_spec)
            })
            .await?;

        let locator = result
            .locator
            .clone()
            .ok_or_else(|| PipelineError::Internal("result was cached before persisting".to_string()))?;

        Ok(TryOnOutcome {
            result_id: fingerprint,
            result_locator: locator,
            covering: spec,
            mask_id: result.mask_id.clone(),
        })
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.results.record_gauges();
        self.context.masks.record_gauges();
        PipelineSnapshot {
            detections: self.context.stats.detections(),
            compositions: self.context.stats.compositions(),
            masks: self.context.masks.stats(),
            results: self.results.stats(),
        }
    }
}
