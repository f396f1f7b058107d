//! Fixed-priority fallback over detector adapters
//!
//! Network adapters are tried in order, each under its own timeout. Any
//! failure, timeout or low-quality mask falls through to the next adapter.
//! The local heuristic always runs last; if it fails there is nothing left to
//! try, so its failure is reported to the caller.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{error, info, warn};

use crate::config::DetectionConfig;
use crate::imagery::{DetectionMask, SourceImage};

use super::cloud_vision::CloudVisionDetector;
use super::detector::SurfaceDetector;
use super::generative::GenerativeDetector;
use super::heuristic::LocalHeuristicDetector;
use super::quality::MaskQuality;
use super::types::{DetectorError, DetectorKind};

/// Runs the detector chain for one image at a time
pub struct DetectionOrchestrator {
    adapters: Vec<Arc<dyn SurfaceDetector>>,
    terminal: Arc<LocalHeuristicDetector>,
    quality: MaskQuality,
}

fn outcome_label(error: &DetectorError) -> &'static str {
    match error {
        DetectorError::Timeout(_) => "timeout",
        DetectorError::Rejected(_) => "rejected",
        DetectorError::NoSurface => "no_surface",
        _ => "error",
    }
}

fn record_attempt(kind: DetectorKind, outcome: &'static str) {
    counter!("blindview_detector_attempts_total", "detector" => kind.as_str(), "outcome" => outcome)
        .increment(1);
}

impl DetectionOrchestrator {
    pub fn new(
        adapters: Vec<Arc<dyn SurfaceDetector>>,
        terminal: LocalHeuristicDetector,
        quality: MaskQuality,
    ) -> Self {
        Self {
            adapters,
            terminal: Arc::new(terminal),
            quality,
        }
    }

    /// Build the chain from whichever adapters are configured
    pub fn from_config(config: &DetectionConfig) -> Result<Self, DetectorError> {
        let mut adapters: Vec<Arc<dyn SurfaceDetector>> = Vec::new();
        if let Some(cloud) = CloudVisionDetector::from_config(config)? {
            adapters.push(Arc::new(cloud));
        }
        if let Some(generative) = GenerativeDetector::from_config(config)? {
            adapters.push(Arc::new(generative));
        }

        let orchestrator = Self::new(
            adapters,
            LocalHeuristicDetector::from_config(config),
            MaskQuality::from_config(config),
        );
        info!(
            "Detector chain: {}",
            orchestrator
                .chain()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(orchestrator)
    }

    /// Detectors in the order they are tried
    pub fn chain(&self) -> Vec<DetectorKind> {
        self.adapters
            .iter()
            .map(|a| a.kind())
            .chain(std::iter::once(DetectorKind::LocalHeuristic))
            .collect()
    }

    pub fn quality(&self) -> &MaskQuality {
        &self.quality
    }

    /// Produce an accepted mask for the image
    pub async fn detect(&self, image: Arc<SourceImage>) -> Result<DetectionMask, DetectorError> {
        let start = Instant::now();
        let (width, height) = (image.width(), image.height());

        for adapter in &self.adapters {
            let kind = adapter.kind();
            let limit = adapter.timeout();

            let outcome = match tokio::time::timeout(limit, adapter.detect(&image)).await {
                Err(_) => Err(DetectorError::Timeout(limit)),
                Ok(Err(e)) => Err(e),
                Ok(Ok(detection)) => {
                    let mask = DetectionMask::new(image.id(), detection.alpha, kind, detection.quality);
                    self.quality
                        .check(&mask, width, height)
                        .map(|()| mask)
                        .map_err(|r| DetectorError::Rejected(r.to_string()))
                }
            };

            match outcome {
                Ok(mask) => {
                    record_attempt(kind, "accepted");
                    histogram!("blindview_detection_duration_seconds", "detector" => kind.as_str())
                        .record(start.elapsed());
                    info!(
                        "Accepted {} mask for {} (coverage {:.1}%, quality {:.2})",
                        kind,
                        image.id(),
                        mask.coverage() * 100.0,
                        mask.quality()
                    );
                    return Ok(mask);
                }
                Err(e) => {
                    record_attempt(kind, outcome_label(&e));
                    warn!("{} detector gave no usable mask for {}: {}", kind, image.id(), e);
                }
            }
        }

        self.run_terminal(image, start).await
    }

    async fn run_terminal(
        &self,
        image: Arc<SourceImage>,
        start: Instant,
    ) -> Result<DetectionMask, DetectorError> {
        let kind = DetectorKind::LocalHeuristic;
        let budget = self.terminal.budget();
        let terminal = self.terminal.clone();
        let input = image.clone();
        let task = tokio::task::spawn_blocking(move || terminal.detect_blocking(&input));

        let detection = match tokio::time::timeout(budget, task).await {
            Err(_) => Err(DetectorError::Timeout(budget)),
            Ok(Err(join)) => Err(DetectorError::Failed(format!("heuristic task failed: {}", join))),
            Ok(Ok(result)) => result,
        };
        let detection = detection.map_err(|e| {
            record_attempt(kind, outcome_label(&e));
            error!("Local heuristic failed for {}: {}", image.id(), e);
            e
        })?;

        let mask = DetectionMask::new(image.id(), detection.alpha, kind, detection.quality);
        match self.quality.check(&mask, image.width(), image.height()) {
            Ok(()) => {}
            Err(rejection) if !rejection.is_structural() => {
                warn!(
                    "Accepting local heuristic mask for {} despite: {}",
                    image.id(),
                    rejection
                );
            }
            Err(rejection) => {
                record_attempt(kind, "rejected");
                error!("Local heuristic produced an unusable mask for {}: {}", image.id(), rejection);
                return Err(DetectorError::Failed(rejection.to_string()));
            }
        }

        record_attempt(kind, "accepted");
        histogram!("blindview_detection_duration_seconds", "detector" => kind.as_str())
            .record(start.elapsed());
        info!(
            "Accepted {} mask for {} (coverage {:.1}%, quality {:.2})",
            kind,
            image.id(),
            mask.coverage() * 100.0,
            mask.quality()
        );
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use image::{GrayImage, Luma, RgbImage};

    use crate::detection::Detection;

    /// Adapter that optionally sleeps, then returns a mask covering `fraction` of the rows
    struct ScriptedDetector {
        kind: DetectorKind,
        delay: Duration,
        timeout: Duration,
        fraction: Option<f32>,
        calls: AtomicUsize,
    }

    impl ScriptedDetector {
        fn new(kind: DetectorKind, fraction: Option<f32>) -> Self {
            Self {
                kind,
                delay: Duration::ZERO,
                timeout: Duration::from_secs(5),
                fraction,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(mut self, delay: Duration, timeout: Duration) -> Self {
            self.delay = delay;
            self.timeout = timeout;
            self
        }
    }

    #[async_trait]
    impl SurfaceDetector for ScriptedDetector {
        fn kind(&self) -> DetectorKind {
            self.kind
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn detect(&self, image: &SourceImage) -> Result<Detection, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let fraction = self.fraction.ok_or_else(|| DetectorError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })?;
            let rows = (image.height() as f32 * fraction).round() as u32;
            let mut alpha = GrayImage::new(image.width(), image.height());
            for y in 0..rows {
                for x in 0..image.width() {
                    alpha.put_pixel(x, y, Luma([255]));
                }
            }
            Ok(Detection { alpha, quality: 0.8 })
        }
    }

    fn image() -> Arc<SourceImage> {
        Arc::new(SourceImage::from_rgb("img", RgbImage::new(120, 90)).unwrap())
    }

    fn terminal() -> LocalHeuristicDetector {
        LocalHeuristicDetector::from_config(&DetectionConfig::default())
    }

    #[tokio::test]
    async fn test_first_acceptable_adapter_wins() {
        let cloud = Arc::new(ScriptedDetector::new(DetectorKind::CloudVision, Some(0.4)));
        let generative = Arc::new(ScriptedDetector::new(DetectorKind::GenerativeAi, Some(0.4)));
        let orchestrator = DetectionOrchestrator::new(
            vec![cloud.clone(), generative.clone()],
            terminal(),
            MaskQuality::default(),
        );

        let mask = orchestrator.detect(image()).await.unwrap();
        assert_eq!(mask.produced_by(), DetectorKind::CloudVision);
        assert_eq!(mask.id(), "mask_img");
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generative.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_falls_through_to_next_adapter() {
        let cloud = Arc::new(ScriptedDetector::new(DetectorKind::CloudVision, None));
        let generative = Arc::new(ScriptedDetector::new(DetectorKind::GenerativeAi, Some(0.3)));
        let orchestrator =
            DetectionOrchestrator::new(vec![cloud, generative], terminal(), MaskQuality::default());

        let mask = orchestrator.detect(image()).await.unwrap();
        assert_eq!(mask.produced_by(), DetectorKind::GenerativeAi);
    }

    #[tokio::test]
    async fn test_timeout_then_oversized_mask_reaches_heuristic() {
        let cloud = Arc::new(
            ScriptedDetector::new(DetectorKind::CloudVision, Some(0.4))
                .slow(Duration::from_millis(500), Duration::from_millis(20)),
        );
        let generative = Arc::new(ScriptedDetector::new(DetectorKind::GenerativeAi, Some(0.95)));
        let orchestrator = DetectionOrchestrator::new(
            vec![cloud.clone(), generative.clone()],
            terminal(),
            MaskQuality::default(),
        );

        let started = Instant::now();
        let mask = orchestrator.detect(image()).await.unwrap();
        assert_eq!(mask.produced_by(), DetectorKind::LocalHeuristic);
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generative.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_empty_chain_uses_heuristic() {
        let orchestrator = DetectionOrchestrator::new(Vec::new(), terminal(), MaskQuality::default());
        assert_eq!(orchestrator.chain(), vec![DetectorKind::LocalHeuristic]);

        let mask = orchestrator.detect(image()).await.unwrap();
        assert_eq!(mask.produced_by(), DetectorKind::LocalHeuristic);
        assert!(mask.is_well_formed());
    }

    #[tokio::test]
    async fn test_heuristic_area_miss_is_tolerated() {
        // The centred fallback covers ~36%, outside this band
        let quality = MaskQuality {
            min_area_ratio: 0.5,
            max_area_ratio: 0.9,
            aspect_tolerance: 0.05,
        };
        let orchestrator = DetectionOrchestrator::new(Vec::new(), terminal(), quality);
        let mask = orchestrator.detect(image()).await.unwrap();
        assert_eq!(mask.produced_by(), DetectorKind::LocalHeuristic);
    }

    #[tokio::test]
    async fn test_thin_strip_still_gets_a_mask() {
        let orchestrator = DetectionOrchestrator::new(Vec::new(), terminal(), MaskQuality::default());
        for (width, height) in [(1000, 20), (640, 4), (2400, 37)] {
            let strip = Arc::new(SourceImage::from_rgb("strip", RgbImage::new(width, height)).unwrap());
            let mask = orchestrator.detect(strip).await.unwrap();
            assert_eq!(mask.produced_by(), DetectorKind::LocalHeuristic);
            let reconciled = crate::compose::reconcile_mask(mask.alpha(), width, height, 0.05).unwrap();
            assert_eq!(reconciled.dimensions(), (width, height));
        }
    }

    #[test]
    fn test_chain_from_config() {
        let config = DetectionConfig {
            vision_endpoint: Some("https://vision.example".to_string()),
            vision_key: Some("key".to_string()),
            gemini_api_key: Some("key".to_string()),
            ..DetectionConfig::default()
        };
        let orchestrator = DetectionOrchestrator::from_config(&config).unwrap();
        assert_eq!(
            orchestrator.chain(),
            vec![
                DetectorKind::CloudVision,
                DetectorKind::GenerativeAi,
                DetectorKind::LocalHeuristic
            ]
        );

        let bare = DetectionOrchestrator::from_config(&DetectionConfig::default()).unwrap();
        assert_eq!(bare.chain(), vec![DetectorKind::LocalHeuristic]);
    }
}
