//! End-to-end pipeline tests over a temporary filesystem store

mod common;

use std::sync::Arc;
use std::time::Duration;

use blindview_server::compose::reconcile_mask;
use blindview_server::covering::{CoveringRequest, Material, PatternKind};
use blindview_server::detection::DetectorKind;
use blindview_server::imagery::DetectionMask;
use blindview_server::pipeline::PipelineError;
use blindview_server::storage::ArtifactRepository;
use common::{ScriptedDetector, TestContext, window_scene};
use image::{GrayImage, Luma, Rgb, RgbImage};

fn horizontal_grey() -> CoveringRequest {
    CoveringRequest::generated(PatternKind::Horizontal, Material::Fabric, "#808080")
}

#[tokio::test]
async fn test_heuristic_try_on_leaves_unmasked_pixels_untouched() {
    let ctx = TestContext::builder().working_width(400).build().await;
    let image_id = ctx.upload_scene(800, 600).await;

    let outcome = ctx
        .pipeline
        .try_on(&image_id, horizontal_grey())
        .await
        .unwrap();

    let mask = ctx.repository.load_mask(&image_id).await.unwrap().unwrap();
    assert_eq!(mask.produced_by(), DetectorKind::LocalHeuristic);
    assert_eq!((mask.width(), mask.height()), (400, 300));
    assert_eq!(outcome.mask_id, mask.id());

    let key = ArtifactRepository::result_key(&image_id, &outcome.result_id);
    let bytes = ctx.repository.store().get(&key).await.unwrap();
    let result = image::load_from_memory(&bytes).unwrap().to_rgb8();
    assert_eq!(result.dimensions(), (800, 600));

    let source = window_scene(800, 600);
    let alpha = reconcile_mask(mask.alpha(), 800, 600, 0.05).unwrap();
    let mut changed = 0;
    for (x, y, pixel) in result.enumerate_pixels() {
        if alpha.get_pixel(x, y).0[0] == 0 {
            assert_eq!(pixel, source.get_pixel(x, y), "unmasked pixel ({x}, {y}) changed");
        } else if pixel != source.get_pixel(x, y) {
            changed += 1;
        }
    }
    assert!(changed > 0, "covering was not applied");
}

#[tokio::test]
async fn test_concurrent_identical_requests_share_one_computation() {
    let ctx = TestContext::new().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let (a, b) = tokio::join!(
        ctx.pipeline.try_on(&image_id, horizontal_grey()),
        ctx.pipeline.try_on(&image_id, horizontal_grey()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.result_locator, b.result_locator);
    assert_eq!(a.result_id, b.result_id);

    let stats = ctx.pipeline.stats();
    assert_eq!(stats.detections, 1);
    assert_eq!(stats.compositions, 1);
    assert_eq!(stats.results.computes, 1);
}

#[tokio::test]
async fn test_many_concurrent_requests_single_flight() {
    let ctx = TestContext::new().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let pipeline = ctx.pipeline.clone();
            let image_id = image_id.clone();
            tokio::spawn(async move { pipeline.try_on(&image_id, horizontal_grey()).await })
        })
        .collect();

    let mut locators = Vec::new();
    for handle in handles {
        locators.push(handle.await.unwrap().unwrap().result_locator);
    }
    locators.dedup();
    assert_eq!(locators.len(), 1);

    let stats = ctx.pipeline.stats();
    assert_eq!(stats.detections, 1);
    assert_eq!(stats.compositions, 1);
}

#[tokio::test]
async fn test_second_covering_reuses_mask() {
    let ctx = TestContext::new().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let grey = ctx.pipeline.try_on(&image_id, horizontal_grey()).await.unwrap();
    let oak = ctx
        .pipeline
        .try_on(
            &image_id,
            CoveringRequest::generated(PatternKind::Vertical, Material::Wood, "#8b5a2b"),
        )
        .await
        .unwrap();

    assert_ne!(grey.result_id, oak.result_id);
    assert_ne!(grey.result_locator, oak.result_locator);
    assert_eq!(grey.mask_id, oak.mask_id);

    let stats = ctx.pipeline.stats();
    assert_eq!(stats.detections, 1);
    assert_eq!(stats.compositions, 2);
}

#[tokio::test]
async fn test_repeat_request_hits_cache() {
    let ctx = TestContext::new().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let first = ctx.pipeline.try_on(&image_id, horizontal_grey()).await.unwrap();
    let second = ctx.pipeline.try_on(&image_id, horizontal_grey()).await.unwrap();
    assert_eq!(first.result_locator, second.result_locator);

    let stats = ctx.pipeline.stats();
    assert_eq!(stats.compositions, 1);
    assert!(stats.results.hits >= 1);
}

#[tokio::test]
async fn test_failed_adapters_fall_back_to_heuristic() {
    let cloud = Arc::new(
        ScriptedDetector::new(DetectorKind::CloudVision, Some(0.4))
            .slow(Duration::from_millis(500), Duration::from_millis(20)),
    );
    let generative = Arc::new(ScriptedDetector::new(DetectorKind::GenerativeAi, Some(0.95)));
    let ctx = TestContext::builder()
        .adapter(cloud.clone())
        .adapter(generative.clone())
        .build()
        .await;
    let image_id = ctx.upload_scene(320, 240).await;

    let report = ctx.pipeline.detect_surface(&image_id).await.unwrap();
    assert_eq!(report.produced_by, DetectorKind::LocalHeuristic);
    assert_eq!(report.mask_id, DetectionMask::id_for(&image_id));
    assert_eq!(cloud.calls(), 1);
    assert_eq!(generative.calls(), 1);

    // Cached: the chain is not run again
    ctx.pipeline.detect_surface(&image_id).await.unwrap();
    assert_eq!(cloud.calls(), 1);
    assert_eq!(ctx.pipeline.stats().detections, 1);
}

#[tokio::test]
async fn test_first_acceptable_adapter_mask_is_used() {
    let cloud = Arc::new(ScriptedDetector::new(DetectorKind::CloudVision, Some(0.4)));
    let ctx = TestContext::builder().adapter(cloud.clone()).build().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let report = ctx.pipeline.detect_surface(&image_id).await.unwrap();
    assert_eq!(report.produced_by, DetectorKind::CloudVision);
    assert!((report.coverage - 0.4).abs() < 0.01);
    assert_eq!(report.quality, 0.8);
}

#[tokio::test]
async fn test_malformed_covering_is_rejected_before_compute() {
    let ctx = TestContext::new().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let request = CoveringRequest {
        texture: None,
        ..CoveringRequest::texture("linen.png", "#ffffff")
    };
    let err = ctx.pipeline.try_on(&image_id, request).await.unwrap_err();
    assert!(matches!(err, PipelineError::Input(_)));

    let stats = ctx.pipeline.stats();
    assert_eq!(stats.detections, 0);
    assert_eq!(stats.compositions, 0);
    assert_eq!(stats.results.hits + stats.results.misses, 0);
    assert_eq!(stats.results.computes, 0);
    assert_eq!(stats.masks.computes, 0);
}

#[tokio::test]
async fn test_bad_color_is_input_error() {
    let ctx = TestContext::new().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let request = CoveringRequest::generated(PatternKind::Roller, Material::Plastic, "#zzz");
    let err = ctx.pipeline.try_on(&image_id, request).await.unwrap_err();
    assert!(matches!(err, PipelineError::Input(_)));
    assert_eq!(ctx.pipeline.stats().results.computes, 0);
}

#[tokio::test]
async fn test_texture_covering() {
    let ctx = TestContext::new().await;
    ctx.add_texture("linen.png", &RgbImage::from_pixel(16, 16, Rgb([230, 220, 200])));
    let image_id = ctx.upload_scene(320, 240).await;

    let outcome = ctx
        .pipeline
        .try_on(&image_id, CoveringRequest::texture("linen", "#a0c0e0"))
        .await
        .unwrap();
    assert!(outcome.result_locator.as_str().contains(&image_id));
}

#[tokio::test]
async fn test_unknown_texture_is_input_error_and_not_cached() {
    let ctx = TestContext::new().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let request = CoveringRequest::texture("velvet", "#a0c0e0");
    let err = ctx.pipeline.try_on(&image_id, request.clone()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Input(_)));

    // Adding the texture afterwards makes the same request succeed
    ctx.add_texture("velvet.png", &RgbImage::from_pixel(8, 8, Rgb([90, 20, 40])));
    ctx.pipeline.try_on(&image_id, request).await.unwrap();
    assert_eq!(ctx.pipeline.stats().results.computes, 2);
}

#[tokio::test]
async fn test_missing_image_is_not_found() {
    let ctx = TestContext::new().await;

    let err = ctx
        .pipeline
        .try_on("does-not-exist", horizontal_grey())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));

    let err = ctx.pipeline.detect_surface("does-not-exist").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn test_persisted_mask_is_reused() {
    let ctx = TestContext::new().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let mut alpha = GrayImage::new(320, 240);
    for y in 60..180 {
        for x in 80..240 {
            alpha.put_pixel(x, y, Luma([255]));
        }
    }
    let mask = DetectionMask::new(&image_id, alpha, DetectorKind::CloudVision, 0.9);
    ctx.repository.save_mask(&mask).await.unwrap();

    let report = ctx.pipeline.detect_surface(&image_id).await.unwrap();
    assert_eq!(report.produced_by, DetectorKind::CloudVision);
    assert_eq!(report.quality, 0.9);
    assert_eq!(ctx.pipeline.stats().detections, 0);
}

#[tokio::test]
async fn test_result_write_failure_is_internal_and_not_cached() {
    let ctx = TestContext::builder().fail_writes_under("results/").build().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let err = ctx
        .pipeline
        .try_on(&image_id, horizontal_grey())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Internal(_)));

    // Nothing cached: the retry composes again and fails the same way
    let err = ctx
        .pipeline
        .try_on(&image_id, horizontal_grey())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Internal(_)));

    let stats = ctx.pipeline.stats();
    assert_eq!(stats.results.computes, 2);
    assert_eq!(stats.compositions, 2);
    assert_eq!(stats.results.hits, 0);
    // The mask write succeeded, so detection ran once
    assert_eq!(stats.detections, 1);
    assert_eq!(ctx.failing.as_ref().unwrap().rejected(), 2);
    assert!(ctx.repository.load_mask(&image_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_mask_write_failure_is_internal_and_retried() {
    let ctx = TestContext::builder().fail_writes_under("masks/").build().await;
    let image_id = ctx.upload_scene(320, 240).await;

    let err = ctx.pipeline.detect_surface(&image_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Internal(_)));
    assert!(ctx.repository.load_mask(&image_id).await.unwrap().is_none());

    let err = ctx.pipeline.detect_surface(&image_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Internal(_)));

    let stats = ctx.pipeline.stats();
    assert_eq!(stats.detections, 2);
    assert_eq!(stats.masks.computes, 2);
    assert_eq!(stats.compositions, 0);
}
