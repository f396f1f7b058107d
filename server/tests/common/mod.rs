//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use blindview_server::config::{CacheConfig, DetectionConfig, OverlayConfig};
use blindview_server::detection::{
    Detection, DetectionOrchestrator, DetectorError, DetectorKind, LocalHeuristicDetector,
    MaskQuality, SurfaceDetector,
};
use blindview_server::imagery::SourceImage;
use blindview_server::routes::{AppState, app_routes};
use blindview_server::storage::{
    ArtifactLocator, ArtifactRepository, ArtifactStore, FilesystemStore, StorageArtifact,
    StorageError, StorageResult,
};
use blindview_server::{OverlayEngine, TryOnPipeline};
use bytes::Bytes;
use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Plain wall with a framed, slatted window in the middle half
pub fn window_scene(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, Rgb([200, 200, 195]));
    let (x0, y0, x1, y1) = (width / 4, height / 4, width * 3 / 4, height * 3 / 4);
    for y in y0..y1 {
        for x in x0..x1 {
            let frame = x < x0 + 8 || x >= x1 - 8 || y < y0 + 8 || y >= y1 - 8;
            let mullion = (y - y0) % 40 < 4 || (x - x0) % 60 < 4;
            let value = if frame || mullion { 40 } else { 120 };
            img.put_pixel(x, y, Rgb([value, value, value + 20]));
        }
    }
    img
}

/// Encode an RGB image as PNG bytes
pub fn encode_png(image: &RgbImage) -> Bytes {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("Failed to encode test image");
    Bytes::from(buffer.into_inner())
}

/// Adapter with a fixed script: optional delay, then a mask over the top
/// `fraction` of rows or a 503 when `fraction` is `None`
pub struct ScriptedDetector {
    kind: DetectorKind,
    delay: Duration,
    timeout: Duration,
    fraction: Option<f32>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(kind: DetectorKind, fraction: Option<f32>) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
            fraction,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: Duration, timeout: Duration) -> Self {
        self.delay = delay;
        self.timeout = timeout;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
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
        Ok(Detection {
            alpha,
            quality: 0.8,
        })
    }
}

/// Filesystem store whose writes fail for keys under a prefix
pub struct FailingStore {
    inner: FilesystemStore,
    prefix: String,
    rejected: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: FilesystemStore, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
            rejected: AtomicUsize::new(0),
        }
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for FailingStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn put(&self, key: &str, artifact: StorageArtifact) -> StorageResult<ArtifactLocator> {
        if key.starts_with(&self.prefix) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Remote(format!("503 writing {}", key)));
        }
        self.inner.put(key, artifact).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    fn locator_for(&self, key: &str) -> ArtifactLocator {
        self.inner.locator_for(key)
    }
}

/// Pipeline over a temporary filesystem store and texture directory
pub struct TestContext {
    pub dir: TempDir,
    pub repository: ArtifactRepository,
    pub pipeline: Arc<TryOnPipeline>,
    /// Set when built with `fail_writes_under`
    pub failing: Option<Arc<FailingStore>>,
}

pub struct TestContextBuilder {
    adapters: Vec<Arc<dyn SurfaceDetector>>,
    working_width: Option<u32>,
    cache: CacheConfig,
    failing_prefix: Option<String>,
}

impl TestContextBuilder {
    pub fn adapter(mut self, adapter: Arc<dyn SurfaceDetector>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn working_width(mut self, width: u32) -> Self {
        self.working_width = Some(width);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Make every store write under `prefix` fail
    pub fn fail_writes_under(mut self, prefix: &str) -> Self {
        self.failing_prefix = Some(prefix.to_string());
        self
    }

    pub async fn build(self) -> TestContext {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let textures_dir = dir.path().join("textures");
        std::fs::create_dir_all(&textures_dir).expect("Failed to create textures dir");

        let store = FilesystemStore::new(dir.path().join("artifacts"), None)
            .await
            .expect("Failed to create store");
        let (repository, failing) = match self.failing_prefix {
            Some(prefix) => {
                let failing = Arc::new(FailingStore::new(store, prefix));
                (ArtifactRepository::new(failing.clone()), Some(failing))
            }
            None => (ArtifactRepository::new(Arc::new(store)), None),
        };

        let detection = DetectionConfig::default();
        let mut terminal = LocalHeuristicDetector::from_config(&detection);
        if let Some(width) = self.working_width {
            terminal = terminal.with_working_width(width);
        }
        let orchestrator =
            DetectionOrchestrator::new(self.adapters, terminal, MaskQuality::from_config(&detection));

        let overlay = OverlayConfig {
            textures_dir,
            ..OverlayConfig::default()
        };
        let engine = OverlayEngine::from_config(&overlay, detection.aspect_tolerance);

        let pipeline = Arc::new(TryOnPipeline::new(
            repository.clone(),
            orchestrator,
            engine,
            &self.cache,
        ));

        TestContext {
            dir,
            repository,
            pipeline,
            failing,
        }
    }
}

impl TestContext {
    pub fn builder() -> TestContextBuilder {
        TestContextBuilder {
            adapters: Vec::new(),
            working_width: None,
            cache: CacheConfig::default(),
            failing_prefix: None,
        }
    }

    /// Context with only the local heuristic configured
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    /// Upload a window scene and return its image id
    pub async fn upload_scene(&self, width: u32, height: u32) -> String {
        self.repository
            .store_upload(encode_png(&window_scene(width, height)), "image/png")
            .await
            .expect("Failed to upload test image")
    }

    /// Write a texture bitmap into the library directory
    pub fn add_texture(&self, name: &str, image: &RgbImage) {
        image
            .save(self.dir.path().join("textures").join(name))
            .expect("Failed to write texture");
    }

    /// Router over this context's pipeline
    pub fn router(&self) -> Router {
        app_routes(AppState {
            pipeline: self.pipeline.clone(),
        })
    }
}
