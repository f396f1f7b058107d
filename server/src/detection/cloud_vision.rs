//! Cloud vision detector
//!
//! Sends the encoded image to an object-detection REST service and turns the
//! returned bounding boxes into a mask. Boxes are selected in order of
//! preference:
//! 1. objects whose label names a window-like thing
//! 2. any large object, when the scene is tagged as window/interior
//! 3. any very large object
//!
//! If that yields almost nothing, a caption mentioning a window produces a
//! centred square.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::imagery::SourceImage;

use super::detector::SurfaceDetector;
use super::types::{Detection, DetectorError, DetectorKind, PixelRect, paint_rects, smooth_edges};

const OBJECT_KEYWORDS: &[&str] = &["window", "glass", "pane", "frame"];
const SCENE_TAGS: &[&str] = &["window", "glass", "interior", "room"];
const CAPTION_KEYWORDS: &[&str] = &["window", "glass"];

const MIN_OBJECT_CONFIDENCE: f32 = 0.5;
const MIN_TAG_CONFIDENCE: f32 = 0.7;
const MIN_CAPTION_CONFIDENCE: f32 = 0.7;

/// Object share of the frame admitted when the scene tags look right
const TAGGED_OBJECT_AREA: f32 = 0.10;
/// Object share of the frame admitted with no other evidence
const LARGE_OBJECT_AREA: f32 = 0.15;

/// Below this many set pixels the caption fallback is tried
const MIN_MASK_PIXELS: usize = 1000;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Response body of the analyze call (only the fields we use)
#[derive(Debug, Default, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub tags: Vec<ImageTag>,
    #[serde(default)]
    pub description: Option<ImageDescription>,
}

#[derive(Debug, Deserialize)]
pub struct DetectedObject {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub confidence: f32,
    pub rectangle: Option<BoundingBox>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub w: f32,
    #[serde(default)]
    pub h: f32,
}

#[derive(Debug, Deserialize)]
pub struct ImageTag {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageDescription {
    #[serde(default)]
    pub captions: Vec<Caption>,
}

#[derive(Debug, Deserialize)]
pub struct Caption {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
}

fn mentions(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|k| text.contains(k))
}

/// Build a mask from an analysis of a `width` x `height` image
pub fn mask_from_analysis(
    analysis: &Analysis,
    width: u32,
    height: u32,
) -> Result<Detection, DetectorError> {
    let frame_area = width as f32 * height as f32;
    let boxed = || {
        analysis
            .objects
            .iter()
            .filter_map(|o| o.rectangle.map(|r| (o, r)))
    };

    let mut selected: Vec<(&DetectedObject, BoundingBox)> = boxed()
        .filter(|(o, _)| mentions(&o.object, OBJECT_KEYWORDS) && o.confidence > MIN_OBJECT_CONFIDENCE)
        .collect();

    let scene_tagged = analysis
        .tags
        .iter()
        .any(|t| mentions(&t.name, SCENE_TAGS) && t.confidence > MIN_TAG_CONFIDENCE);
    if scene_tagged {
        selected.extend(boxed().filter(|(_, r)| r.w * r.h > frame_area * TAGGED_OBJECT_AREA));
    }

    if selected.is_empty() {
        selected.extend(boxed().filter(|(_, r)| r.w * r.h > frame_area * LARGE_OBJECT_AREA));
    }

    let rects: Vec<PixelRect> = selected
        .iter()
        .map(|(_, r)| {
            let pad = (r.w.min(r.h) * 0.1).max(10.0);
            PixelRect {
                x: r.x,
                y: r.y,
                width: r.w,
                height: r.h,
            }
            .padded(pad, width, height)
        })
        .collect();
    let mut quality = selected
        .iter()
        .map(|(o, _)| o.confidence)
        .fold(0.0_f32, f32::max);

    let mut mask = paint_rects(width, height, &rects);
    let set = mask.as_raw().iter().filter(|&&v| v > 0).count();

    if set < MIN_MASK_PIXELS {
        let caption = analysis.description.as_ref().and_then(|d| {
            d.captions
                .iter()
                .find(|c| mentions(&c.text, CAPTION_KEYWORDS) && c.confidence > MIN_CAPTION_CONFIDENCE)
        });
        if let Some(caption) = caption {
            debug!("Falling back to caption \"{}\"", caption.text);
            let side = (width.min(height) / 2) as f32;
            let centre = PixelRect {
                x: (width / 2) as f32 - side / 2.0,
                y: (height / 2) as f32 - side / 2.0,
                width: side,
                height: side,
            };
            mask = paint_rects(width, height, &[centre]);
            quality = quality.max(caption.confidence);
        }
    }

    let mask = smooth_edges(&mask, 2.0);
    if mask.as_raw().iter().all(|&v| v == 0) {
        return Err(DetectorError::NoSurface);
    }

    Ok(Detection {
        alpha: mask,
        quality,
    })
}

/// Object-detection REST service adapter
#[derive(Debug, Clone)]
pub struct CloudVisionDetector {
    client: Client,
    analyze_url: String,
    key: String,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl CloudVisionDetector {
    /// Build the adapter if both endpoint and key are configured
    pub fn from_config(config: &DetectionConfig) -> Result<Option<Self>, DetectorError> {
        let (Some(endpoint), Some(key)) = (&config.vision_endpoint, &config.vision_key) else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(config.cloud_timeout)
            .build()
            .map_err(|e| DetectorError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Some(Self::new(client, endpoint, key, config.cloud_timeout)))
    }

    pub fn new(client: Client, endpoint: &str, key: &str, timeout: Duration) -> Self {
        Self {
            client,
            analyze_url: analyze_url(endpoint),
            key: key.to_string(),
            timeout,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Base delay between rate-limited attempts (doubles each time)
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn analyze(&self, image: &SourceImage) -> Result<Analysis, DetectorError> {
        let mut last_error = DetectorError::Request("no attempt made".to_string());

        for attempt in 0..self.max_attempts {
            let response = self
                .client
                .post(&self.analyze_url)
                .query(&[("visualFeatures", "Objects,Tags,Description"), ("language", "en")])
                .header("Ocp-Apim-Subscription-Key", &self.key)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(image.encoded().clone())
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!("Cloud vision request failed (attempt {}): {}", attempt + 1, e);
                    last_error = DetectorError::Request(e.to_string());
                    tokio::time::sleep(self.retry_delay * (attempt + 1)).await;
                    continue;
                }
            };

            match response.status() {
                StatusCode::OK => {
                    return response
                        .json::<Analysis>()
                        .await
                        .map_err(|e| DetectorError::InvalidResponse(e.to_string()));
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    counter!("blindview_detector_rate_limited_total", "detector" => "cloud-vision")
                        .increment(1);
                    let wait = self.retry_delay * 2u32.pow(attempt);
                    warn!("Cloud vision rate limited, waiting {:?}", wait);
                    last_error = DetectorError::Status {
                        status: 429,
                        body: "rate limited".to_string(),
                    };
                    tokio::time::sleep(wait).await;
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(DetectorError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }

        Err(last_error)
    }
}

/// Accept endpoints with or without the `/vision` path segment
fn analyze_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.to_lowercase().contains("/vision") {
        format!("{}/v3.2/analyze", endpoint)
    } else {
        format!("{}/vision/v3.2/analyze", endpoint)
    }
}

#[async_trait]
impl SurfaceDetector for CloudVisionDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::CloudVision
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn detect(&self, image: &SourceImage) -> Result<Detection, DetectorError> {
        let analysis = self.analyze(image).await?;
        debug!(
            "Cloud vision returned {} objects, {} tags for {}",
            analysis.objects.len(),
            analysis.tags.len(),
            image.id()
        );
        mask_from_analysis(&analysis, image.width(), image.height())
    }
}
