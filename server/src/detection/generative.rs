//! Generative-model detector
//!
//! Asks a multimodal model for window bounding boxes as JSON and paints them
//! at image resolution.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::imagery::SourceImage;

use super::detector::SurfaceDetector;
use super::types::{Detection, DetectorError, DetectorKind, PixelRect, paint_rects};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROMPT: &str = "Analyze this image and identify all windows. Return a JSON response with \
the coordinates of each window as pixel bounding boxes in the format: \
{\"windows\": [{\"x\": 0, \"y\": 0, \"width\": 100, \"height\": 100}]}. \
Only return the JSON, no other text.";

/// The model reports no confidence, so its boxes get a fixed one
const GENERATIVE_QUALITY: f32 = 0.6;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Boxes the model is asked to return
#[derive(Debug, Default, Deserialize)]
pub struct WindowBoxes {
    #[serde(default)]
    pub windows: Vec<WindowBox>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WindowBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Strip a surrounding markdown code fence, if the model added one
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") up to the first newline
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse the model's text answer into window boxes
pub fn parse_windows(text: &str) -> Result<WindowBoxes, DetectorError> {
    serde_json::from_str(strip_fences(text))
        .map_err(|e| DetectorError::InvalidResponse(format!("model answer is not window JSON: {}", e)))
}

/// Paint parsed boxes into a mask of the given size
pub fn mask_from_windows(
    windows: &WindowBoxes,
    width: u32,
    height: u32,
) -> Result<Detection, DetectorError> {
    let rects: Vec<PixelRect> = windows
        .windows
        .iter()
        .filter(|w| w.width > 0.0 && w.height > 0.0)
        .map(|w| PixelRect {
            x: w.x,
            y: w.y,
            width: w.width,
            height: w.height,
        })
        .collect();
    if rects.is_empty() {
        return Err(DetectorError::NoSurface);
    }

    let alpha = paint_rects(width, height, &rects);
    if alpha.as_raw().iter().all(|&v| v == 0) {
        return Err(DetectorError::NoSurface);
    }
    Ok(Detection {
        alpha,
        quality: GENERATIVE_QUALITY,
    })
}

/// Multimodal generative model adapter
#[derive(Debug, Clone)]
pub struct GenerativeDetector {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GenerativeDetector {
    /// Build the adapter if an API key is configured
    pub fn from_config(config: &DetectionConfig) -> Result<Option<Self>, DetectorError> {
        let Some(api_key) = &config.gemini_api_key else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(config.generative_timeout)
            .build()
            .map_err(|e| DetectorError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Some(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: config.gemini_model.clone(),
            api_key: api_key.clone(),
            timeout: config.generative_timeout,
        }))
    }

    /// Point the adapter at a different API root
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn ask(&self, image: &SourceImage) -> Result<String, DetectorError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = json!({
            "contents": [{
                "parts": [
                    { "text": PROMPT },
                    { "inline_data": {
                        "mime_type": image.content_type(),
                        "data": BASE64.encode(image.encoded()),
                    }}
                ]
            }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&payload)
            .send()
            .await
            .map_err(|e| DetectorError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| DetectorError::InvalidResponse("no text in model answer".to_string()))
    }
}

#[async_trait]
impl SurfaceDetector for GenerativeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::GenerativeAi
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn detect(&self, image: &SourceImage) -> Result<Detection, DetectorError> {
        let text = self.ask(image).await?;
        let windows = parse_windows(&text)?;
        debug!("Model reported {} windows for {}", windows.windows.len(), image.id());
        mask_from_windows(&windows, image.width(), image.height())
    }
}
