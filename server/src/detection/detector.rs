//! SurfaceDetector trait definition

use std::time::Duration;

use async_trait::async_trait;

use crate::imagery::SourceImage;

use super::types::{Detection, DetectorError, DetectorKind};

/// One way of producing a surface mask from an image
///
/// Network-backed adapters own their authentication and rate-limit handling;
/// the orchestrator only bounds them with `timeout()`.
#[async_trait]
pub trait SurfaceDetector: Send + Sync {
    /// Tag recorded on masks this adapter produces
    fn kind(&self) -> DetectorKind;

    /// Upper bound the orchestrator allows for one `detect` call
    fn timeout(&self) -> Duration;

    /// Produce a mask for the image
    async fn detect(&self, image: &SourceImage) -> Result<Detection, DetectorError>;
}
