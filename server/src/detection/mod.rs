//! Surface detection
//!
//! This module provides:
//! - `SurfaceDetector` trait implemented by every detector adapter
//! - `CloudVisionDetector` and `GenerativeDetector` (network-backed)
//! - `LocalHeuristicDetector` (CPU only, always produces a mask)
//! - `DetectionOrchestrator` that runs them as a fallback chain
//! - `MaskQuality`, the acceptance predicate applied to every candidate mask

mod cloud_vision;
mod detector;
mod generative;
mod heuristic;
mod orchestrator;
mod quality;
mod types;

pub use cloud_vision::{CloudVisionDetector, mask_from_analysis};
pub use detector::SurfaceDetector;
pub use generative::{GenerativeDetector, parse_windows};
pub use heuristic::{DEFAULT_WORKING_WIDTH, LocalHeuristicDetector};
pub use orchestrator::DetectionOrchestrator;
pub use quality::{MaskQuality, Rejection};
pub use types::{Detection, DetectorError, DetectorKind, PixelRect, paint_rects, smooth_edges};
