//! BlindView Server Library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod cache;
pub mod compose;
pub mod config;
pub mod covering;
pub mod detection;
pub mod imagery;
pub mod pipeline;
pub mod routes;
pub mod storage;

// Re-export commonly used types
pub use compose::OverlayEngine;
pub use covering::{CoveringRequest, CoveringSpec, Fingerprint};
pub use detection::{DetectionOrchestrator, SurfaceDetector};
pub use imagery::{DetectionMask, OverlayResult, SourceImage};
pub use pipeline::{PipelineError, TryOnPipeline};
pub use routes::{AppState, app_routes};
pub use storage::{ArtifactRepository, ArtifactStore, connect_store};
