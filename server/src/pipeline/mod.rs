//! Try-on pipeline
//!
//! `TryOnPipeline` exposes the two operations the HTTP layer needs:
//! - `detect_surface(image_id)` returns the accepted mask for an image
//! - `try_on(image_id, covering)` returns the locator of the composited result
//!
//! Both are memoized in `ResultCache`s and persisted through the
//! `ArtifactRepository` before being shared.

mod service;
mod types;

pub use service::TryOnPipeline;
pub use types::{PipelineError, PipelineSnapshot, PipelineStats, SurfaceReport, TryOnOutcome};
