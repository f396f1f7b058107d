//! Overlay engine
//!
//! This module provides:
//! - `OverlayEngine` that composites a covering into a masked region
//! - mask/image dimension reconciliation
//! - procedural patterns and materials
//! - `TextureLibrary` with tiling and tint for texture coverings

mod engine;
mod pattern;
mod reconcile;
mod texture;
mod types;

pub use engine::{OverlayEngine, composite};
pub use pattern::render_pattern;
pub use reconcile::{aspect_compatible, reconcile_mask};
pub use texture::{TextureLibrary, render_texture};
pub use types::{BlendSettings, ComposeError};
