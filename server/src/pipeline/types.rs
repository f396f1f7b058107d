//! Pipeline types and error definitions

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;

use crate::cache::{CacheError, CacheStats};
use crate::compose::ComposeError;
use crate::covering::{CoveringError, CoveringSpec, Fingerprint};
use crate::detection::{DetectorError, DetectorKind};
use crate::storage::{ArtifactLocator, StorageError};

/// Request-level failure categories
///
/// Payloads are strings so one failure can be handed to every caller that
/// was waiting on the same computation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    Input(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CoveringError> for PipelineError {
    fn from(e: CoveringError) -> Self {
        PipelineError::Input(e.to_string())
    }
}

impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => PipelineError::NotFound(key),
            StorageError::InvalidKey(_) | StorageError::Corrupt(_) => {
                PipelineError::Input(e.to_string())
            }
            other => PipelineError::Internal(other.to_string()),
        }
    }
}

impl From<ComposeError> for PipelineError {
    fn from(e: ComposeError) -> Self {
        if e.is_input() {
            PipelineError::Input(e.to_string())
        } else {
            PipelineError::Internal(e.to_string())
        }
    }
}

impl From<DetectorError> for PipelineError {
    fn from(e: DetectorError) -> Self {
        PipelineError::Internal(format!("detection failed: {}", e))
    }
}

impl From<CacheError> for PipelineError {
    fn from(e: CacheError) -> Self {
        PipelineError::Internal(e.to_string())
    }
}

/// Result of a successful try-on
#[derive(Debug, Clone, Serialize)]
pub struct TryOnOutcome {
    pub result_id: Fingerprint,
    pub result_locator: ArtifactLocator,
    pub covering: CoveringSpec,
    pub mask_id: String,
}

/// Result of surface detection
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceReport {
    pub mask_id: String,
    pub produced_by: DetectorKind,
    pub quality: f32,
    pub coverage: f32,
}

/// Counters of expensive work actually performed
#[derive(Debug, Default)]
pub struct PipelineStats {
    detections: AtomicU64,
    compositions: AtomicU64,
}

impl PipelineStats {
    pub fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_composition(&self) {
        self.compositions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    pub fn compositions(&self) -> u64 {
        self.compositions.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of pipeline activity
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub detections: u64,
    pub compositions: u64,
    pub masks: CacheStats,
    pub results: CacheStats,
}
