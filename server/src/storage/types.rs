//! Storage-related types and error definitions

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when reading or writing artifacts
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Stored artifact is unreadable: {0}")]
    Corrupt(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// URL-like reference through which a persisted artifact can be retrieved
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactLocator(String);

impl ArtifactLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque blob plus its content type
#[derive(Debug, Clone)]
pub struct StorageArtifact {
    pub bytes: Bytes,
    pub content_type: String,
}

impl StorageArtifact {
    pub fn new(bytes: Bytes, content_type: &str) -> Self {
        Self {
            bytes,
            content_type: content_type.to_string(),
        }
    }

    pub fn png(bytes: Bytes) -> Self {
        Self::new(bytes, "image/png")
    }

    pub fn json(bytes: Bytes) -> Self {
        Self::new(bytes, "application/json")
    }
}

/// Reject keys that could escape a namespace or the store root
///
/// Segments are limited to `[A-Za-z0-9._-]`, so a key can be placed in a
/// URL path or a file path verbatim.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    for segment in key.split('/') {
        let plain = segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if segment.is_empty() || segment == "." || segment == ".." || !plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
    }
    Ok(())
}

/// Content type from the key's extension (filesystem keeps no metadata)
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "json" => "application/json",
        _ => "application/octet-stream",
    }
}
