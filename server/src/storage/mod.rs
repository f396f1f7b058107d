//! Artifact storage
//!
//! This module provides:
//! - `ArtifactStore` trait for durable blob storage
//! - `BlobStore` for a remote blob container (primary)
//! - `FilesystemStore` for a local directory (fallback)
//! - `ArtifactRepository` for typed access to images, masks and results
//!
//! The backend is chosen once at startup by `connect_store` and never changes
//! for the lifetime of the process.

mod blob;
mod filesystem;
mod repository;
mod store;
mod types;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StorageConfig;

pub use blob::BlobStore;
pub use filesystem::FilesystemStore;
pub use repository::ArtifactRepository;
pub use store::ArtifactStore;
pub use types::{
    ArtifactLocator, StorageArtifact, StorageError, StorageResult, content_type_for, validate_key,
};

/// Select the storage backend for this process
///
/// The remote store is used only if it is fully configured and passes a
/// reachability probe; otherwise the filesystem store is used. Per-request
/// operations never fall back.
pub async fn connect_store(
    config: &StorageConfig,
    public_base_url: Option<String>,
) -> StorageResult<Arc<dyn ArtifactStore>> {
    if config.blob_account_url.is_some() || config.blob_sas_token.is_some() {
        match BlobStore::from_config(config) {
            Ok(store) => match store.validate(config.validate_timeout).await {
                Ok(()) => {
                    info!("Using blob artifact store ({})", config.blob_container);
                    return Ok(Arc::new(store));
                }
                Err(e) => warn!("Blob store unavailable, falling back to filesystem: {}", e),
            },
            Err(e) => warn!("Blob store misconfigured, falling back to filesystem: {}", e),
        }
    } else {
        info!("Blob store not configured, using filesystem");
    }

    let store = FilesystemStore::new(&config.root, public_base_url).await?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_uses_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let store = connect_store(&config, None).await.unwrap();
        assert_eq!(store.backend(), "filesystem");
    }

    #[tokio::test]
    async fn test_incomplete_blob_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            blob_account_url: Some("https://acct.blob.core.windows.net".to_string()),
            ..StorageConfig::default()
        };
        let store = connect_store(&config, None).await.unwrap();
        assert_eq!(store.backend(), "filesystem");
    }

    #[tokio::test]
    async fn test_unreachable_blob_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            // Nothing listens on the discard port
            blob_account_url: Some("http://127.0.0.1:9".to_string()),
            blob_sas_token: Some("sig=x".to_string()),
            validate_timeout: std::time::Duration::from_millis(500),
            ..StorageConfig::default()
        };
        let store = connect_store(&config, None).await.unwrap();
        assert_eq!(store.backend(), "filesystem");
    }
}
