//! Typed access to source images, masks and try-on results
//!
//! Persisted layout:
//! - `uploads/{image_id}`: source image as uploaded
//! - `masks/{image_id}.png` + `masks/{image_id}.json`: mask bitmap and sidecar
//! - `results/{image_id}/{fingerprint16}.png`: composited result

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::covering::Fingerprint;
use crate::imagery::{DetectionMask, MaskMetadata, OverlayResult, SourceImage};

use super::store::ArtifactStore;
use super::types::{ArtifactLocator, StorageArtifact, StorageError, StorageResult, validate_key};

/// Domain-typed wrapper over an `ArtifactStore`
#[derive(Clone)]
pub struct ArtifactRepository {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactRepository {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn upload_key(image_id: &str) -> String {
        format!("uploads/{}", image_id)
    }

    pub fn mask_key(image_id: &str) -> String {
        format!("masks/{}.png", image_id)
    }

    fn mask_metadata_key(image_id: &str) -> String {
        format!("masks/{}.json", image_id)
    }

    pub fn result_key(image_id: &str, fingerprint: &Fingerprint) -> String {
        format!("results/{}/{}.png", image_id, fingerprint.short())
    }

    /// Store a new upload under a fresh identifier
    pub async fn store_upload(&self, bytes: Bytes, content_type: &str) -> StorageResult<String> {
        let image_id = Uuid::new_v4().to_string();
        self.put_source_image(&image_id, bytes, content_type).await?;
        Ok(image_id)
    }

    /// Store an upload under a caller-chosen identifier
    pub async fn put_source_image(
        &self,
        image_id: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> StorageResult<ArtifactLocator> {
        let key = Self::upload_key(image_id);
        validate_key(&key)?;
        self.store
            .put(&key, StorageArtifact::new(bytes, content_type))
            .await
    }

    /// Load and decode a source image
    pub async fn load_source_image(&self, image_id: &str) -> StorageResult<SourceImage> {
        let key = Self::upload_key(image_id);
        validate_key(&key)?;
        let bytes = self.store.get(&key).await?;
        debug!("Loaded source image {} ({} bytes)", image_id, bytes.len());
        SourceImage::decode(image_id, bytes).map_err(|e| StorageError::Corrupt(format!("{}: {}", key, e)))
    }

    /// Persist a mask bitmap and its sidecar metadata
    pub async fn save_mask(&self, mask: &DetectionMask) -> StorageResult<ArtifactLocator> {
        let png = mask
            .to_png()
            .map_err(|e| StorageError::Corrupt(format!("mask {}: {}", mask.id(), e)))?;
        let meta = serde_json::to_vec(&mask.metadata())
            .map_err(|e| StorageError::Corrupt(format!("mask {}: {}", mask.id(), e)))?;

        // Bitmap first: a sidecar without its bitmap would make load_mask fail
        let locator = self
            .store
            .put(&Self::mask_key(mask.image_id()), StorageArtifact::png(png))
            .await?;
        self.store
            .put(
                &Self::mask_metadata_key(mask.image_id()),
                StorageArtifact::json(Bytes::from(meta)),
            )
            .await?;
        Ok(locator)
    }

    /// Load a previously persisted mask, if any
    pub async fn load_mask(&self, image_id: &str) -> StorageResult<Option<DetectionMask>> {
        let meta_bytes = match self.store.get(&Self::mask_metadata_key(image_id)).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let meta: MaskMetadata = serde_json::from_slice(&meta_bytes)
            .map_err(|e| StorageError::Corrupt(format!("mask metadata {}: {}", image_id, e)))?;

        let png = match self.store.get(&Self::mask_key(image_id)).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let mask = DetectionMask::from_png(&png, &meta)
            .map_err(|e| StorageError::Corrupt(format!("mask {}: {}", image_id, e)))?;
        Ok(Some(mask))
    }

    /// Persist a composited result
    pub async fn save_result(&self, result: &OverlayResult) -> StorageResult<ArtifactLocator> {
        let png = result
            .to_png()
            .map_err(|e| StorageError::Corrupt(format!("result {}: {}", result.id, e)))?;
        self.store
            .put(
                &Self::result_key(&result.image_id, &result.id),
                StorageArtifact::png(png),
            )
            .await
    }

    /// Remove an image and its derived mask
    pub async fn delete_image(&self, image_id: &str) -> StorageResult<()> {
        self.store.delete(&Self::upload_key(image_id)).await?;
        self.store.delete(&Self::mask_metadata_key(image_id)).await?;
        self.store.delete(&Self::mask_key(image_id)).await
    }
}
