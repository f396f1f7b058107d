//! ArtifactStore trait definition

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{ArtifactLocator, StorageArtifact, StorageResult};

/// Durable blob storage (remote object store or local filesystem)
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Persist an artifact, returning where it can be retrieved
    async fn put(&self, key: &str, artifact: StorageArtifact) -> StorageResult<ArtifactLocator>;

    /// Read an artifact's bytes
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Remove an artifact; removing a missing key is not an error
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Locator for a key, whether or not it has been written yet
    fn locator_for(&self, key: &str) -> ArtifactLocator;

    /// Check if an artifact exists
    async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_ok()
    }
}
