//! Local filesystem artifact store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use super::store::ArtifactStore;
use super::types::{ArtifactLocator, StorageArtifact, StorageError, StorageResult, validate_key};

/// Artifact store rooted at a local directory
pub struct FilesystemStore {
    root: PathBuf,
    /// When set, locators point at the server's `/artifacts` route
    public_base_url: Option<String>,
}

impl FilesystemStore {
    /// Create the store, creating the root directory if needed
    pub async fn new(root: impl AsRef<Path>, public_base_url: Option<String>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        info!("Initialized filesystem artifact store at {:?}", root);
        Ok(Self {
            root,
            public_base_url,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    fn backend(&self) -> &'static str {
        "filesystem"
    }

    async fn put(&self, key: &str, artifact: StorageArtifact) -> StorageResult<ArtifactLocator> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Temp file + rename: readers never see a partial write
        let temp_path = path.with_file_name(format!(
            "{}.tmp.{}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Uuid::new_v4()
        ));
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&artifact.bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        counter!("blindview_storage_writes_total", "backend" => "filesystem").increment(1);
        debug!("Stored {} ({} bytes) at {:?}", key, artifact.bytes.len(), path);
        Ok(self.locator_for(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn locator_for(&self, key: &str) -> ArtifactLocator {
        match &self.public_base_url {
            Some(base) => ArtifactLocator::new(format!("{}/artifacts/{}", base, key)),
            None => ArtifactLocator::new(format!("file://{}", self.root.join(key).display())),
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.key_path(key) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}
