//! Remote blob-container artifact store
//!
//! Talks to a blob container over its REST interface using a shared access
//! signature, so no SDK or key signing is needed:
//! - `PUT {account}/{container}/{key}?{sas}` with `x-ms-blob-type: BlockBlob`
//! - `GET` / `DELETE` on the same URL
//! - `GET {account}/{container}?restype=container&{sas}` to validate at startup

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use reqwest::{Client, StatusCode, header};
use tracing::{debug, info};

use crate::config::StorageConfig;

use super::store::ArtifactStore;
use super::types::{ArtifactLocator, StorageArtifact, StorageError, StorageResult, validate_key};

/// Per-request timeout for blob operations
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Artifact store backed by a remote blob container
pub struct BlobStore {
    client: Client,
    account_url: String,
    container: String,
    /// SAS query string without the leading `?`
    sas_token: String,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("account_url", &self.account_url)
            .field("container", &self.container)
            .field("sas_token", &"<redacted>")
            .finish()
    }
}

impl BlobStore {
    /// Build from configuration; fails if account URL or SAS token is missing
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let account_url = config
            .blob_account_url
            .as_deref()
            .ok_or_else(|| StorageError::Config("BLOB_ACCOUNT_URL not set".to_string()))?;
        let sas_token = config
            .blob_sas_token
            .as_deref()
            .ok_or_else(|| StorageError::Config("BLOB_SAS_TOKEN not set".to_string()))?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(
            client,
            account_url,
            &config.blob_container,
            sas_token,
        ))
    }

    pub fn with_client(client: Client, account_url: &str, container: &str, sas_token: &str) -> Self {
        Self {
            client,
            account_url: account_url.trim_end_matches('/').to_string(),
            container: container.to_string(),
            sas_token: sas_token.trim_start_matches('?').to_string(),
        }
    }

    /// Check that the container is reachable and the credentials are accepted
    pub async fn validate(&self, timeout: Duration) -> StorageResult<()> {
        let url = format!(
            "{}/{}?restype=container&{}",
            self.account_url, self.container, self.sas_token
        );
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("container probe failed: {}", e)))?;

        if response.status().is_success() {
            info!(
                "Blob container {}/{} is reachable",
                self.account_url, self.container
            );
            Ok(())
        } else {
            Err(StorageError::Remote(format!(
                "container probe returned {}",
                response.status()
            )))
        }
    }

    fn signed_url(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!(
            "{}/{}/{}?{}",
            self.account_url, self.container, key, self.sas_token
        ))
    }
}

#[async_trait]
impl ArtifactStore for BlobStore {
    fn backend(&self) -> &'static str {
        "blob"
    }

    async fn put(&self, key: &str, artifact: StorageArtifact) -> StorageResult<ArtifactLocator> {
        let url = self.signed_url(key)?;
        let size = artifact.bytes.len();
        let response = self
            .client
            .put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .header(header::CONTENT_TYPE, artifact.content_type)
            .body(artifact.bytes)
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("upload of {} failed: {}", key, e)))?;

        if !response.status().is_success() {
            return Err(StorageError::Remote(format!(
                "upload of {} returned {}",
                key,
                response.status()
            )));
        }

        counter!("blindview_storage_writes_total", "backend" => "blob").increment(1);
        debug!("Uploaded {} ({} bytes) to blob container", key, size);
        Ok(self.locator_for(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let url = self.signed_url(key)?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("download of {} failed: {}", key, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| StorageError::Remote(format!("download of {} failed: {}", key, e))),
            status => Err(StorageError::Remote(format!(
                "download of {} returned {}",
                key, status
            ))),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let url = self.signed_url(key)?;
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("delete of {} failed: {}", key, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(StorageError::Remote(format!(
                "delete of {} returned {}",
                key, status
            ))),
        }
    }

    fn locator_for(&self, key: &str) -> ArtifactLocator {
        ArtifactLocator::new(format!("{}/{}/{}", self.account_url, self.container, key))
    }
}
