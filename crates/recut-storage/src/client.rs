//! GCS JSON API client over ambient credentials.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gcp_auth::TokenProvider;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

const STORAGE_API: &str = "https://storage.googleapis.com";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Configuration for the GCS client.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// Bucket name
    pub bucket_name: String,
    /// Service account email used for impersonated URL signing, if any.
    pub signer_service_account: Option<String>,
    /// Whether the bucket policy permits public reads, making
    /// URL-by-convention valid. Per-object ACLs are never assumed.
    pub public_bucket: bool,
    /// Request timeout
    pub timeout: Duration,
}

impl GcsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            bucket_name: std::env::var("GCS_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("GCS_BUCKET_NAME not set"))?,
            signer_service_account: std::env::var("GCS_SIGNER_SERVICE_ACCOUNT")
                .ok()
                .filter(|s| !s.is_empty()),
            public_bucket: std::env::var("GCS_PUBLIC_BUCKET")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            timeout: Duration::from_secs(120),
        })
    }
}

/// Google Cloud Storage client (JSON API + ambient credentials).
pub struct GcsClient {
    http: Client,
    auth: Arc<dyn TokenProvider>,
    config: GcsConfig,
}

impl Clone for GcsClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            auth: Arc::clone(&self.auth),
            config: self.config.clone(),
        }
    }
}

impl GcsClient {
    /// Create a new GCS client from configuration.
    pub async fn new(config: GcsConfig) -> StorageResult<Self> {
        let auth = gcp_auth::provider()
            .await
            .map_err(|e| StorageError::auth_error(e.to_string()))?;

        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { http, auth, config })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = GcsConfig::from_env()?;
        Self::new(config).await
    }

    /// Bucket this client writes to.
    pub fn bucket(&self) -> &str {
        &self.config.bucket_name
    }

    /// Configured signer identity, if any.
    pub fn signer(&self) -> Option<&str> {
        self.config.signer_service_account.as_deref()
    }

    pub(crate) async fn token(&self, scope: &str) -> StorageResult<String> {
        let token = self
            .auth
            .token(&[scope])
            .await
            .map_err(|e| StorageError::auth_error(e.to_string()))?;
        Ok(token.as_str().to_string())
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Upload bytes under a key.
    pub async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to gs://{}/{}", data.len(), self.bucket(), key);

        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            STORAGE_API,
            self.bucket(),
            urlencoding::encode(key)
        );
        let token = self.token(STORAGE_SCOPE).await?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::upload_failed(format!(
                "PUT {} failed with {}: {}",
                key, status, body
            )));
        }

        Ok(())
    }

    /// Upload a local file under a key.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        self.upload_bytes(data, key, content_type).await?;
        info!("Uploaded {} to gs://{}/{}", path.display(), self.bucket(), key);
        Ok(())
    }

    /// Download an object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading gs://{}/{}", self.bucket(), key);

        let url = format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            STORAGE_API,
            self.bucket(),
            urlencoding::encode(key)
        );
        let token = self.token(STORAGE_SCOPE).await?;

        let response = self.http.get(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::not_found(key)),
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::DownloadFailed(format!(
                    "GET {} failed with {}: {}",
                    key, status, body
                )))
            }
        }
    }

    /// Download an object to a local file.
    pub async fn download_file(&self, key: &str, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        let bytes = self.download_bytes(key).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;

        info!("Downloaded gs://{}/{} to {}", self.bucket(), key, path.display());
        Ok(())
    }

    /// Check whether an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            STORAGE_API,
            self.bucket(),
            urlencoding::encode(key)
        );
        let token = self.token(STORAGE_SCOPE).await?;

        let response = self.http.get(&url).bearer_auth(&token).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::ListFailed(format!(
                    "HEAD {} failed with {}: {}",
                    key, status, body
                )))
            }
        }
    }

    /// List objects under a prefix.
    pub async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let token = self.token(STORAGE_SCOPE).await?;
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/storage/v1/b/{}/o?prefix={}",
                STORAGE_API,
                self.bucket(),
                urlencoding::encode(prefix)
            );
            if let Some(ref t) = page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(t)));
            }

            let response = self.http.get(&url).bearer_auth(&token).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(StorageError::ListFailed(format!(
                    "LIST {} failed with {}: {}",
                    prefix, status, body
                )));
            }

            let page: ListResponse = response.json().await?;
            for item in page.items {
                objects.push(ObjectInfo {
                    key: item.name,
                    size: item.size.and_then(|s| s.parse().ok()).unwrap_or(0),
                    updated: item.updated,
                });
            }

            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        Ok(objects)
    }

    /// Delete an object. A missing object is not an error.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            STORAGE_API,
            self.bucket(),
            urlencoding::encode(key)
        );
        let token = self.token(STORAGE_SCOPE).await?;

        let response = self.http.delete(&url).bearer_auth(&token).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::DeleteFailed(format!(
                    "DELETE {} failed with {}: {}",
                    key, status, body
                )))
            }
        }
    }

    /// Store a small JSON state blob.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let data = serde_json::to_vec(value)?;
        self.upload_bytes(data, key, "application/json").await
    }

    /// Retrieve a JSON state blob; `None` when the key does not exist.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.download_bytes(key).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Public URL by bucket convention. Per-object ACLs are not assumed;
    /// this is only valid when the bucket policy permits public reads.
    pub fn public_url(&self, key: &str) -> String {
        public_url(self.bucket(), key)
    }

    /// Best URL available for external backends: signed when a signer is
    /// configured, else public-by-convention when the bucket allows it.
    ///
    /// Errors with `SignFailed` when neither works; callers that hold the
    /// bytes locally can then fall back to an inline data URI.
    pub async fn url_for(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        if self.signer().is_some() {
            match self.signed_url(key, "GET", ttl).await {
                Ok(url) => return Ok(url),
                Err(e) if self.config.public_bucket => {
                    warn!("Signed URL failed, falling back to public URL: {}", e)
                }
                Err(e) => return Err(e),
            }
        }
        if self.config.public_bucket {
            return Ok(self.public_url(key));
        }
        Err(StorageError::sign_failed(
            "No signer configured and bucket is not public",
        ))
    }
}

/// Build the public-by-convention URL for a key.
pub(crate) fn public_url(bucket: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect();
    format!("{}/{}/{}", STORAGE_API, bucket, encoded.join("/"))
}

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp (RFC3339)
    pub updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
    size: Option<String>,
    updated: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_encoding() {
        assert_eq!(
            public_url("my-bucket", "jobs/abc123/input.mp4"),
            "https://storage.googleapis.com/my-bucket/jobs/abc123/input.mp4"
        );
        // Spaces and odd characters are percent-encoded per segment.
        assert_eq!(
            public_url("b", "jobs/a b/c.mp4"),
            "https://storage.googleapis.com/b/jobs/a%20b/c.mp4"
        );
    }

    #[test]
    fn test_config_requires_bucket() {
        std::env::remove_var("GCS_BUCKET_NAME");
        assert!(matches!(
            GcsConfig::from_env(),
            Err(StorageError::ConfigError(_))
        ));
    }
}
