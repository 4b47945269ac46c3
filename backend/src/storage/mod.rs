//! Object storage for inspection media and records.
//!
//! Both backends sit on [`object_store`]:
//!
//! - [`S3Storage`] issues real SigV4 presigned URLs so clients upload
//!   straight to the bucket.
//! - [`LocalStorage`] keeps objects on disk (or in memory for tests) and
//!   issues HMAC-signed URLs pointing back at this server's upload proxy.

pub mod keys;
pub mod local;
mod object;
pub mod s3;
pub mod signing;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, StorageKind};
use crate::error::{StorageError, StorageResult};

pub use local::LocalStorage;
pub use s3::S3Storage;
pub use signing::{SignatureParams, UploadSigner};

/// Object body plus the content type it was stored with, when the backend
/// keeps one.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Storage operations used by the intake service and the repository.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Canonical URL of an object, as stored in inspection records.
    fn public_url(&self, key: &str) -> String;

    /// Time-limited URL accepting an HTTP PUT of the object body.
    async fn presigned_put_url(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Time-limited URL for reading an object.
    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    async fn put_bytes(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Like [`put_bytes`](Self::put_bytes), but fails with
    /// [`StorageError::AlreadyExists`] when `key` is taken.
    async fn create_bytes(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    async fn get_object(&self, key: &str) -> StorageResult<StoredObject>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Objects under `prefix`, sorted by key.
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn get_bytes(&self, key: &str) -> StorageResult<Bytes> {
        Ok(self.get_object(key).await?.bytes)
    }

    /// Keys under `prefix`, sorted ascending.
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let objects = self.list_objects(prefix).await?;
        Ok(objects.into_iter().map(|o| o.key).collect())
    }

    async fn put_json(&self, key: &str, value: &Value) -> StorageResult<()> {
        let body = serde_json::to_vec_pretty(value)?;
        self.put_bytes(key, Bytes::from(body), "application/json").await
    }

    async fn create_json(&self, key: &str, value: &Value) -> StorageResult<()> {
        let body = serde_json::to_vec_pretty(value)?;
        self.create_bytes(key, Bytes::from(body), "application/json").await
    }

    async fn get_json(&self, key: &str) -> StorageResult<Value> {
        let body = self.get_bytes(key).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Build the configured backend.
///
/// Returns the storage plus the proxy signer when the local backend is used.
pub async fn build_storage(
    config: &Config,
) -> StorageResult<(Arc<dyn ObjectStorage>, Option<UploadSigner>)> {
    match config.storage {
        StorageKind::S3 => {
            let bucket = config.s3_bucket.clone().ok_or_else(|| {
                StorageError::Config("S3_BUCKET must be set for the s3 backend".to_string())
            })?;
            let storage = S3Storage::new(
                bucket,
                config.aws_region.clone(),
                config.s3_endpoint.clone(),
                config.s3_public_base_url.clone(),
            )?;
            Ok((Arc::new(storage), None))
        }
        StorageKind::Local => {
            let signer = UploadSigner::new(&config.signing_secret, &config.public_base_url);
            let storage = LocalStorage::on_disk(&config.local_storage_dir, signer.clone())?;
            Ok((Arc::new(storage), Some(signer)))
        }
    }
}
