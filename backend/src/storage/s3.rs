use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder, S3ConditionalPut};
use object_store::path::Path;
use object_store::signer::Signer;
use std::sync::Arc;
use std::time::Duration;

use super::keys::validate_key;
use super::object::ObjectOps;
use super::{ObjectInfo, ObjectStorage, StoredObject};
use crate::error::{StorageError, StorageResult};

/// S3 (or S3-compatible) storage with direct browser uploads.
#[derive(Clone)]
pub struct S3Storage {
    signer: AmazonS3,
    ops: ObjectOps,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    public_base_url: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint (e.g. `http://localhost:9000` for MinIO)
    /// * `public_base_url` - Optional CDN or website base used for record URLs
    ///
    /// Credentials come from the usual `AWS_*` environment variables.
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        public_base_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone())
            .with_conditional_put(S3ConditionalPut::ETagMatch);

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        tracing::info!(bucket = %bucket, region = %region, endpoint = ?endpoint_url, "S3 storage ready");

        Ok(Self {
            ops: ObjectOps::new(Arc::new(store.clone()), "s3"),
            signer: store,
            bucket,
            region,
            endpoint_url,
            public_base_url,
        })
    }

    async fn sign(&self, method: Method, key: &str, expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        let location = Path::from(key.to_string());
        let url = self
            .signer
            .signed_url(method, &location, expires_in)
            .await
            .map_err(|e| StorageError::Signing(e.to_string()))?;
        Ok(url.to_string())
    }
}

/// Public URL of an S3 object.
///
/// Preference order: explicit public base, custom endpoint (path style),
/// AWS virtual-hosted style.
pub fn s3_object_url(
    bucket: &str,
    region: &str,
    endpoint_url: Option<&str>,
    public_base_url: Option<&str>,
    key: &str,
) -> String {
    if let Some(base) = public_base_url {
        format!("{}/{}", base.trim_end_matches('/'), key)
    } else if let Some(endpoint) = endpoint_url {
        format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
    } else {
        format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    fn public_url(&self, key: &str) -> String {
        s3_object_url(
            &self.bucket,
            &self.region,
            self.endpoint_url.as_deref(),
            self.public_base_url.as_deref(),
            key,
        )
    }

    async fn presigned_put_url(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let url = self.sign(Method::PUT, key, expires_in).await?;
        tracing::debug!(
            key = %key,
            content_type = %content_type,
            expires_in_secs = expires_in.as_secs(),
            "issued S3 upload URL"
        );
        Ok(url)
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        self.sign(Method::GET, key, expires_in).await
    }

    async fn put_bytes(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.ops.put(key, data, content_type).await
    }

    async fn create_bytes(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.ops.create(key, data, content_type).await
    }

    async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        self.ops.get(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.ops.exists(key).await
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        self.ops.list(prefix).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.ops.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aws_virtual_hosted_url() {
        let url = s3_object_url("inspections", "sa-east-1", None, None, "uploads/a.jpg");
        assert_eq!(url, "https://inspections.s3.sa-east-1.amazonaws.com/uploads/a.jpg");
    }

    #[test]
    fn test_custom_endpoint_path_style_url() {
        let url = s3_object_url(
            "inspections",
            "us-east-1",
            Some("http://localhost:9000/"),
            None,
            "uploads/a.jpg",
        );
        assert_eq!(url, "http://localhost:9000/inspections/uploads/a.jpg");
    }

    #[test]
    fn test_public_base_wins() {
        let url = s3_object_url(
            "inspections",
            "us-east-1",
            Some("http://localhost:9000"),
            Some("https://cdn.example.com/"),
            "uploads/a.jpg",
        );
        assert_eq!(url, "https://cdn.example.com/uploads/a.jpg");
    }
}
