use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::keys::validate_key;
use super::object::ObjectOps;
use super::signing::UploadSigner;
use super::{ObjectInfo, ObjectStorage, StoredObject};
use crate::error::{StorageError, StorageResult};

/// Local storage behind this server's upload proxy.
///
/// Upload URLs point at `/api/uploads/{key}` on this server and are signed
/// with [`UploadSigner`]; the API layer verifies them before touching the
/// store.
#[derive(Clone)]
pub struct LocalStorage {
    ops: ObjectOps,
    signer: UploadSigner,
}

impl LocalStorage {
    /// Store objects under `root`, creating it if needed.
    pub fn on_disk(root: impl AsRef<Path>, signer: UploadSigner) -> StorageResult<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        tracing::info!(root = %root.display(), "local storage ready");

        Ok(Self {
            ops: ObjectOps::new(Arc::new(store), "local").without_attributes(),
            signer,
        })
    }

    /// Keep objects in memory. Used by tests.
    pub fn in_memory(signer: UploadSigner) -> Self {
        Self {
            ops: ObjectOps::new(Arc::new(InMemory::new()), "memory"),
            signer,
        }
    }

    pub fn signer(&self) -> &UploadSigner {
        &self.signer
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn public_url(&self, key: &str) -> String {
        self.signer.object_url(key)
    }

    async fn presigned_put_url(
        &self,
        key: &str,
        _content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        validate_key(key)?;
        Ok(self.signer.signed_url(&Method::PUT, key, expires_in))
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        Ok(self.signer.signed_url(&Method::GET, key, expires_in))
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
    use crate::storage::signing::parse_signed_url;
    use serde_json::json;

    fn storage() -> LocalStorage {
        LocalStorage::in_memory(UploadSigner::new("secret", "http://localhost:3000"))
    }

    #[tokio::test]
    async fn test_put_get_and_list() {
        let storage = storage();
        storage
            .put_bytes("uploads/b.jpg", Bytes::from_static(b"b"), "image/jpeg")
            .await
            .unwrap();
        storage
            .put_bytes("uploads/a.jpg", Bytes::from_static(b"a"), "image/jpeg")
            .await
            .unwrap();
        storage.put_json("meta/x.json", &json!({ "id": "x" })).await.unwrap();

        assert_eq!(
            storage.list_keys("uploads/").await.unwrap(),
            vec!["uploads/a.jpg".to_string(), "uploads/b.jpg".to_string()]
        );
        assert_eq!(storage.get_bytes("uploads/a.jpg").await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(storage.get_json("meta/x.json").await.unwrap()["id"], "x");
        assert!(storage.exists("meta/x.json").await.unwrap());
        assert!(!storage.exists("meta/y.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_refuses_existing_key() {
        let storage = storage();
        storage
            .create_bytes("meta/a.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        let err = storage
            .create_bytes("meta/a.json", Bytes::from_static(b"[]"), "application/json")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(ref key) if key == "meta/a.json"));
        assert_eq!(storage.get_bytes("meta/a.json").await.unwrap(), Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_content_type_is_kept() {
        let storage = storage();
        storage
            .put_bytes("uploads/a.jpg", Bytes::from_static(b"a"), "image/png")
            .await
            .unwrap();
        storage.put_json("meta/x.json", &json!({})).await.unwrap();

        let upload = storage.get_object("uploads/a.jpg").await.unwrap();
        assert_eq!(upload.content_type.as_deref(), Some("image/png"));
        let record = storage.get_object("meta/x.json").await.unwrap();
        assert_eq!(record.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let err = storage().get_bytes("uploads/none.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_presigned_put_url_verifies_with_signer() {
        let storage = storage();
        let url = storage
            .presigned_put_url("uploads/a.jpg", "image/jpeg", Duration::from_secs(300))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:3000/api/uploads/uploads/a.jpg?"));

        let params = parse_signed_url(&url).unwrap();
        assert!(storage.signer().verify(&Method::PUT, "uploads/a.jpg", &params).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let storage = storage();
        assert!(storage
            .presigned_put_url("../etc/passwd", "image/jpeg", Duration::from_secs(1))
            .await
            .is_err());
        assert!(storage
            .put_bytes("uploads/../x", Bytes::new(), "image/jpeg")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_on_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::on_disk(
            dir.path().join("data"),
            UploadSigner::new("secret", "http://localhost:3000"),
        )
        .unwrap();

        storage
            .put_bytes("uploads/a.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();
        assert!(dir.path().join("data/uploads/a.jpg").exists());
        // The filesystem keeps no attributes
        assert_eq!(storage.get_object("uploads/a.jpg").await.unwrap().content_type, None);

        storage
            .create_bytes("meta/a.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        assert!(matches!(
            storage
                .create_bytes("meta/a.json", Bytes::from_static(b"{}"), "application/json")
                .await,
            Err(StorageError::AlreadyExists(_))
        ));

        storage.delete("uploads/a.jpg").await.unwrap();
        assert!(!storage.exists("uploads/a.jpg").await.unwrap());
    }
}
