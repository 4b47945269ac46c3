//! Operations shared by every `object_store`-backed implementation.

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, Error as ObjectStoreError, ObjectStoreExt, PutMode, PutOptions,
    PutPayload,
};
use std::sync::Arc;

use crate::error::{StorageError, StorageResult};

use super::keys::validate_key;
use super::{ObjectInfo, StoredObject};

/// Thin wrapper adding logging and error mapping to an [`object_store::ObjectStore`].
#[derive(Clone)]
pub(crate) struct ObjectOps {
    store: Arc<dyn object_store::ObjectStore>,
    backend: &'static str,
    keeps_content_type: bool,
}

impl ObjectOps {
    pub(crate) fn new(store: Arc<dyn object_store::ObjectStore>, backend: &'static str) -> Self {
        Self {
            store,
            backend,
            keeps_content_type: true,
        }
    }

    /// For stores that reject object attributes (`LocalFileSystem`).
    pub(crate) fn without_attributes(mut self) -> Self {
        self.keeps_content_type = false;
        self
    }

    fn put_options(&self, content_type: &str, mode: PutMode) -> PutOptions {
        let attributes = if self.keeps_content_type {
            Attributes::from_iter([(Attribute::ContentType, content_type.to_string())])
        } else {
            Attributes::new()
        };
        PutOptions {
            mode,
            attributes,
            ..Default::default()
        }
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Path::parse(key).map_err(|e| StorageError::InvalidKey(e.to_string()))
    }

    pub(crate) async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.put_with_mode(key, data, content_type, PutMode::Overwrite).await
    }

    /// Store `data` only if nothing exists at `key` yet.
    ///
    /// Fails with [`StorageError::AlreadyExists`] otherwise. The check and the
    /// write are one atomic operation in the backend.
    pub(crate) async fn create(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.put_with_mode(key, data, content_type, PutMode::Create).await
    }

    async fn put_with_mode(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        mode: PutMode,
    ) -> StorageResult<()> {
        let location = Self::location(key)?;
        let size = data.len();
        let start = std::time::Instant::now();
        let opts = self.put_options(content_type, mode);

        object_store::ObjectStore::put_opts(self.store.as_ref(), &location, PutPayload::from(data), opts)
            .await
            .map_err(|e| match e {
                ObjectStoreError::AlreadyExists { .. } | ObjectStoreError::Precondition { .. } => {
                    StorageError::AlreadyExists(key.to_string())
                }
                other => {
                    tracing::error!(
                        error = %other,
                        backend = self.backend,
                        key = %key,
                        size_bytes = size,
                        "object put failed"
                    );
                    StorageError::Backend(other.to_string())
                }
            })?;

        tracing::debug!(
            backend = self.backend,
            key = %key,
            size_bytes = size,
            content_type = %content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "object stored"
        );
        Ok(())
    }

    pub(crate) async fn get(&self, key: &str) -> StorageResult<StoredObject> {
        let location = Self::location(key)?;
        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::Backend(other.to_string()),
        })?;

        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|v| v.to_string());
        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    pub(crate) async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    pub(crate) async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let prefix_path = Path::from(prefix.trim_end_matches('/'));
        let metas: Vec<_> = object_store::ObjectStore::list(self.store.as_ref(), Some(&prefix_path))
            .try_collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut objects: Vec<ObjectInfo> = metas
            .into_iter()
            .map(|meta| ObjectInfo {
                key: meta.location.to_string(),
                last_modified: meta.last_modified,
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    pub(crate) async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        self.store.delete(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(error = %other, backend = self.backend, key = %key, "object delete failed");
                StorageError::Backend(other.to_string())
            }
        })
    }
}
