//! Inspection repository - one JSON object per record.
//!
//! Records live at `meta/{id}.json` in the configured object storage.
//! They are written once at submission; the reviewer status is the only
//! thing updated afterwards.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{RecordError, RecordResult, StorageError};
use crate::models::{InspectionRecord, ReviewStatus};
use crate::storage::keys::{record_id_from_key, record_key, RECORD_PREFIX};
use crate::storage::{ObjectInfo, ObjectStorage};

/// Reads and writes inspection records.
#[derive(Clone)]
pub struct InspectionRepository {
    storage: Arc<dyn ObjectStorage>,
}

impl InspectionRepository {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Whether a record exists for `id`.
    pub async fn exists(&self, id: Uuid) -> RecordResult<bool> {
        Ok(self.storage.exists(&record_key(id)).await?)
    }

    /// Persist a new record. Fails if the id was already used.
    ///
    /// The existence check and the write are a single create-only put, so
    /// concurrent submissions of one id cannot both succeed.
    pub async fn create(&self, record: &InspectionRecord) -> RecordResult<()> {
        let value = serde_json::to_value(record)?;
        self.storage
            .create_json(&record_key(record.id), &value)
            .await
            .map_err(|e| match e {
                StorageError::AlreadyExists(_) => RecordError::AlreadyExists(record.id),
                other => RecordError::Storage(other),
            })?;
        tracing::info!(inspection_id = %record.id, plate = %record.form.license_plate, "inspection stored");
        Ok(())
    }

    async fn write(&self, record: &InspectionRecord) -> RecordResult<()> {
        let value = serde_json::to_value(record)?;
        self.storage.put_json(&record_key(record.id), &value).await?;
        Ok(())
    }

    /// Load one record.
    pub async fn get(&self, id: Uuid) -> RecordResult<InspectionRecord> {
        let value = self
            .storage
            .get_json(&record_key(id))
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => RecordError::NotFound(id),
                other => RecordError::Storage(other),
            })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Most recent records, newest first.
    ///
    /// Candidates are ranked by the creation time embedded in the id
    /// (UUIDv7), falling back to the object's modification time for other
    /// ids. At most `limit` objects are read. Unreadable objects are skipped
    /// with a warning.
    pub async fn list(&self, limit: usize) -> RecordResult<Vec<InspectionRecord>> {
        let mut candidates: Vec<(DateTime<Utc>, Uuid)> = self
            .storage
            .list_objects(RECORD_PREFIX)
            .await?
            .iter()
            .filter_map(|object| {
                record_id_from_key(&object.key).map(|id| (creation_hint(id, object), id))
            })
            .collect();

        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        candidates.truncate(limit);

        let loaded = join_all(candidates.iter().map(|(_, id)| self.get(*id))).await;

        let mut records: Vec<InspectionRecord> = loaded
            .into_iter()
            .zip(&candidates)
            .filter_map(|(result, (_, id))| match result {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(inspection_id = %id, error = %e, "skipping unreadable record");
                    None
                }
            })
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Set the reviewer status and persist the change.
    pub async fn set_status(&self, id: Uuid, status: ReviewStatus) -> RecordResult<InspectionRecord> {
        let mut record = self.get(id).await?;
        record
            .apply_status(status, Utc::now())
            .map_err(RecordError::InvalidStatus)?;
        self.write(&record).await?;
        tracing::info!(inspection_id = %id, status = %status, "inspection reviewed");
        Ok(record)
    }

    /// Delete every record. Returns how many were removed.
    pub async fn purge(&self) -> RecordResult<usize> {
        let keys = self.storage.list_keys(RECORD_PREFIX).await?;
        let mut count = 0;
        for key in keys.iter().filter(|k| k.ends_with(".json")) {
            self.storage.delete(key).await?;
            count += 1;
        }
        tracing::warn!(deleted = count, "inspection records purged");
        Ok(count)
    }
}

/// When the record behind `object` was created, as far as the listing can tell.
fn creation_hint(id: Uuid, object: &ObjectInfo) -> DateTime<Utc> {
    id.get_timestamp()
        .and_then(|ts| {
            let (secs, nanos) = ts.to_unix();
            DateTime::from_timestamp(secs as i64, nanos)
        })
        .unwrap_or(object.last_modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_form;
    use crate::models::MediaUrls;
    use crate::storage::{LocalStorage, UploadSigner};
    use bytes::Bytes;
    use std::collections::BTreeMap;

    fn repository() -> (InspectionRepository, Arc<dyn ObjectStorage>) {
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::in_memory(UploadSigner::new(
            "secret",
            "http://localhost:3000",
        )));
        (InspectionRepository::new(storage.clone()), storage)
    }

    fn record_at(offset_secs: i64) -> InspectionRecord {
        InspectionRecord::new(
            Uuid::new_v4(),
            sample_form(),
            MediaUrls::default(),
            BTreeMap::new(),
            Utc::now() + chrono::Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (repo, _) = repository();
        let record = record_at(0);
        repo.create(&record).await.unwrap();
        assert_eq!(repo.get(record.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_create_is_write_once() {
        let (repo, _) = repository();
        let record = record_at(0);
        repo.create(&record).await.unwrap();
        let err = repo.create(&record).await.unwrap_err();
        assert!(matches!(err, RecordError::AlreadyExists(id) if id == record.id));
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (repo, _) = repository();
        let id = Uuid::new_v4();
        assert!(matches!(repo.get(id).await, Err(RecordError::NotFound(x)) if x == id));
    }

    #[tokio::test]
    async fn test_list_newest_first_and_limited() {
        let (repo, _) = repository();
        for offset in [0, 20, 10] {
            repo.create(&record_at(offset)).await.unwrap();
        }

        let all = repo.list(100).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].created_at >= all[1].created_at);
        assert!(all[1].created_at >= all[2].created_at);

        assert_eq!(repo.list(2).await.unwrap().len(), 2);
    }

    fn record_with_id(id: Uuid, created_at: DateTime<Utc>) -> InspectionRecord {
        InspectionRecord::new(id, sample_form(), MediaUrls::default(), BTreeMap::new(), created_at)
    }

    #[tokio::test]
    async fn test_list_limit_keeps_newest_by_id_time() {
        let (repo, _) = repository();
        let now = Utc::now();
        let month_ago = now - chrono::Duration::days(30);

        // The newer record is written first, so modification order disagrees
        let newest_id = Uuid::new_v7(uuid::Timestamp::from_unix(
            uuid::NoContext,
            now.timestamp() as u64,
            0,
        ));
        let older_id = Uuid::new_v7(uuid::Timestamp::from_unix(
            uuid::NoContext,
            month_ago.timestamp() as u64,
            0,
        ));
        repo.create(&record_with_id(newest_id, now)).await.unwrap();
        repo.create(&record_with_id(older_id, month_ago)).await.unwrap();

        let listed = repo.list(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, newest_id);
    }

    #[tokio::test]
    async fn test_list_limit_ignores_key_order_of_random_ids() {
        let (repo, _) = repository();
        let now = Utc::now();
        let old_id: Uuid = "ffffffff-ffff-4fff-bfff-ffffffffffff".parse().unwrap();
        let new_id: Uuid = "00000000-0000-4000-8000-000000000000".parse().unwrap();

        repo.create(&record_with_id(old_id, now - chrono::Duration::days(30)))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.create(&record_with_id(new_id, now)).await.unwrap();

        let listed = repo.list(1).await.unwrap();
        assert_eq!(listed[0].id, new_id);
    }

    #[tokio::test]
    async fn test_create_is_atomic_under_concurrency() {
        let (repo, _) = repository();
        let record = record_at(0);
        let (a, b) = tokio::join!(repo.create(&record), repo.create(&record));
        assert!(a.is_ok() ^ b.is_ok());
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_records() {
        let (repo, storage) = repository();
        repo.create(&record_at(0)).await.unwrap();
        storage
            .put_bytes(
                &record_key(Uuid::new_v4()),
                Bytes::from_static(b"{not json"),
                "application/json",
            )
            .await
            .unwrap();

        assert_eq!(repo.list(100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_status() {
        let (repo, _) = repository();
        let record = record_at(0);
        repo.create(&record).await.unwrap();

        let updated = repo.set_status(record.id, ReviewStatus::Checked).await.unwrap();
        assert_eq!(updated.status, ReviewStatus::Checked);
        assert!(updated.checked_at.is_some());

        let stored = repo.get(record.id).await.unwrap();
        assert_eq!(stored.status_history.len(), 2);

        let err = repo.set_status(record.id, ReviewStatus::Pending).await.unwrap_err();
        assert!(matches!(err, RecordError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn test_purge() {
        let (repo, storage) = repository();
        repo.create(&record_at(0)).await.unwrap();
        repo.create(&record_at(1)).await.unwrap();
        storage
            .put_bytes("uploads/keep.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();

        assert_eq!(repo.purge().await.unwrap(), 2);
        assert!(repo.list(100).await.unwrap().is_empty());
        assert!(storage.exists("uploads/keep.jpg").await.unwrap());
    }
}
