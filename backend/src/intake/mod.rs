//! Submission orchestration.
//!
//! A submission takes two requests:
//!
//! ```text
//! begin     → id + one presigned PUT URL per media slot
//! (client uploads each file straight to storage)
//! finalize  → validate → persist meta/{id}.json → forward downstream
//! ```

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::logs::{log_success, log_warning};
use crate::error::{IntakeError, IntakeResult, RecordError};
use crate::forward::Forwarder;
use crate::models::{InspectionForm, InspectionRecord, MediaSlot, MediaUrls, ReviewStatus};
use crate::records::InspectionRepository;
use crate::storage::keys::media_key;
use crate::storage::ObjectStorage;
use crate::validation::validate_inspection;

/// Body of `POST /api/submit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginRequest {
    /// Resume a submission that was started but never finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Informational, logged only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Slot field names to issue URLs for. All six when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_files: Option<Vec<String>>,
}

/// Answer to `POST /api/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginResponse {
    pub id: Uuid,
    /// Presigned PUT URL per slot.
    pub upload_urls: BTreeMap<MediaSlot, String>,
    /// Storage key per slot.
    pub file_keys: BTreeMap<MediaSlot, String>,
    /// URL to put in the final payload once the upload succeeded.
    pub public_urls: BTreeMap<MediaSlot, String>,
    pub expires_at: DateTime<Utc>,
}

/// Result of one forwarder for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardOutcome {
    pub target: String,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer to `POST /api/submit/final`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOutcome {
    pub id: Uuid,
    pub status: ReviewStatus,
    pub forwarded: Vec<ForwardOutcome>,
}

/// Answers plus media URLs, as posted by the client.
#[derive(Debug, Deserialize)]
struct SubmittedInspection {
    #[serde(flatten)]
    form: InspectionForm,
    #[serde(flatten)]
    media: MediaUrls,
}

/// Issues upload URLs and turns finished uploads into records.
#[derive(Clone)]
pub struct IntakeService {
    storage: Arc<dyn ObjectStorage>,
    records: InspectionRepository,
    forwarders: Vec<Arc<dyn Forwarder>>,
    upload_ttl: Duration,
}

impl IntakeService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        forwarders: Vec<Arc<dyn Forwarder>>,
        upload_ttl: Duration,
    ) -> Self {
        Self {
            records: InspectionRepository::new(storage.clone()),
            storage,
            forwarders,
            upload_ttl,
        }
    }

    pub fn records(&self) -> &InspectionRepository {
        &self.records
    }

    /// Names of the configured forwarders.
    pub fn forwarder_names(&self) -> Vec<String> {
        self.forwarders.iter().map(|f| f.name().to_string()).collect()
    }

    /// Allocate (or resume) an inspection id and issue upload URLs.
    pub async fn begin(&self, request: BeginRequest) -> IntakeResult<BeginResponse> {
        let id = match request.id.as_deref() {
            Some(raw) => {
                let id = parse_id(raw)?;
                if self.records.exists(id).await? {
                    return Err(RecordError::AlreadyExists(id).into());
                }
                id
            }
            None => Uuid::now_v7(),
        };

        let slots = match request.required_files {
            Some(names) => parse_slots(&names)?,
            None => MediaSlot::ALL.to_vec(),
        };

        let mut upload_urls = BTreeMap::new();
        let mut file_keys = BTreeMap::new();
        let mut public_urls = BTreeMap::new();

        for slot in slots {
            let key = media_key(id, slot);
            let url = self
                .storage
                .presigned_put_url(&key, slot.content_type(), self.upload_ttl)
                .await?;
            upload_urls.insert(slot, url);
            public_urls.insert(slot, self.storage.public_url(&key));
            file_keys.insert(slot, key);
        }

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.upload_ttl).unwrap_or(chrono::Duration::zero());

        tracing::info!(
            inspection_id = %id,
            email = request.email.as_deref().unwrap_or("-"),
            slots = upload_urls.len(),
            "upload urls issued"
        );

        Ok(BeginResponse {
            id,
            upload_urls,
            file_keys,
            public_urls,
            expires_at,
        })
    }

    /// Validate, persist and forward a finished submission.
    pub async fn finalize(&self, payload: Value) -> IntakeResult<FinalizeOutcome> {
        let raw_id = payload
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or(IntakeError::MissingId)?;
        let id = parse_id(raw_id)?;

        validate_inspection(&payload).map_err(IntakeError::Invalid)?;

        let submitted: SubmittedInspection = serde_json::from_value(payload)?;
        let file_keys = submitted
            .media
            .iter()
            .map(|(slot, _)| (slot, media_key(id, slot)))
            .collect();

        let record = InspectionRecord::new(id, submitted.form, submitted.media, file_keys, Utc::now());
        self.records.create(&record).await?;

        let forwarded = self.forward(&record).await;

        log_success(
            id,
            format!(
                "Inspection {} submitted by {}",
                record.form.license_plate, record.form.owner_name
            ),
        );

        Ok(FinalizeOutcome {
            id,
            status: record.status,
            forwarded,
        })
    }

    async fn forward(&self, record: &InspectionRecord) -> Vec<ForwardOutcome> {
        let results = join_all(self.forwarders.iter().map(|f| f.forward(record))).await;

        self.forwarders
            .iter()
            .zip(results)
            .map(|(forwarder, result)| match result {
                Ok(()) => ForwardOutcome {
                    target: forwarder.name().to_string(),
                    delivered: true,
                    error: None,
                },
                Err(e) => {
                    log_warning(
                        record.id,
                        format!("Forwarding to {} failed: {}", forwarder.name(), e),
                    );
                    ForwardOutcome {
                        target: forwarder.name().to_string(),
                        delivered: false,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }
}

fn parse_id(raw: &str) -> IntakeResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| IntakeError::InvalidId(raw.to_string()))
}

fn parse_slots(names: &[String]) -> IntakeResult<Vec<MediaSlot>> {
    let mut slots = Vec::with_capacity(names.len());
    for name in names {
        let slot: MediaSlot = name.parse().map_err(IntakeError::UnknownSlot)?;
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }
    Ok(slots)
}
