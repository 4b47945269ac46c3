//! Command-line intake client.
//!
//! [`IntakeClient`] wraps the HTTP API. [`submit_draft`] drives a complete
//! submission from a [`Draft`] file and saves progress after every step, so
//! re-running it after a failure picks up where it stopped.

pub mod draft;

use bytes::Bytes;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::api::types::{FinalizeResponse, PurgeResponse, ReviewDetail};
use crate::error::{ClientError, ClientResult};
use crate::intake::{BeginRequest, BeginResponse, FinalizeOutcome};
use crate::media::{detect_mime, prepare_photo, prepare_video, PreparedMedia};
use crate::models::{InspectionRecord, MediaSlot, ReviewStatus};

pub use draft::{Draft, PendingSubmission};

/// Timeout for API calls. Uploads get [`UPLOAD_TIMEOUT`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// HTTP client for the intake API.
#[derive(Clone)]
pub struct IntakeClient {
    http: reqwest::Client,
    base_url: String,
}

impl IntakeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                let error = v.get("error")?.as_str()?.to_string();
                let details: Vec<String> = v
                    .get("details")
                    .and_then(Value::as_array)
                    .map(|d| d.iter().filter_map(|x| x.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                Some(if details.is_empty() {
                    error
                } else {
                    format!("{}: {}", error, details.join("; "))
                })
            })
            .unwrap_or(body);

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn health(&self) -> ClientResult<Value> {
        let response = self
            .http
            .get(self.url("/health"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn begin(&self, request: &BeginRequest) -> ClientResult<BeginResponse> {
        let response = self
            .http
            .post(self.url("/api/submit"))
            .timeout(REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// PUT bytes to a presigned upload URL.
    pub async fn upload(&self, upload_url: &str, media: PreparedMedia) -> ClientResult<()> {
        let response = self
            .http
            .put(upload_url)
            .timeout(UPLOAD_TIMEOUT)
            .header(CONTENT_TYPE, media.content_type)
            .body(media.bytes)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            message: message.chars().take(500).collect(),
        })
    }

    pub async fn finalize(&self, payload: &Value) -> ClientResult<FinalizeResponse> {
        let response = self
            .http
            .post(self.url("/api/submit/final"))
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn list(&self) -> ClientResult<Vec<InspectionRecord>> {
        let response = self
            .http
            .get(self.url("/api/review"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn get(&self, id: Uuid) -> ClientResult<ReviewDetail> {
        let response = self
            .http
            .get(self.url(&format!("/api/review/{}", id)))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn review(&self, id: Uuid, status: ReviewStatus) -> ClientResult<InspectionRecord> {
        let response = self
            .http
            .patch(self.url(&format!("/api/review/{}", id)))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "status": status }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Delete every record on the server.
    pub async fn purge(&self) -> ClientResult<usize> {
        let response = self
            .http
            .delete(self.url("/api/review"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let body: PurgeResponse = Self::parse(response).await?;
        Ok(body.deleted)
    }
}

/// Read and prepare a slot's local file.
async fn prepare_slot(slot: MediaSlot, path: &Path) -> ClientResult<PreparedMedia> {
    if slot.is_video() {
        let video = prepare_video(path).await?;
        let bytes = tokio::fs::read(video.path()).await?;
        return Ok(PreparedMedia {
            bytes: Bytes::from(bytes),
            content_type: video.content_type().to_string(),
        });
    }

    let data = tokio::fs::read(path).await?;
    Ok(prepare_photo(&data, detect_mime(path))?)
}

/// Ensure the draft holds a live id and an upload URL for every missing slot.
async fn ensure_upload_urls(client: &IntakeClient, draft: &mut Draft) -> ClientResult<()> {
    let missing = draft.missing_uploads();
    let usable = draft.submission.as_ref().is_some_and(|s| {
        !s.is_expired_at(Utc::now()) && missing.iter().all(|slot| s.upload_urls.contains_key(slot))
    });
    if usable || missing.is_empty() {
        return Ok(());
    }

    let request = BeginRequest {
        id: draft.submission.as_ref().map(|s| s.id.to_string()),
        email: draft
            .fields
            .get("email")
            .and_then(Value::as_str)
            .map(String::from),
        required_files: Some(missing.iter().map(|s| s.field_name().to_string()).collect()),
    };
    let response = client.begin(&request).await?;

    tracing::info!(inspection_id = %response.id, slots = response.upload_urls.len(), "upload urls received");
    draft.submission = Some(PendingSubmission {
        id: response.id,
        upload_urls: response.upload_urls,
        public_urls: response.public_urls,
        expires_at: response.expires_at,
    });
    Ok(())
}

/// Submit a draft file end to end, saving progress after every step.
pub async fn submit_draft(client: &IntakeClient, draft_path: &Path) -> ClientResult<FinalizeResponse> {
    let mut draft = Draft::load(draft_path)?;
    if draft.is_finalized() {
        return Err(ClientError::Draft(format!(
            "{} was already submitted",
            draft_path.display()
        )));
    }
    draft.validate(draft_path)?;

    ensure_upload_urls(client, &mut draft).await?;
    draft.save(draft_path)?;

    for slot in draft.missing_uploads() {
        let file = draft
            .file_for(slot, draft_path)
            .ok_or_else(|| ClientError::Draft(format!("no file given for {}", slot)))?;
        let submission = draft
            .submission
            .as_ref()
            .ok_or_else(|| ClientError::Draft("no inspection id issued".to_string()))?;
        let (Some(upload_url), Some(public_url)) = (
            submission.upload_urls.get(&slot).cloned(),
            submission.public_urls.get(&slot).cloned(),
        ) else {
            return Err(ClientError::Draft(format!("server issued no upload URL for {}", slot)));
        };

        let media = prepare_slot(slot, &file).await?;
        let size = media.bytes.len();
        client.upload(&upload_url, media).await?;
        tracing::info!(slot = %slot, size, "uploaded");

        draft.uploaded.insert(slot, public_url);
        draft.save(draft_path)?;
    }

    let response = match client.finalize(&draft.payload()?).await {
        Ok(response) => response,
        // A previous run was stored but stopped before saving the draft
        Err(ClientError::Api { status: 409, .. }) => already_stored(client, &draft).await?,
        Err(e) => return Err(e),
    };
    draft.finalized_at = Some(Utc::now());
    draft.save(draft_path)?;

    Ok(response)
}

/// Describe a submission the server already holds.
async fn already_stored(client: &IntakeClient, draft: &Draft) -> ClientResult<FinalizeResponse> {
    let id = draft
        .submission
        .as_ref()
        .map(|s| s.id)
        .ok_or_else(|| ClientError::Draft("server reported a conflict for a draft without an id".to_string()))?;
    let detail = client.get(id).await?;

    tracing::warn!(inspection_id = %id, "inspection was already stored, marking draft as submitted");
    Ok(FinalizeResponse {
        success: true,
        outcome: FinalizeOutcome {
            id,
            status: detail.record.status,
            forwarded: Vec::new(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let client = IntakeClient::new("http://localhost:3000/");
        assert_eq!(client.url("/health"), "http://localhost:3000/health");
    }

    #[tokio::test]
    async fn test_prepare_slot_keeps_small_video() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.mov");
        std::fs::write(&path, b"moov").unwrap();

        let media = prepare_slot(MediaSlot::VideoFile, &path).await.unwrap();
        assert_eq!(media.content_type, "video/quicktime");
        assert_eq!(media.bytes.as_ref(), b"moov");
    }

    #[tokio::test]
    async fn test_submit_refuses_finalized_draft() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.json");
        let mut draft = Draft::template();
        draft.finalized_at = Some(Utc::now());
        draft.save(&path).unwrap();

        let err = submit_draft(&IntakeClient::new("http://127.0.0.1:9"), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Draft(_)));
    }
}
