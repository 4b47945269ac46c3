//! Downstream forwarding of submitted inspections.
//!
//! - [`WebhookForwarder`] posts the record as flat JSON to an automation
//!   webhook (Zapier, Make, n8n ...)
//! - [`SheetsForwarder`] appends one row to a Google Sheets range
//!
//! Forwarding happens after the record is stored. A failed forward is
//! reported to the caller but never undoes the submission.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{Config, SheetsConfig};
use crate::error::{ForwardError, ForwardResult};
use crate::models::{InspectionRecord, MediaSlot};
use std::sync::Arc;

/// Default number of attempts per forward
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay between attempts in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Google Sheets API base
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

/// A downstream target for submitted inspections.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Short name reported in submission responses.
    fn name(&self) -> &str;

    async fn forward(&self, record: &InspectionRecord) -> ForwardResult<()>;
}

/// Build every forwarder enabled in `config`.
pub fn forwarders_from_config(config: &Config) -> Vec<Arc<dyn Forwarder>> {
    let mut forwarders: Vec<Arc<dyn Forwarder>> = Vec::new();
    if let Some(url) = &config.webhook_url {
        forwarders.push(Arc::new(WebhookForwarder::new(url.clone())));
    }
    if let Some(sheets) = &config.sheets {
        forwarders.push(Arc::new(SheetsForwarder::new(sheets.clone())));
    }
    forwarders
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// POST `body` to `url`, retrying transport errors and 5xx answers.
async fn post_with_retries(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_attempts: u32,
) -> ForwardResult<()> {
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match try_post(client, url, bearer, body).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                let retryable = match &e {
                    ForwardError::Status { status, .. } => *status >= 500 || *status == 429,
                    _ => true,
                };
                tracing::warn!(attempt, max_attempts, url = %url, error = %e, "forward attempt failed");
                last_error = Some(e);

                if !retryable {
                    break;
                }
                if attempt < max_attempts {
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ForwardError::Http("no attempt was made".to_string())))
}

async fn try_post(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
) -> ForwardResult<()> {
    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ForwardError::Http(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(ForwardError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

// =============================================================================
// Webhook
// =============================================================================

/// Posts the flat record JSON to a webhook URL.
pub struct WebhookForwarder {
    client: reqwest::Client,
    url: String,
    max_attempts: u32,
}

impl WebhookForwarder {
    pub fn new(url: String) -> Self {
        Self {
            client: http_client(),
            url,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set the number of attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

/// Webhook body: the record fields plus `submissionDate`.
pub fn webhook_payload(record: &InspectionRecord) -> ForwardResult<Value> {
    let mut value = serde_json::to_value(record)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "submissionDate".to_string(),
            Value::String(record.created_at.to_rfc3339()),
        );
    }
    Ok(value)
}

#[async_trait]
impl Forwarder for WebhookForwarder {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn forward(&self, record: &InspectionRecord) -> ForwardResult<()> {
        let body = webhook_payload(record)?;
        post_with_retries(&self.client, &self.url, None, &body, self.max_attempts).await
    }
}

// =============================================================================
// Google Sheets
// =============================================================================

/// Appends one spreadsheet row per inspection.
pub struct SheetsForwarder {
    client: reqwest::Client,
    config: SheetsConfig,
    api_base: String,
}

impl SheetsForwarder {
    pub fn new(config: SheetsConfig) -> Self {
        Self {
            client: http_client(),
            config,
            api_base: SHEETS_API_BASE.to_string(),
        }
    }

    /// Point at another API host.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn append_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
            self.api_base, self.config.spreadsheet_id, self.config.range
        )
    }
}

/// Spreadsheet row for a record.
///
/// Columns: date, owner, e-mail, phone, plate, km, model year, conditions,
/// chassis number, second key, safety items, air conditioner, windshield
/// damage, lights damage, tires damage, original sound system, then one
/// column per media slot.
pub fn sheet_row(record: &InspectionRecord) -> Vec<String> {
    let form = &record.form;
    let conditions = form
        .vehicle_conditions
        .iter()
        .map(|c| c.code())
        .collect::<Vec<_>>()
        .join(", ");
    let safety_items = form
        .safety_items
        .iter()
        .map(|s| s.code())
        .collect::<Vec<_>>()
        .join(", ");

    let mut row = vec![
        record.created_at.to_rfc3339(),
        form.owner_name.clone(),
        form.email.clone(),
        form.phone.clone(),
        form.license_plate.clone(),
        form.current_km.to_string(),
        form.model_year.to_string(),
        conditions,
        form.has_chassis_number.label().to_string(),
        form.has_second_key.label().to_string(),
        safety_items,
        form.has_air_conditioner.label().to_string(),
        form.has_windshield_damage.label().to_string(),
        form.has_lights_damage.label().to_string(),
        form.has_tires_damage.label().to_string(),
        form.has_original_sound_system.label().to_string(),
    ];
    row.extend(
        MediaSlot::ALL
            .iter()
            .map(|slot| record.media.get(*slot).unwrap_or_default().to_string()),
    );
    row
}

#[async_trait]
impl Forwarder for SheetsForwarder {
    fn name(&self) -> &str {
        "sheets"
    }

    async fn forward(&self, record: &InspectionRecord) -> ForwardResult<()> {
        let body = json!({ "values": [sheet_row(record)] });
        post_with_retries(
            &self.client,
            &self.append_url(),
            Some(&self.config.access_token),
            &body,
            DEFAULT_MAX_ATTEMPTS,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_form;
    use crate::models::{MediaUrls, YesNo};
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn record() -> InspectionRecord {
        let mut media = MediaUrls::default();
        media.set(MediaSlot::CrlvPhoto, "https://cdn.example.com/crlv.jpg");
        media.set(MediaSlot::VideoFile, "https://cdn.example.com/video.mp4");
        InspectionRecord::new(Uuid::new_v4(), sample_form(), media, BTreeMap::new(), Utc::now())
    }

    #[test]
    fn test_sheet_row_layout() {
        let mut record = record();
        record.form.has_tires_damage = YesNo::Yes;
        let row = sheet_row(&record);

        assert_eq!(row.len(), 16 + MediaSlot::ALL.len());
        assert_eq!(row[1], "Maria Souza");
        assert_eq!(row[5], "48200");
        assert_eq!(row[7], "none");
        assert_eq!(row[8], "Sí");
        assert_eq!(row[9], "No");
        assert_eq!(row[10], "wrench, spare, triangle");
        assert_eq!(row[14], "Sí");
        assert_eq!(row[16], "https://cdn.example.com/crlv.jpg");
        assert_eq!(row[17], "");
        assert_eq!(row[21], "https://cdn.example.com/video.mp4");
    }

    #[test]
    fn test_webhook_payload_is_flat() {
        let record = record();
        let payload = webhook_payload(&record).unwrap();
        assert_eq!(payload["id"], record.id.to_string());
        assert_eq!(payload["licensePlate"], "ABC1D23");
        assert_eq!(payload["status"], "pending");
        assert!(payload["submissionDate"].is_string());
    }

    #[test]
    fn test_sheets_append_url() {
        let forwarder = SheetsForwarder::new(SheetsConfig {
            spreadsheet_id: "sheet123".into(),
            range: "Respuestas!A:Z".into(),
            access_token: "token".into(),
        })
        .with_api_base("http://127.0.0.1:9/");
        assert_eq!(
            forwarder.append_url(),
            "http://127.0.0.1:9/v4/spreadsheets/sheet123/values/Respuestas!A:Z:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS"
        );
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_webhook_delivers_record() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let app = Router::new()
            .route(
                "/hook",
                post(|State(tx): State<mpsc::UnboundedSender<Value>>, Json(body): Json<Value>| async move {
                    let _ = tx.send(body);
                    StatusCode::OK
                }),
            )
            .with_state(tx);
        let base = spawn(app).await;

        let record = record();
        WebhookForwarder::new(format!("{}/hook", base))
            .forward(&record)
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received["id"], record.id.to_string());
    }

    #[tokio::test]
    async fn test_webhook_client_error_is_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/hook",
                post(|State(hits): State<Arc<AtomicU32>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, "bad payload")
                }),
            )
            .with_state(hits.clone());
        let base = spawn(app).await;

        let err = WebhookForwarder::new(format!("{}/hook", base))
            .forward(&record())
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Status { status: 400, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Hook that answers 503 for the first `failures` calls, then 200.
    fn flaky_hook(hits: Arc<AtomicU32>, failures: u32) -> Router {
        Router::new()
            .route(
                "/hook",
                post(move |State(hits): State<Arc<AtomicU32>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < failures {
                        (StatusCode::SERVICE_UNAVAILABLE, "try later")
                    } else {
                        (StatusCode::OK, "ok")
                    }
                }),
            )
            .with_state(hits)
    }

    #[tokio::test]
    async fn test_webhook_retries_server_errors() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = spawn(flaky_hook(hits.clone(), 2)).await;

        WebhookForwarder::new(format!("{}/hook", base))
            .forward(&record())
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_webhook_gives_up_after_max_attempts() {
        let hits = Arc::new(AtomicU32::new(0));
        let base = spawn(flaky_hook(hits.clone(), u32::MAX)).await;

        let err = WebhookForwarder::new(format!("{}/hook", base))
            .with_max_attempts(2)
            .forward(&record())
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Status { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_webhook_retries_unreachable_host() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = WebhookForwarder::new(format!("http://{}/hook", addr))
            .with_max_attempts(2)
            .forward(&record())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Http(_)));
    }
}
