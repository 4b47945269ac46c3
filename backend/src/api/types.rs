//! REST API types.
//!
//! Success bodies are camelCase JSON. Every error is rendered as
//! `{ "success": false, "error": "...", "details": [...] }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::logs::log_error;
use crate::error::ServerError;
use crate::intake::FinalizeOutcome;
use crate::models::{InspectionRecord, MediaSlot};

/// Body of `POST /api/submit/final` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: FinalizeOutcome,
}

/// Body of `PATCH /api/review/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewStatusRequest {
    pub status: String,
}

/// One record plus short-lived read links for its media.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDetail {
    #[serde(flatten)]
    pub record: InspectionRecord,
    #[serde(default)]
    pub media_links: BTreeMap<MediaSlot, String>,
}

/// Body of `DELETE /api/review`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub deleted: usize,
}

/// Body of a successful proxy upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAck {
    pub success: bool,
    pub key: String,
    pub size: usize,
}

/// Create an error body
pub fn error_response(error: &str, details: &[String]) -> Value {
    json!({
        "success": false,
        "error": error,
        "details": details,
    })
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ServerError::Unprocessable(details) => error_response(&self.to_string(), details),
            ServerError::Internal(msg) => {
                log_error(format!("Request failed: {}", msg));
                error_response(&self.to_string(), &[])
            }
            _ => error_response(&self.to_string(), &[]),
        };
        (status, Json(body)).into_response()
    }
}

/// Parse a path id, answering 404 for anything that is not a UUID.
pub fn parse_record_id(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw).map_err(|_| ServerError::NotFound(format!("inspection {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::ForwardOutcome;
    use crate::models::ReviewStatus;

    #[test]
    fn test_error_body_shape() {
        let body = error_response("Validation failed", &["email is required".to_string()]);
        assert_eq!(body["success"], false);
        assert_eq!(body["details"][0], "email is required");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServerError::Unprocessable(vec![]).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ServerError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(ServerError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_finalize_response_is_flat() {
        let response = FinalizeResponse {
            success: true,
            outcome: FinalizeOutcome {
                id: Uuid::nil(),
                status: ReviewStatus::Pending,
                forwarded: vec![ForwardOutcome {
                    target: "webhook".into(),
                    delivered: true,
                    error: None,
                }],
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["forwarded"][0]["target"], "webhook");
    }

    #[test]
    fn test_parse_record_id() {
        assert!(parse_record_id("not-a-uuid").is_err());
        assert_eq!(parse_record_id(&Uuid::nil().to_string()).unwrap(), Uuid::nil());
    }
}
