//! Error types for the inspection intake service.
//!
//! - [`StorageError`] - object storage and upload signing errors
//! - [`RecordError`] - inspection repository errors
//! - [`IntakeError`] - submission orchestration errors
//! - [`ForwardError`] - downstream forwarding errors
//! - [`MediaError`] - local media preparation errors
//! - [`ClientError`] - command-line client errors
//! - [`ServerError`] - HTTP-facing errors (rendered in [`crate::api::types`])
//!
//! Lower layers convert upward via `From`, so `?` works across boundaries.

use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors from an object storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// A create-only write found the key taken.
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    /// Key is malformed or escapes the allowed layout.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Backend rejected or failed the operation.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// URL signing or verification failed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Backend could not be configured.
    #[error("Storage configuration error: {0}")]
    Config(String),

    /// Stored object was not valid JSON.
    #[error("Stored JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Record Errors
// =============================================================================

/// Errors from the inspection repository.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Inspection not found: {0}")]
    NotFound(Uuid),

    /// Records are write-once.
    #[error("Inspection already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Invalid status transition: {0}")]
    InvalidStatus(String),

    #[error("Record storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Intake Errors
// =============================================================================

/// Errors while issuing upload URLs or finalizing a submission.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Missing inspection id")]
    MissingId,

    #[error("Invalid inspection id: {0}")]
    InvalidId(String),

    #[error("Unknown media slot: {0}")]
    UnknownSlot(String),

    /// Payload failed schema validation.
    #[error("Inspection payload is invalid: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Malformed inspection payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

// =============================================================================
// Forwarding Errors
// =============================================================================

/// Errors while forwarding a record downstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Downstream answered with a non-success status.
    #[error("Downstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Forwarding payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

// =============================================================================
// Media Errors
// =============================================================================

/// Errors while preparing a photo or video for upload.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to read media: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("{kind} is {size} bytes, limit is {limit} bytes")]
    TooLarge {
        kind: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),
}

// =============================================================================
// Client Errors
// =============================================================================

/// Errors from the command-line client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an error body.
    #[error("Server returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Draft is incomplete: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Draft error: {0}")]
    Draft(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP-facing errors. Each variant maps to one status code.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Validation failed")]
    Unprocessable(Vec<String>),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ServerError::NotFound(key),
            StorageError::AlreadyExists(key) => ServerError::Conflict(key),
            StorageError::InvalidKey(msg) => ServerError::BadRequest(msg),
            StorageError::Signing(msg) => ServerError::Forbidden(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<RecordError> for ServerError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(id) => ServerError::NotFound(format!("inspection {}", id)),
            RecordError::AlreadyExists(id) => {
                ServerError::Conflict(format!("inspection {} was already submitted", id))
            }
            RecordError::InvalidStatus(msg) => ServerError::BadRequest(msg),
            RecordError::Storage(e) => e.into(),
            RecordError::Json(e) => ServerError::Internal(e.to_string()),
        }
    }
}

impl From<IntakeError> for ServerError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::MissingId
            | IntakeError::InvalidId(_)
            | IntakeError::UnknownSlot(_)
            | IntakeError::Payload(_) => ServerError::BadRequest(err.to_string()),
            IntakeError::Invalid(errors) => ServerError::Unprocessable(errors),
            IntakeError::Record(e) => e.into(),
            IntakeError::Storage(e) => e.into(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type StorageResult<T> = Result<T, StorageError>;

pub type RecordResult<T> = Result<T, RecordError>;

pub type IntakeResult<T> = Result<T, IntakeError>;

pub type ForwardResult<T> = Result<T, ForwardError>;

pub type MediaResult<T> = Result<T, MediaError>;

pub type ClientResult<T> = Result<T, ClientError>;

pub type ServerResult<T> = Result<T, ServerError>;
