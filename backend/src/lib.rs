//! # Intake - vehicle inspection submissions
//!
//! Intake collects vehicle inspections: owner and vehicle answers plus five
//! photos and one walk-around video. Media goes straight to object storage
//! through presigned URLs; the answers are stored as one JSON record per
//! inspection and forwarded to a webhook or spreadsheet for review.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  begin   ┌──────────┐  presigned PUT  ┌──────────────┐
//! │  Client  │─────────▶│  Intake  │ ──────────────▶ │ Object store │
//! │ (draft)  │ finalize │  server  │  meta/{id}.json │ (S3 / local) │
//! └──────────┘─────────▶└──────────┘────────────────▶└──────────────┘
//!                            │ forward
//!                            ▼
//!                     webhook / Google Sheets
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use intake::{start_server, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().unwrap();
//!     start_server(config).await.unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Inspection form, media slots, records
//! - [`validation`] - JSON Schema validation of submissions
//! - [`storage`] - Object storage, key layout and upload signing
//! - [`records`] - Inspection repository
//! - [`intake`] - Submission orchestration
//! - [`forward`] - Webhook and spreadsheet forwarding
//! - [`media`] - Photo and video preparation
//! - [`client`] - HTTP client and resumable drafts
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Validation
pub mod validation;

// Persistence
pub mod records;
pub mod storage;

// Submission flow
pub mod forward;
pub mod intake;

// Client side
pub mod client;
pub mod media;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Configuration and errors
// =============================================================================

pub use config::{Config, SheetsConfig, StorageKind};

pub use error::{
    ClientError, ForwardError, IntakeError, MediaError, RecordError, ServerError, StorageError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    InspectionForm, InspectionRecord, MediaSlot, MediaUrls, ReviewStatus, SafetyItem,
    VehicleCondition, YesNo,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, is_valid_inspection, validate, validate_answers, validate_inspection};

// =============================================================================
// Re-exports - Storage and records
// =============================================================================

pub use records::InspectionRepository;
pub use storage::{LocalStorage, ObjectStorage, S3Storage, UploadSigner};

// =============================================================================
// Re-exports - Intake and forwarding
// =============================================================================

pub use forward::{sheet_row, Forwarder, SheetsForwarder, WebhookForwarder};
pub use intake::{BeginRequest, BeginResponse, FinalizeOutcome, IntakeService};

// =============================================================================
// Re-exports - Client
// =============================================================================

pub use client::{submit_draft, Draft, IntakeClient};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::{router, start_server, AppState};
