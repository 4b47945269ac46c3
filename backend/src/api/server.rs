//! HTTP server for the inspection intake API.
//!
//! # API Endpoints
//!
//! | Method | Path                  | Description                              |
//! |--------|-----------------------|------------------------------------------|
//! | GET    | `/health`             | Health check                             |
//! | POST   | `/api/submit`         | Allocate an id and issue upload URLs     |
//! | POST   | `/api/submit/final`   | Persist and forward a submission         |
//! | GET    | `/api/review`         | Latest records, newest first             |
//! | GET    | `/api/review/{id}`    | One record with signed media links       |
//! | PATCH  | `/api/review/{id}`    | Set the reviewer status                  |
//! | DELETE | `/api/review`         | Delete every record                      |
//! | PUT    | `/api/uploads/{*key}` | Signed upload (local backend only)       |
//! | GET    | `/api/uploads/{*key}` | Signed download (local backend only)     |
//! | GET    | `/api/logs`           | SSE activity stream                      |

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post, put},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{
    parse_record_id, FinalizeResponse, PurgeResponse, ReviewDetail, ReviewStatusRequest, UploadAck,
};
use crate::config::Config;
use crate::error::{ServerError, ServerResult, StorageResult};
use crate::forward::{forwarders_from_config, Forwarder};
use crate::intake::{BeginRequest, BeginResponse, IntakeService};
use crate::models::{InspectionRecord, ReviewStatus};
use crate::records::InspectionRepository;
use crate::storage::keys::{content_type_for_key, is_upload_key};
use crate::storage::{build_storage, ObjectStorage, SignatureParams, UploadSigner};

/// Largest body accepted by the upload proxy.
pub const UPLOAD_BODY_LIMIT: usize = 110 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn ObjectStorage>,
    /// Present when uploads go through this server.
    pub signer: Option<UploadSigner>,
    pub intake: IntakeService,
}

impl AppState {
    pub fn new(
        config: Config,
        storage: Arc<dyn ObjectStorage>,
        signer: Option<UploadSigner>,
        forwarders: Vec<Arc<dyn Forwarder>>,
    ) -> Self {
        let intake = IntakeService::new(storage.clone(), forwarders, config.upload_url_ttl);
        Self {
            config: Arc::new(config),
            storage,
            signer,
            intake,
        }
    }

    /// Build storage and forwarders from configuration.
    pub async fn from_config(config: Config) -> StorageResult<Self> {
        let (storage, signer) = build_storage(&config).await?;
        let forwarders = forwarders_from_config(&config);
        Ok(Self::new(config, storage, signer, forwarders))
    }

    fn records(&self) -> &InspectionRepository {
        self.intake.records()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let uploads = Router::new()
        .route("/api/uploads/{*key}", put(upload_object).get(download_object))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(UPLOAD_BODY_LIMIT));

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/submit", post(submit))
        .route("/api/submit/final", post(submit_final))
        .route("/api/review", get(list_reviews).delete(purge_reviews))
        .route("/api/review/{id}", get(get_review).patch(update_review))
        .route("/api/logs", get(sse_logs))
        .merge(uploads)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let state = AppState::from_config(config).await?;

    tracing::info!(
        storage = state.storage.backend_name(),
        forwarders = ?state.intake.forwarder_names(),
        "intake server configured"
    );

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("intake server running on http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "intake",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.storage.backend_name(),
        "forwarders": state.intake.forwarder_names(),
    }))
}

/// SSE endpoint for the activity feed
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn parse_body<T: serde::de::DeserializeOwned + Default>(body: &[u8]) -> ServerResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ServerError::BadRequest(format!("Invalid JSON body: {}", e)))
}

async fn submit(State(state): State<AppState>, body: Bytes) -> ServerResult<Json<BeginResponse>> {
    let request: BeginRequest = parse_body(&body)?;
    Ok(Json(state.intake.begin(request).await?))
}

async fn submit_final(
    State(state): State<AppState>,
    body: Bytes,
) -> ServerResult<Json<FinalizeResponse>> {
    let payload: Value = parse_body(&body)?;
    if !payload.is_object() {
        return Err(ServerError::BadRequest(
            "Expected a JSON object with the inspection answers".to_string(),
        ));
    }

    let outcome = state.intake.finalize(payload).await?;
    Ok(Json(FinalizeResponse {
        success: true,
        outcome,
    }))
}

async fn list_reviews(State(state): State<AppState>) -> ServerResult<Json<Vec<InspectionRecord>>> {
    let records = state.records().list(state.config.review_list_limit).await?;
    Ok(Json(records))
}

async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<ReviewDetail>> {
    let id = parse_record_id(&id)?;
    let record = state.records().get(id).await?;

    let mut media_links = BTreeMap::new();
    for (slot, key) in &record.file_keys {
        if record.media.get(*slot).is_none() {
            continue;
        }
        let url = state
            .storage
            .presigned_get_url(key, state.config.read_url_ttl)
            .await?;
        media_links.insert(*slot, url);
    }

    Ok(Json(ReviewDetail {
        record,
        media_links,
    }))
}

async fn update_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ReviewStatusRequest>, JsonRejection>,
) -> ServerResult<Json<InspectionRecord>> {
    let id = parse_record_id(&id)?;
    let Json(request) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let status: ReviewStatus = request.status.parse().map_err(ServerError::BadRequest)?;

    let record = state.records().set_status(id, status).await?;
    log_info(format!(
        "Inspection {} ({}) marked {}",
        record.id, record.form.license_plate, status
    ));
    Ok(Json(record))
}

async fn purge_reviews(State(state): State<AppState>) -> ServerResult<Json<PurgeResponse>> {
    let deleted = state.records().purge().await?;
    log_info(format!("Purged {} inspection records", deleted));
    Ok(Json(PurgeResponse { deleted }))
}

fn proxy_signer(state: &AppState) -> ServerResult<&UploadSigner> {
    state.signer.as_ref().ok_or_else(|| {
        ServerError::NotFound("upload proxy is disabled for this storage backend".to_string())
    })
}

fn signature(params: Result<Query<SignatureParams>, QueryRejection>) -> ServerResult<SignatureParams> {
    params
        .map(|Query(p)| p)
        .map_err(|_| ServerError::Forbidden("missing or malformed signature".to_string()))
}

async fn upload_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    params: Result<Query<SignatureParams>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<UploadAck>> {
    let signer = proxy_signer(&state)?;
    if !is_upload_key(&key) {
        return Err(ServerError::Forbidden(format!("{} is not an upload key", key)));
    }
    signer.verify(&Method::PUT, &key, &signature(params)?)?;

    let body = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(format!("uploads are limited to {} bytes", UPLOAD_BODY_LIMIT))
        } else {
            ServerError::BadRequest(e.body_text())
        }
    })?;
    if body.is_empty() {
        return Err(ServerError::BadRequest("empty upload body".to_string()));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_else(|| content_type_for_key(&key))
        .to_string();

    let size = body.len();
    state.storage.put_bytes(&key, body, &content_type).await?;
    tracing::info!(key = %key, size, content_type = %content_type, "upload stored");

    Ok(Json(UploadAck {
        success: true,
        key,
        size,
    }))
}

async fn download_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    params: Result<Query<SignatureParams>, QueryRejection>,
) -> ServerResult<Response> {
    let signer = proxy_signer(&state)?;
    signer.verify(&Method::GET, &key, &signature(params)?)?;

    let object = state.storage.get_object(&key).await?;
    let content_type = object
        .content_type
        .unwrap_or_else(|| content_type_for_key(&key).to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], object.bytes).into_response())
}
