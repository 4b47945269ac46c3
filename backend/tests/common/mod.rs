#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use intake::storage::{LocalStorage, ObjectStorage, UploadSigner};
use intake::{router, AppState, Config};

pub const BASE_URL: &str = "http://localhost:3000";

/// State over in-memory storage behind the upload proxy, with no forwarders.
pub fn test_state(base_url: &str) -> AppState {
    let signer = UploadSigner::new("test-secret", base_url);
    let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::in_memory(signer.clone()));
    AppState::new(Config::default(), storage, Some(signer), vec![])
}

pub fn build_test_app() -> Router {
    router(test_state(BASE_URL))
}

/// Strip the server origin from an absolute URL issued by the app.
pub fn local_path(url: &str) -> String {
    url.strip_prefix(BASE_URL).unwrap_or(url).to_string()
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn bytes_request(method: Method, uri: &str, content_type: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

/// Send a request and return the status and raw body.
pub async fn send_raw(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

/// Send a request and parse a JSON body (`Null` when empty).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send_raw(app, request).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Complete answers with no reported damage.
pub fn answers() -> Value {
    json!({
        "ownerName": "Maria Souza",
        "email": "maria@example.com",
        "phone": "11912345678",
        "licensePlate": "ABC1D23",
        "currentKm": 48200,
        "modelYear": 2019,
        "hasChassisNumber": "sim",
        "hasSecondKey": "nao",
        "vehicleConditions": ["none"],
        "safetyItems": ["wrench", "spare"],
        "hasAirConditioner": "sim",
        "hasWindshieldDamage": "nao",
        "hasLightsDamage": "nao",
        "hasTiresDamage": "nao",
        "hasOriginalSoundSystem": "sim"
    })
}
