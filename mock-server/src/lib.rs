use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// What `/echo` reports back about the request it received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct AppState {
    flaky_hits: Arc<AtomicUsize>,
}

pub fn app() -> Router {
    Router::new()
        .route("/api/json", get(jenkins_api))
        .route("/echo", any(echo))
        .route("/empty", get(empty))
        .route("/flaky", get(flaky).post(flaky))
        .route("/unavailable", get(unavailable))
        .route("/malformed", get(malformed))
        .route("/watch", get(watch))
        .with_state(AppState::default())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Jenkins-style controller overview; requires some Authorization header.
async fn jenkins_api(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    let auth = header_value(&headers, header::AUTHORIZATION).ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(Json(json!({
        "mode": "NORMAL",
        "nodeDescription": "the built-in node",
        "jobs": [],
        "authorization": auth,
    })))
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        authorization: header_value(&headers, header::AUTHORIZATION),
        content_type: header_value(&headers, header::CONTENT_TYPE),
        body,
    })
}

async fn empty() -> StatusCode {
    StatusCode::OK
}

/// Every other call answers 503, starting with the first.
async fn flaky(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let hit = state.flaky_hits.fetch_add(1, Ordering::SeqCst);
    if hit % 2 == 0 {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"kind": "Status", "code": 503, "hit": hit + 1})),
        )
    } else {
        (StatusCode::OK, Json(json!({"ready": true, "hit": hit + 1})))
    }
}

async fn unavailable() -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"kind": "Status", "code": 503})),
    )
}

async fn malformed() -> (StatusCode, &'static str) {
    (StatusCode::OK, "<html>bad gateway</html>")
}

/// Slow single-event response standing in for a watch stream.
async fn watch() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    Json(json!({"type": "ADDED", "object": {"kind": "Pod", "metadata": {"name": "web-0"}}}))
}
