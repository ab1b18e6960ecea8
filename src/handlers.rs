//! HTTP handlers for webhook processing and server status

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State as AxumState},
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::SharedState;
use crate::dispatch::dispatch_matching;
use crate::webhook::{DispatchContext, Property, RequestFacts};

/// Builds the application router: `GET /` for health, `POST` on any path for webhooks.
/// Webhook bodies are accepted whole, whatever their size, since actions get them on stdin.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root).post(handle_webhook))
        .route("/{*path}", post(handle_webhook))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Root health check endpoint
/// Supports ?format=json for detailed JSON response
pub async fn root(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if params.get("format").map(String::as_str) == Some("json") {
        Json(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "total_rules": state.rules.len(),
            "status": "healthy"
        }))
        .into_response()
    } else {
        concat!(env!("CARGO_PKG_NAME"), " - healthy").into_response()
    }
}

/// Handles a GitLab webhook POST request.
///
/// Matching and dispatch run in a background task so GitLab gets its answer
/// right away; GitLab ignores the status code anyway. The task is detached,
/// so a client hanging up never interrupts running actions.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let delivery_id = Uuid::now_v7();
    let facts = RequestFacts::from_request(uri.path(), &headers);
    let context = DispatchContext::from_request(&headers, body);

    debug!(
        "Delivery {} - path {:?}, event {:?}, instance {:?}, {} byte body",
        delivery_id,
        facts.get(Property::Path),
        facts.get(Property::GitlabEvent),
        facts.get(Property::GitlabHost),
        context.body.len()
    );

    tokio::spawn(async move {
        let summary = dispatch_matching(&state.rules, &state.shell, &facts, &context).await;
        info!(
            "Delivery {} processed: {} rule(s) matched, {} action(s) could not be run",
            delivery_id, summary.matched, summary.failed
        );
    });

    StatusCode::OK
}
