use std::path::Path;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use shared::Snapshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::storage::SnapshotStore;

/// JSON bodies up to 50 MiB; snapshots carry inline base64 documents.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Shared handler state: the storage backend behind the data endpoint.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn SnapshotStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }
}

/// Assemble the application router: the data endpoint plus the static
/// front end with an SPA index fallback for non-API paths.
pub fn create_router(state: AppState, public_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let spa = ServeDir::new(public_dir)
        .not_found_service(ServeFile::new(public_dir.join("index.html")));

    Router::new()
        .route("/api/data", get(get_data).post(post_data))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .fallback_service(spa)
        .with_state(state)
}

/// Read the entire dataset. The current revision travels as the `ETag`
/// header so clients can replace conditionally later.
pub async fn get_data(State(state): State<AppState>) -> Result<Response, GatewayError> {
    info!("GET /api/data");

    let snapshot = state
        .store
        .read_all()
        .await
        .map_err(GatewayError::ReadFailed)?;
    let revision = snapshot.revision();

    Ok(([(header::ETAG, revision)], Json(snapshot)).into_response())
}

/// Replace the entire dataset with the posted snapshot. Any record
/// that fails to parse rejects the whole batch before anything is
/// written. An `If-Match` header makes the replace conditional on the
/// stored revision; without one the write is last-write-wins.
pub async fn post_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Result<Response, GatewayError> {
    info!("POST /api/data");

    if !payload.is_object() {
        return Err(GatewayError::InvalidPayload);
    }
    let snapshot: Snapshot = serde_json::from_value(payload).map_err(|e| {
        warn!("rejected snapshot: {e}");
        GatewayError::InvalidPayload
    })?;

    let expected = revision_from_headers(&headers);
    let revision = state
        .store
        .replace_all(&snapshot, expected.as_deref())
        .await?;

    info!(
        "stored snapshot: {} processes, {} payments, {} users, {} activities",
        snapshot.processes.len(),
        snapshot.payments.len(),
        snapshot.users.len(),
        snapshot.activities.len()
    );

    Ok((
        [(header::ETAG, revision)],
        Json(json!({ "message": "Dados salvos com sucesso." })),
    )
        .into_response())
}

/// `If-Match: "<revision>"`, quotes optional.
fn revision_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::IF_MATCH)?.to_str().ok()?;
    Some(value.trim().trim_matches('"').to_string())
}
