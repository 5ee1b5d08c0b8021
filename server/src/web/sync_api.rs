use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::error::SyncError;
use crate::sync::orchestrator::{SyncReport, SyncRequest};

use super::app_state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "success" }))
}

/// 200 response body for the sync endpoints: overall status plus the
/// structured per-room outcome list.
#[derive(Serialize)]
struct SyncResponse {
    status: &'static str,
    #[serde(flatten)]
    report: SyncReport,
}

fn report_response(report: SyncReport) -> Response {
    Json(SyncResponse {
        status: "success",
        report,
    })
    .into_response()
}

/// Validation and authorization rejections, in the IdP-facing wire format.
fn sync_error_response(err: SyncError) -> Response {
    let status = match &err {
        SyncError::Validation(_) => StatusCode::BAD_REQUEST,
        SyncError::Authorization(_) => StatusCode::FORBIDDEN,
    };
    warn!(%status, detail = %err, "rejecting sync event");
    (status, Json(json!({ "detail": err.to_string() }))).into_response()
}

/// `POST /sync/matrix` — add a user to the rooms of their current groups.
pub async fn matrix_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Response {
    match state.orchestrator.handle_add_event(&request).await {
        Ok(report) => report_response(report),
        Err(err) => sync_error_response(err),
    }
}

/// `POST /sync/matrix/remove` — kick a user from the rooms of the groups
/// they were removed from, keeping rooms other retained groups still grant.
pub async fn matrix_sync_remove(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Response {
    match state.orchestrator.handle_remove_event(&request).await {
        Ok(report) => report_response(report),
        Err(err) => sync_error_response(err),
    }
}
