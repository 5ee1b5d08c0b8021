use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use super::app_state::AppState;

/// Extractor that validates the `Authorization: Bearer <token>` header on
/// SCIM routes against the shared secret. Use this in any SCIM handler.
pub struct ScimAuth;

impl FromRequestParts<Arc<AppState>> for ScimAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| (StatusCode::FORBIDDEN, "Not authenticated").into_response())?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            (StatusCode::FORBIDDEN, "Invalid authentication scheme").into_response()
        })?;

        if token != state.scim_bearer_token {
            return Err((StatusCode::FORBIDDEN, "Invalid token").into_response());
        }

        Ok(ScimAuth)
    }
}
