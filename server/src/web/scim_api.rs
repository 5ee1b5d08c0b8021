use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::RemoteCallError;
use crate::matrix::client::UpsertUserParams;
use crate::matrix::identity::matrix_user_id;
use crate::scim::resources::{
    GROUP_SCHEMA, ListResponse, Meta, MemberRef, PatchOp, ScimGroup, ScimPatchRequest, ScimUser,
    USER_SCHEMA, scim_error, service_provider_config as spc_document,
};

use super::app_state::AppState;
use super::auth::ScimAuth;

fn user_key(id: &str) -> String {
    format!("User/{id}")
}

fn group_key(id: &str) -> String {
    format!("Group/{id}")
}

fn not_found(detail: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(scim_error(404, detail))).into_response()
}

fn bad_request(detail: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(scim_error(400, detail))).into_response()
}

fn store_failure(err: anyhow::Error) -> Response {
    error!(error = %err, "SCIM store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(scim_error(500, "Storage failure")),
    )
        .into_response()
}

pub async fn service_provider_config(_auth: ScimAuth) -> impl IntoResponse {
    Json(spc_document())
}

// ── Users ──────────────────────────────────────────────────────────────────

/// Create the homeserver account for a SCIM user: reuse the account already
/// registered for the external id, otherwise derive a Matrix id from the
/// username and create it. `force` pushes attributes even when the account
/// exists (PUT semantics).
async fn provision_account(
    state: &AppState,
    user: &ScimUser,
    force: bool,
) -> Result<String, RemoteCallError> {
    let external_id = user.external_id.as_deref().unwrap_or(&user.user_name);
    let existing = state.matrix.lookup_external_id(external_id).await?;

    if let Some(matrix_id) = &existing
        && !force
    {
        return Ok(matrix_id.clone());
    }

    let matrix_id = existing
        .unwrap_or_else(|| matrix_user_id(&user.user_name, &state.server_name));
    state
        .matrix
        .upsert_user(&UpsertUserParams {
            matrix_id: matrix_id.clone(),
            display_name: user
                .display_name
                .clone()
                .unwrap_or_else(|| user.user_name.clone()),
            external_id: external_id.to_string(),
            email: user.primary_email().map(String::from),
        })
        .await?;
    Ok(matrix_id)
}

fn provisioning_failure(err: RemoteCallError) -> Response {
    error!("failed to provision homeserver account");
    debug!(detail = %err, "homeserver diagnostics");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(scim_error(500, "Error creating or modifying user")),
    )
        .into_response()
}

pub async fn list_users(State(state): State<Arc<AppState>>, _auth: ScimAuth) -> Response {
    let resources = state
        .store
        .list("User/")
        .await
        .into_iter()
        .map(|(_, value)| value)
        .collect();
    Json(ListResponse::of(resources)).into_response()
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    _auth: ScimAuth,
    Json(mut user): Json<ScimUser>,
) -> Response {
    if user.user_name.is_empty() {
        return bad_request("userName is required");
    }

    let id = Uuid::new_v4().to_string();
    user.id = Some(id.clone());
    user.schemas = vec![USER_SCHEMA.to_string()];
    user.meta = Some(Meta::new("User", &id));

    let matrix_id = match provision_account(&state, &user, false).await {
        Ok(matrix_id) => matrix_id,
        Err(err) => return provisioning_failure(err),
    };
    info!(user = %user.user_name, matrix_id = %matrix_id, "provisioned SCIM user");

    let value = match serde_json::to_value(&user) {
        Ok(value) => value,
        Err(err) => return store_failure(err.into()),
    };
    if let Err(err) = state.store.put(&user_key(&id), value.clone()).await {
        return store_failure(err);
    }

    (StatusCode::CREATED, Json(value)).into_response()
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _auth: ScimAuth,
    Path(id): Path<String>,
) -> Response {
    match state.store.get(&user_key(&id)).await {
        Some(value) => Json(value).into_response(),
        None => not_found("User not found"),
    }
}

pub async fn put_user(
    State(state): State<Arc<AppState>>,
    _auth: ScimAuth,
    Path(id): Path<String>,
    Json(mut user): Json<ScimUser>,
) -> Response {
    let Some(existing) = state.store.get(&user_key(&id)).await else {
        return not_found("User not found");
    };

    user.id = Some(id.clone());
    user.schemas = vec![USER_SCHEMA.to_string()];
    // Keep the original creation timestamp, bump the modification one.
    let mut meta = existing
        .get("meta")
        .cloned()
        .and_then(|m| serde_json::from_value::<Meta>(m).ok())
        .unwrap_or_else(|| Meta::new("User", &id));
    meta.touch();
    user.meta = Some(meta);

    if let Err(err) = provision_account(&state, &user, true).await {
        return provisioning_failure(err);
    }

    let value = match serde_json::to_value(&user) {
        Ok(value) => value,
        Err(err) => return store_failure(err.into()),
    };
    if let Err(err) = state.store.put(&user_key(&id), value.clone()).await {
        return store_failure(err);
    }

    Json(value).into_response()
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    _auth: ScimAuth,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete(&user_key(&id)).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found("User not found"),
        Err(err) => store_failure(err),
    }
}

// ── Groups ─────────────────────────────────────────────────────────────────

pub async fn list_groups(State(state): State<Arc<AppState>>, _auth: ScimAuth) -> Response {
    let resources = state
        .store
        .list("Group/")
        .await
        .into_iter()
        .map(|(_, value)| value)
        .collect();
    Json(ListResponse::of(resources)).into_response()
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    _auth: ScimAuth,
    Json(mut group): Json<ScimGroup>,
) -> Response {
    if group.display_name.is_empty() {
        return bad_request("displayName is required");
    }

    let id = Uuid::new_v4().to_string();
    group.id = Some(id.clone());
    group.schemas = vec![GROUP_SCHEMA.to_string()];
    group.meta = Some(Meta::new("Group", &id));

    let value = match serde_json::to_value(&group) {
        Ok(value) => value,
        Err(err) => return store_failure(err.into()),
    };
    if let Err(err) = state.store.put(&group_key(&id), value.clone()).await {
        return store_failure(err);
    }

    (StatusCode::CREATED, Json(value)).into_response()
}

pub async fn get_group(
    State(state): State<Arc<AppState>>,
    _auth: ScimAuth,
    Path(id): Path<String>,
) -> Response {
    match state.store.get(&group_key(&id)).await {
        Some(value) => Json(value).into_response(),
        None => not_found("Group not found"),
    }
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    _auth: ScimAuth,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete(&group_key(&id)).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found("Group not found"),
        Err(err) => store_failure(err),
    }
}

/// The SCIM username behind a member reference: members carry the User
/// resource id, but IdPs that skip user provisioning send the username
/// directly, so fall back to the raw value.
async fn resolve_username(state: &AppState, member_value: &str) -> String {
    match state.store.get(&user_key(member_value)).await {
        Some(value) => value
            .get("userName")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| member_value.to_string()),
        None => member_value.to_string(),
    }
}

/// Display names of every other stored group that still lists the member.
async fn retained_groups(state: &AppState, exclude_key: &str, member_value: &str) -> Vec<String> {
    state
        .store
        .list("Group/")
        .await
        .into_iter()
        .filter(|(key, _)| key != exclude_key)
        .filter_map(|(_, value)| serde_json::from_value::<ScimGroup>(value).ok())
        .filter(|group| group.members.iter().any(|m| m.value == member_value))
        .map(|group| group.display_name)
        .collect()
}

/// `PATCH /scim/v2/Groups/{id}` — membership edits pushed by the IdP. Each
/// added or removed member drives the corresponding room sync flow.
pub async fn patch_group(
    State(state): State<Arc<AppState>>,
    _auth: ScimAuth,
    Path(id): Path<String>,
    Json(patch): Json<ScimPatchRequest>,
) -> Response {
    let key = group_key(&id);
    let Some(stored) = state.store.get(&key).await else {
        return not_found("Group not found");
    };
    let mut group: ScimGroup = match serde_json::from_value(stored) {
        Ok(group) => group,
        Err(err) => return store_failure(err.into()),
    };

    if !patch.schemas.iter().any(|s| s == GROUP_SCHEMA) {
        return bad_request("Invalid SCIM schema");
    }

    for operation in &patch.operations {
        if operation.path != "members" {
            return bad_request("Only 'members' modifications are supported");
        }

        for member in &operation.value {
            let Some(member_value) = member.get("value").and_then(Value::as_str) else {
                return bad_request("Each member must have a 'value' (user ID)");
            };
            let username = resolve_username(&state, member_value).await;

            match operation.op {
                PatchOp::Add => {
                    info!(user = %username, group = %group.display_name, "SCIM patch: adding member");
                    if !group.members.iter().any(|m| m.value == member_value) {
                        group.members.push(MemberRef {
                            value: member_value.to_string(),
                            display: None,
                        });
                    }
                    let report = state
                        .orchestrator
                        .sync_add(&username, &[group.display_name.clone()])
                        .await;
                    for room in report.failed_rooms() {
                        error!(user = %username, room, "SCIM-driven add failed for room");
                    }
                }
                PatchOp::Remove => {
                    info!(user = %username, group = %group.display_name, "SCIM patch: removing member");
                    group.members.retain(|m| m.value != member_value);
                    let retained = retained_groups(&state, &key, member_value).await;
                    let report = state
                        .orchestrator
                        .sync_remove(&username, &retained, &[group.display_name.clone()])
                        .await;
                    for room in report.failed_rooms() {
                        error!(user = %username, room, "SCIM-driven remove failed for room");
                    }
                }
            }
        }
    }

    if let Some(meta) = &mut group.meta {
        meta.touch();
    }
    let value = match serde_json::to_value(&group) {
        Ok(value) => value,
        Err(err) => return store_failure(err.into()),
    };
    if let Err(err) = state.store.put(&key, value).await {
        return store_failure(err);
    }

    Json(json!({ "message": "Group updated successfully" })).into_response()
}
