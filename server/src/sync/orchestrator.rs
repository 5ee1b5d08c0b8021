use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::GroupRoomMap;
use crate::error::SyncError;
use crate::matrix::admin::ensure_room_admin;
use crate::matrix::client::MatrixClient;
use crate::matrix::identity::matrix_user_id;
use crate::matrix::membership::{self, AddOutcome};

use super::resolver;

/// Webhook body for `/sync/matrix` and `/sync/matrix/remove`.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub secret: Option<String>,
    pub user: Option<UserPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub username: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub remove_groups: Vec<String>,
}

/// What was attempted against one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipAction {
    Join,
    Kick,
}

/// Outcome of one per-room operation.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomResult {
    Done,
    AlreadyPresent,
    Failed { reason: String },
}

#[derive(Debug, Serialize)]
pub struct RoomOutcome {
    pub room_id: String,
    pub action: MembershipAction,
    pub result: RoomResult,
}

/// Aggregated result of one membership event. Per-room failures are recorded
/// here rather than aborting the event: the loop over affected rooms always
/// runs to completion.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub user_id: String,
    pub rooms: Vec<RoomOutcome>,
}

impl SyncReport {
    pub fn failed_rooms(&self) -> Vec<&str> {
        self.rooms
            .iter()
            .filter(|r| matches!(r.result, RoomResult::Failed { .. }))
            .map(|r| r.room_id.as_str())
            .collect()
    }
}

struct ValidatedEvent {
    username: String,
    groups: Vec<String>,
    remove_groups: Vec<String>,
}

/// Entry point for membership events. Holds the immutable configuration it
/// was constructed with; no ambient globals.
pub struct Orchestrator {
    map: GroupRoomMap,
    secret: String,
    server_name: String,
    admin_user_id: String,
    client: Arc<dyn MatrixClient>,
}

impl Orchestrator {
    pub fn new(
        map: GroupRoomMap,
        secret: String,
        server_name: String,
        admin_user_id: String,
        client: Arc<dyn MatrixClient>,
    ) -> Self {
        Self {
            map,
            secret,
            server_name,
            admin_user_id,
            client,
        }
    }

    /// Secret and user checks, in that order, before any remote call.
    fn validate(&self, request: &SyncRequest) -> Result<ValidatedEvent, SyncError> {
        match request.secret.as_deref() {
            None | Some("") => return Err(SyncError::validation("No secret provided")),
            Some(secret) if secret != self.secret => {
                return Err(SyncError::authorization("Invalid secret provided"));
            }
            Some(_) => {}
        }

        let user = request
            .user
            .as_ref()
            .ok_or_else(|| SyncError::validation("No user provided"))?;
        let username = match user.username.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(SyncError::validation("No user provided")),
        };

        Ok(ValidatedEvent {
            username,
            groups: user.groups.clone(),
            remove_groups: user.remove_groups.clone(),
        })
    }

    /// Handle an add-triggered event: join the user to every room reachable
    /// through their current groups.
    pub async fn handle_add_event(&self, request: &SyncRequest) -> Result<SyncReport, SyncError> {
        let event = self.validate(request)?;
        Ok(self.sync_add(&event.username, &event.groups).await)
    }

    /// Handle a removal-triggered event: kick the user from rooms mapped by
    /// the removed groups, unless a retained group still reaches the room.
    pub async fn handle_remove_event(
        &self,
        request: &SyncRequest,
    ) -> Result<SyncReport, SyncError> {
        let event = self.validate(request)?;
        if event.remove_groups.is_empty() {
            return Err(SyncError::validation("No remove_groups provided"));
        }
        Ok(self
            .sync_remove(&event.username, &event.groups, &event.remove_groups)
            .await)
    }

    /// Validated add flow, also driven directly by SCIM group patches.
    pub async fn sync_add(&self, username: &str, groups: &[String]) -> SyncReport {
        let rooms = resolver::resolve_add(&self.map, groups);
        info!(user = username, rooms = rooms.len(), "syncing group additions");
        self.run(username, rooms, MembershipAction::Join).await
    }

    /// Validated remove flow, also driven directly by SCIM group patches.
    pub async fn sync_remove(
        &self,
        username: &str,
        retained_groups: &[String],
        removed_groups: &[String],
    ) -> SyncReport {
        let rooms = resolver::resolve_remove(&self.map, retained_groups, removed_groups);
        info!(user = username, rooms = rooms.len(), "syncing group removals");
        self.run(username, rooms, MembershipAction::Kick).await
    }

    /// Drive the per-room loop: guarantee admin rights, then mutate. A
    /// failure is recorded and the loop moves on to the next room.
    async fn run(
        &self,
        username: &str,
        rooms: BTreeSet<String>,
        action: MembershipAction,
    ) -> SyncReport {
        let user_id = matrix_user_id(username, &self.server_name);
        let mut report = SyncReport {
            user_id: user_id.clone(),
            rooms: Vec::with_capacity(rooms.len()),
        };

        for room_id in rooms {
            let result = self.sync_room(&room_id, &user_id, action).await;
            report.rooms.push(RoomOutcome {
                room_id,
                action,
                result,
            });
        }

        report
    }

    async fn sync_room(&self, room_id: &str, user_id: &str, action: MembershipAction) -> RoomResult {
        if let Err(err) =
            ensure_room_admin(self.client.as_ref(), &self.admin_user_id, room_id).await
        {
            error!(room = room_id, "could not guarantee admin rights in room");
            debug!(room = room_id, detail = %err, "homeserver diagnostics");
            return RoomResult::Failed {
                reason: err.to_string(),
            };
        }

        let outcome = match action {
            MembershipAction::Join => membership::add_to_room(self.client.as_ref(), user_id, room_id)
                .await
                .map(|outcome| match outcome {
                    AddOutcome::Added => RoomResult::Done,
                    AddOutcome::AlreadyPresent => RoomResult::AlreadyPresent,
                }),
            MembershipAction::Kick => {
                membership::remove_from_room(self.client.as_ref(), user_id, room_id)
                    .await
                    .map(|()| RoomResult::Done)
            }
        };

        match outcome {
            Ok(result) => result,
            Err(err) => {
                error!(user = user_id, room = room_id, ?action, "membership operation failed");
                debug!(room = room_id, detail = %err, "homeserver diagnostics");
                RoomResult::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}
