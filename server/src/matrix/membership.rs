use tracing::{debug, info};

use crate::error::RemoteCallError;

use super::client::MatrixClient;

/// Audit reason attached to every kick.
pub const KICK_REASON: &str = "Removed from group";

/// Result of an add: joining an already-joined user is a success, not an
/// error, so repeated add events are safe to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

/// Admin-join `matrix_user_id` into `room_id`.
///
/// The homeserver rejects joins of users that are already in the room with a
/// dedicated error payload; that payload maps to [`AddOutcome::AlreadyPresent`].
/// Any other non-2xx response propagates with its status and body.
pub async fn add_to_room(
    client: &dyn MatrixClient,
    matrix_user_id: &str,
    room_id: &str,
) -> Result<AddOutcome, RemoteCallError> {
    info!(user = matrix_user_id, room = room_id, "adding user to room");

    match client.join_user(room_id, matrix_user_id).await {
        Ok(()) => Ok(AddOutcome::Added),
        Err(err) => {
            let already_present = format!("{} is already in the room.", matrix_user_id);
            if err.remote_error_message().as_deref() == Some(already_present.as_str()) {
                debug!(user = matrix_user_id, room = room_id, "user already in room");
                Ok(AddOutcome::AlreadyPresent)
            } else {
                Err(err)
            }
        }
    }
}

/// Kick `matrix_user_id` from `room_id` with the fixed audit reason.
pub async fn remove_from_room(
    client: &dyn MatrixClient,
    matrix_user_id: &str,
    room_id: &str,
) -> Result<(), RemoteCallError> {
    info!(user = matrix_user_id, room = room_id, "removing user from room");
    client.kick_user(room_id, matrix_user_id, KICK_REASON).await
}
