use tracing::{debug, info};

use crate::error::RemoteCallError;

use super::client::MatrixClient;

/// Power level at and above which an account can manage room membership.
pub const ROOM_ADMIN_POWER_LEVEL: i64 = 100;

/// Make sure the bridge admin account is joined to `room_id` with admin
/// power before any membership mutation touches the room.
///
/// The room state is probed fresh on every call — privilege can be revoked
/// out-of-band by other room admins, so nothing here is cached:
/// - not joined: force-join as admin, then accept the pending join. If
///   either call fails the guarantee is not established and the error
///   propagates.
/// - joined but below [`ROOM_ADMIN_POWER_LEVEL`]: force-join again, which
///   re-grants admin power without a fresh join.
/// - joined with admin power: nothing to do, no mutation calls are issued.
pub async fn ensure_room_admin(
    client: &dyn MatrixClient,
    admin_user_id: &str,
    room_id: &str,
) -> Result<(), RemoteCallError> {
    let joined = client.joined_rooms().await?.iter().any(|r| r == room_id);

    if !joined {
        info!(room = room_id, admin = admin_user_id, "joining bridge admin to room");
        client.force_join_room_admin(room_id).await?;
        client.accept_room_join(room_id).await?;
        return Ok(());
    }

    let levels = client.room_power_levels(room_id).await?;
    let level = levels.get(admin_user_id).copied().unwrap_or(0);

    if level < ROOM_ADMIN_POWER_LEVEL {
        info!(
            room = room_id,
            admin = admin_user_id,
            level,
            "re-granting admin power to bridge admin"
        );
        client.force_join_room_admin(room_id).await?;
    } else {
        debug!(room = room_id, admin = admin_user_id, "bridge admin already privileged");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::testing::RecordingClient;

    #[tokio::test]
    async fn absent_admin_is_joined_and_confirmed() {
        let client = RecordingClient::new("@admin:example.org");

        ensure_room_admin(&client, "@admin:example.org", "!r:example.org")
            .await
            .unwrap();

        assert_eq!(
            client.calls(),
            vec![
                "joined_rooms",
                "force_join_room_admin !r:example.org",
                "accept_room_join !r:example.org",
            ]
        );
    }

    #[tokio::test]
    async fn demoted_admin_is_repromoted_without_rejoining() {
        let client = RecordingClient::new("@admin:example.org");
        client.set_admin_state("!r:example.org", true, 50);

        ensure_room_admin(&client, "@admin:example.org", "!r:example.org")
            .await
            .unwrap();

        assert_eq!(
            client.calls(),
            vec![
                "joined_rooms",
                "room_power_levels !r:example.org",
                "force_join_room_admin !r:example.org",
            ]
        );
    }

    #[tokio::test]
    async fn second_call_with_no_state_change_is_a_noop() {
        let client = RecordingClient::new("@admin:example.org");

        ensure_room_admin(&client, "@admin:example.org", "!r:example.org")
            .await
            .unwrap();
        client.clear_calls();

        ensure_room_admin(&client, "@admin:example.org", "!r:example.org")
            .await
            .unwrap();

        // Probes only, no mutation calls the second time around.
        assert_eq!(
            client.calls(),
            vec!["joined_rooms", "room_power_levels !r:example.org"]
        );
    }

    #[tokio::test]
    async fn force_join_failure_propagates() {
        let client = RecordingClient::new("@admin:example.org");
        client.fail_next("force_join_room_admin", 502, "gateway timeout");

        let err = ensure_room_admin(&client, "@admin:example.org", "!r:example.org")
            .await
            .unwrap_err();

        match err {
            RemoteCallError::Status { status, .. } => assert_eq!(status, 502),
            other => panic!("expected status error, got {other:?}"),
        }
        // accept_room_join is never attempted once the force-join failed.
        assert!(!client.calls().iter().any(|c| c.starts_with("accept_room_join")));
    }
}
