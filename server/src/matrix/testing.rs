//! In-memory `MatrixClient` double for tests. Records every call it receives
//! and simulates just enough homeserver behavior for the sync flows: joined
//! rooms, power levels, the "already in the room" join rejection, and the
//! external-id account registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RemoteCallError;

use super::client::{MatrixClient, UpsertUserParams};

#[derive(Default)]
struct State {
    /// Rooms the bridge admin is joined to.
    admin_joined: BTreeSet<String>,
    /// room -> user -> power level.
    power: HashMap<String, HashMap<String, i64>>,
    /// room -> members.
    members: HashMap<String, BTreeSet<String>>,
    /// external id -> matrix id.
    accounts: HashMap<String, String>,
    calls: Vec<String>,
    /// (method, room) -> simulated failure, applied on every matching call.
    fail_for_room: HashMap<(String, String), (u16, String)>,
    /// method -> one-shot simulated failure.
    fail_next: HashMap<String, (u16, String)>,
}

pub struct RecordingClient {
    admin_user_id: String,
    state: Mutex<State>,
}

impl RecordingClient {
    pub fn new(admin_user_id: &str) -> Self {
        Self {
            admin_user_id: admin_user_id.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Fail the next call of `method`, whatever room it targets.
    pub fn fail_next(&self, method: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_next
            .insert(method.to_string(), (status, body.to_string()));
    }

    /// Fail every call of `method` that targets `room`.
    pub fn fail_for_room(&self, method: &str, room: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_for_room
            .insert(
                (method.to_string(), room.to_string()),
                (status, body.to_string()),
            );
    }

    /// Seed the admin's membership and power level in a room.
    pub fn set_admin_state(&self, room: &str, joined: bool, level: i64) {
        let mut state = self.state.lock().unwrap();
        if joined {
            state.admin_joined.insert(room.to_string());
        } else {
            state.admin_joined.remove(room);
        }
        state
            .power
            .entry(room.to_string())
            .or_default()
            .insert(self.admin_user_id.clone(), level);
    }

    /// Seed a room member.
    pub fn set_member(&self, room: &str, user: &str) {
        self.state
            .lock()
            .unwrap()
            .members
            .entry(room.to_string())
            .or_default()
            .insert(user.to_string());
    }

    pub fn is_member(&self, room: &str, user: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .members
            .get(room)
            .is_some_and(|m| m.contains(user))
    }

    pub fn register_account(&self, external_id: &str, matrix_id: &str) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(external_id.to_string(), matrix_id.to_string());
    }

    pub fn registered_account(&self, external_id: &str) -> Option<String> {
        self.state.lock().unwrap().accounts.get(external_id).cloned()
    }

    /// Record the call, then return a simulated failure if one is armed.
    fn begin(&self, method: &str, room: &str, call: String) -> Result<(), RemoteCallError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);

        let failure = state
            .fail_for_room
            .get(&(method.to_string(), room.to_string()))
            .cloned()
            .or_else(|| state.fail_next.remove(method));

        match failure {
            Some((status, body)) => Err(RemoteCallError::Status {
                endpoint: method.to_string(),
                status,
                body,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MatrixClient for RecordingClient {
    async fn joined_rooms(&self) -> Result<Vec<String>, RemoteCallError> {
        self.begin("joined_rooms", "", "joined_rooms".to_string())?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .admin_joined
            .iter()
            .cloned()
            .collect())
    }

    async fn room_power_levels(
        &self,
        room_id: &str,
    ) -> Result<HashMap<String, i64>, RemoteCallError> {
        self.begin(
            "room_power_levels",
            room_id,
            format!("room_power_levels {room_id}"),
        )?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .power
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn force_join_room_admin(&self, room_id: &str) -> Result<(), RemoteCallError> {
        self.begin(
            "force_join_room_admin",
            room_id,
            format!("force_join_room_admin {room_id}"),
        )?;
        let mut state = self.state.lock().unwrap();
        state.admin_joined.insert(room_id.to_string());
        state
            .power
            .entry(room_id.to_string())
            .or_default()
            .insert(self.admin_user_id.clone(), 100);
        Ok(())
    }

    async fn accept_room_join(&self, room_id: &str) -> Result<(), RemoteCallError> {
        self.begin(
            "accept_room_join",
            room_id,
            format!("accept_room_join {room_id}"),
        )
    }

    async fn join_user(&self, room_id: &str, user_id: &str) -> Result<(), RemoteCallError> {
        self.begin("join_user", room_id, format!("join_user {room_id} {user_id}"))?;
        let mut state = self.state.lock().unwrap();
        let members = state.members.entry(room_id.to_string()).or_default();
        if members.contains(user_id) {
            return Err(RemoteCallError::Status {
                endpoint: "join_user".to_string(),
                status: 400,
                body: serde_json::json!({
                    "errcode": "M_UNKNOWN",
                    "error": format!("{user_id} is already in the room."),
                })
                .to_string(),
            });
        }
        members.insert(user_id.to_string());
        Ok(())
    }

    async fn kick_user(
        &self,
        room_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), RemoteCallError> {
        self.begin(
            "kick_user",
            room_id,
            format!("kick_user {room_id} {user_id} {reason}"),
        )?;
        let mut state = self.state.lock().unwrap();
        if let Some(members) = state.members.get_mut(room_id) {
            members.remove(user_id);
        }
        Ok(())
    }

    async fn upsert_user(&self, params: &UpsertUserParams) -> Result<(), RemoteCallError> {
        self.begin(
            "upsert_user",
            "",
            format!("upsert_user {}", params.matrix_id),
        )?;
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(params.external_id.clone(), params.matrix_id.clone());
        Ok(())
    }

    async fn lookup_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<String>, RemoteCallError> {
        self.begin(
            "lookup_external_id",
            "",
            format!("lookup_external_id {external_id}"),
        )?;
        Ok(self.registered_account(external_id))
    }
}
