use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::error::RemoteCallError;

/// Capabilities the sync core needs from the homeserver. The orchestrator,
/// guarantor and operator only ever talk to this trait, so tests can inject
/// an in-memory double.
#[async_trait]
pub trait MatrixClient: Send + Sync {
    /// Rooms the bridge admin account is currently joined to.
    async fn joined_rooms(&self) -> Result<Vec<String>, RemoteCallError>;

    /// Power-level map (user id -> level) of a room.
    async fn room_power_levels(
        &self,
        room_id: &str,
    ) -> Result<HashMap<String, i64>, RemoteCallError>;

    /// Force-join the bridge admin into a room, granting admin power.
    async fn force_join_room_admin(&self, room_id: &str) -> Result<(), RemoteCallError>;

    /// Accept the pending room join for the bridge admin account.
    async fn accept_room_join(&self, room_id: &str) -> Result<(), RemoteCallError>;

    /// Admin-join an arbitrary user into a room.
    async fn join_user(&self, room_id: &str, user_id: &str) -> Result<(), RemoteCallError>;

    /// Kick a user from a room with an audit reason.
    async fn kick_user(
        &self,
        room_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), RemoteCallError>;

    /// Create or update a homeserver account.
    async fn upsert_user(&self, params: &UpsertUserParams) -> Result<(), RemoteCallError>;

    /// Matrix id previously registered for an external IdP id, if any.
    async fn lookup_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<String>, RemoteCallError>;
}

/// Account attributes pushed to the homeserver when provisioning a user.
#[derive(Debug, Clone)]
pub struct UpsertUserParams {
    pub matrix_id: String,
    pub display_name: String,
    pub external_id: String,
    pub email: Option<String>,
}

/// `MatrixClient` backed by the Synapse admin and client-server HTTP APIs.
pub struct HttpMatrixClient {
    http: reqwest::Client,
    base_url: String,
    admin_user_id: String,
    idp_name: String,
}

impl HttpMatrixClient {
    /// Build a client with the admin bearer token baked into every request
    /// and a bounded per-request timeout.
    pub fn new(
        base_url: &str,
        admin_token: &str,
        admin_user_id: &str,
        idp_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", admin_token))
            .context("admin token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_user_id: admin_user_id.to_string(),
            idp_name: idp_name.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx response into a `RemoteCallError::Status` carrying the
    /// raw body for diagnostics.
    async fn check(
        endpoint: &str,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, RemoteCallError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(RemoteCallError::Status {
            endpoint: endpoint.to_string(),
            status,
            body,
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<(), RemoteCallError> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        Self::check(path, resp).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct JoinedRoomsResponse {
    joined_rooms: Vec<String>,
}

#[derive(Deserialize)]
struct PowerLevelsResponse {
    #[serde(default)]
    users: HashMap<String, i64>,
}

#[derive(Deserialize)]
struct ExternalIdResponse {
    user_id: String,
}

#[async_trait]
impl MatrixClient for HttpMatrixClient {
    async fn joined_rooms(&self) -> Result<Vec<String>, RemoteCallError> {
        let path = "/_matrix/client/v3/joined_rooms";
        let resp = self.http.get(self.url(path)).send().await?;
        let resp = Self::check(path, resp).await?;
        let parsed: JoinedRoomsResponse = resp.json().await?;
        Ok(parsed.joined_rooms)
    }

    async fn room_power_levels(
        &self,
        room_id: &str,
    ) -> Result<HashMap<String, i64>, RemoteCallError> {
        let path = format!(
            "/_matrix/client/v3/rooms/{}/state/m.room.power_levels",
            room_id
        );
        let resp = self.http.get(self.url(&path)).send().await?;
        let resp = Self::check(&path, resp).await?;
        let parsed: PowerLevelsResponse = resp.json().await?;
        Ok(parsed.users)
    }

    async fn force_join_room_admin(&self, room_id: &str) -> Result<(), RemoteCallError> {
        self.post_json(
            &format!("/_synapse/admin/v1/rooms/{}/make_room_admin", room_id),
            &json!({ "user_id": self.admin_user_id }),
        )
        .await
    }

    async fn accept_room_join(&self, room_id: &str) -> Result<(), RemoteCallError> {
        self.post_json(&format!("/_matrix/client/v3/join/{}", room_id), &json!({}))
            .await
    }

    async fn join_user(&self, room_id: &str, user_id: &str) -> Result<(), RemoteCallError> {
        self.post_json(
            &format!("/_synapse/admin/v1/join/{}", room_id),
            &json!({ "user_id": user_id }),
        )
        .await
    }

    async fn kick_user(
        &self,
        room_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), RemoteCallError> {
        self.post_json(
            &format!("/_matrix/client/v3/rooms/{}/kick", room_id),
            &json!({ "user_id": user_id, "reason": reason }),
        )
        .await
    }

    async fn upsert_user(&self, params: &UpsertUserParams) -> Result<(), RemoteCallError> {
        let mut body = json!({
            "displayname": params.display_name,
            "external_ids": [
                {
                    "auth_provider": self.idp_name,
                    "external_id": params.external_id,
                }
            ],
        });
        if let Some(email) = &params.email {
            body["threepids"] = json!([{ "medium": "email", "address": email }]);
        }

        let path = format!("/_synapse/admin/v2/users/{}", params.matrix_id);
        let resp = self.http.put(self.url(&path)).json(&body).send().await?;
        Self::check(&path, resp).await?;
        Ok(())
    }

    async fn lookup_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<String>, RemoteCallError> {
        let path = format!(
            "/_synapse/admin/v1/auth_providers/{}/users/{}",
            self.idp_name, external_id
        );
        let resp = self.http.get(self.url(&path)).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check(&path, resp).await?;
        let parsed: ExternalIdResponse = resp.json().await?;
        Ok(Some(parsed.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> HttpMatrixClient {
        HttpMatrixClient::new(
            &server.uri(),
            "test-token",
            "@admin:example.org",
            "oidc",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn joined_rooms_sends_bearer_and_parses_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "joined_rooms": ["!a:example.org", "!b:example.org"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let rooms = client.joined_rooms().await.unwrap();
        assert_eq!(rooms, vec!["!a:example.org", "!b:example.org"]);
    }

    #[tokio::test]
    async fn join_user_posts_user_id_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_synapse/admin/v1/join/!room:example.org"))
            .and(body_json(
                serde_json::json!({ "user_id": "@alice:example.org" }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client
            .join_user("!room:example.org", "@alice:example.org")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_2xx_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/rooms/!room:example.org/kick"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "errcode": "M_FORBIDDEN",
                "error": "not in room"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .kick_user("!room:example.org", "@alice:example.org", "Removed from group")
            .await
            .unwrap_err();

        match err {
            RemoteCallError::Status { status, body, .. } => {
                assert_eq!(status, 403);
                assert!(body.contains("M_FORBIDDEN"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lookup_external_id_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_synapse/admin/v1/auth_providers/oidc/users/alice"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "errcode": "M_NOT_FOUND",
                "error": "User not found"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(client.lookup_external_id("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lookup_external_id_returns_registered_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_synapse/admin/v1/auth_providers/oidc/users/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user_id": "@alice:example.org"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(
            client.lookup_external_id("alice").await.unwrap(),
            Some("@alice:example.org".to_string())
        );
    }
}
