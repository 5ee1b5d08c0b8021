use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Static mapping from IdP group name to the rooms that group grants access
/// to. Loaded once at startup and immutable for the process lifetime.
/// `BTreeMap` so iteration order (and therefore logs and sync reports) is
/// deterministic.
pub type GroupRoomMap = BTreeMap<String, Vec<String>>;

/// Top-level server configuration, loaded from groupsync.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub webhook: WebhookSection,
    pub matrix: MatrixSection,
    pub scim: ScimSection,
    /// Group name -> ordered list of room ids.
    pub mappings: GroupRoomMap,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct WebhookSection {
    /// Shared secret the IdP must present in webhook bodies and as the SCIM
    /// bearer token.
    pub secret: String,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            secret: "groupsync-dev-secret-change-me".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct MatrixSection {
    /// Base URL of the homeserver, e.g. "https://matrix.example.org".
    pub base_url: String,
    /// Access token of the bridge admin account.
    pub admin_token: String,
    /// Full Matrix id of the bridge admin account, e.g. "@admin:example.org".
    pub admin_user_id: String,
    /// Server name used to derive Matrix ids from external usernames.
    pub server_name: String,
    /// Timeout applied to every homeserver call.
    pub request_timeout_secs: u64,
}

impl Default for MatrixSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8008".into(),
            admin_token: String::new(),
            admin_user_id: "@admin:localhost".into(),
            server_name: "localhost".into(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ScimSection {
    /// Path of the JSON file backing the SCIM resource store.
    pub store_path: String,
    /// Synapse auth provider id used for external-id lookups.
    pub idp_name: String,
}

impl Default for ScimSection {
    fn default() -> Self {
        Self {
            store_path: "scim_store.json".into(),
            idp_name: "oidc".into(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Self {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config file {}: {}", path, e));
            toml::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse config file {}: {}", path, e))
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LISTEN_ADDRESS") {
            self.server.listen_address = v;
        }
        if let Ok(v) = std::env::var("WEBHOOK_SECRET") {
            self.webhook.secret = v;
        }
        if let Ok(v) = std::env::var("MATRIX_URL") {
            self.matrix.base_url = v;
        }
        if let Ok(v) = std::env::var("MATRIX_ADMIN_TOKEN") {
            self.matrix.admin_token = v;
        }
        if let Ok(v) = std::env::var("MATRIX_ADMIN_USER_ID") {
            self.matrix.admin_user_id = v;
        }
        if let Ok(v) = std::env::var("MATRIX_SERVER_NAME") {
            self.matrix.server_name = v;
        }
        if let Ok(v) = std::env::var("MATRIX_REQUEST_TIMEOUT_SECS")
            && let Ok(secs) = v.parse()
        {
            self.matrix.request_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("SCIM_STORE_PATH") {
            self.scim.store_path = v;
        }
        if let Ok(v) = std::env::var("IDP_NAME") {
            self.scim.idp_name = v;
        }
        if let Ok(v) = std::env::var("GROUP_ROOM_MAP") {
            self.mappings = serde_json::from_str(&v)
                .unwrap_or_else(|e| panic!("failed to parse GROUP_ROOM_MAP: {}", e));
        }
    }
}
