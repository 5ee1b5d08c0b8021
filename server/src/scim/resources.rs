//! SCIM 2.0 wire models — just the subset of RFC 7643/7644 the bridge
//! exchanges with the IdP.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
pub const LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
pub const ERROR_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub resource_type: String,
    pub created: String,
    pub last_modified: String,
    pub location: String,
}

impl Meta {
    pub fn new(resource_type: &str, id: &str) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            resource_type: resource_type.to_string(),
            created: now.clone(),
            last_modified: now,
            location: format!("/scim/v2/{}s/{}", resource_type, id),
        }
    }

    pub fn touch(&mut self) {
        self.last_modified = Utc::now().to_rfc3339();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimUser {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub emails: Vec<Email>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

fn default_active() -> bool {
    true
}

impl ScimUser {
    /// Primary email, falling back to the first listed one.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .find(|e| e.primary.unwrap_or(false))
            .or_else(|| self.emails.first())
            .map(|e| e.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRef {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimGroup {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub members: Vec<MemberRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// SCIM PATCH request: only membership edits on Groups are supported.
#[derive(Debug, Deserialize)]
pub struct ScimPatchRequest {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(rename = "Operations", default)]
    pub operations: Vec<PatchOperation>,
}

#[derive(Debug, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    #[serde(default = "default_patch_path")]
    pub path: String,
    #[serde(default)]
    pub value: Vec<Value>,
}

fn default_patch_path() -> String {
    "members".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub schemas: Vec<String>,
    pub total_results: usize,
    pub start_index: usize,
    pub items_per_page: usize,
    #[serde(rename = "Resources")]
    pub resources: Vec<Value>,
}

impl ListResponse {
    pub fn of(resources: Vec<Value>) -> Self {
        Self {
            schemas: vec![LIST_RESPONSE_SCHEMA.to_string()],
            total_results: resources.len(),
            start_index: 1,
            items_per_page: resources.len(),
            resources,
        }
    }
}

/// RFC 7644 error body.
pub fn scim_error(status: u16, detail: &str) -> Value {
    json!({
        "schemas": [ERROR_SCHEMA],
        "status": status.to_string(),
        "detail": detail,
    })
}

/// Capability document served at /scim/v2/ServiceProviderConfig.
pub fn service_provider_config() -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:ServiceProviderConfig"],
        "patch": { "supported": true },
        "bulk": { "supported": false },
        "filter": { "supported": false },
        "changePassword": { "supported": false },
        "sort": { "supported": false },
        "etag": { "supported": false },
        "authenticationSchemes": [],
        "meta": {
            "resourceType": "ServiceProviderConfig",
            "location": "/scim/v2/ServiceProviderConfig",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_request_defaults_path_to_members() {
        let req: ScimPatchRequest = serde_json::from_value(json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [
                { "op": "add", "value": [{ "value": "alice" }] }
            ]
        }))
        .unwrap();

        assert_eq!(req.operations.len(), 1);
        assert_eq!(req.operations[0].op, PatchOp::Add);
        assert_eq!(req.operations[0].path, "members");
    }

    #[test]
    fn user_roundtrips_camel_case_fields() {
        let user: ScimUser = serde_json::from_value(json!({
            "schemas": [USER_SCHEMA],
            "userName": "alice",
            "displayName": "Alice",
            "externalId": "idp-42",
            "emails": [{ "value": "alice@example.org", "primary": true }]
        }))
        .unwrap();

        assert_eq!(user.user_name, "alice");
        assert_eq!(user.external_id.as_deref(), Some("idp-42"));
        assert_eq!(user.primary_email(), Some("alice@example.org"));
        assert!(user.active);

        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["userName"], "alice");
        assert_eq!(value["displayName"], "Alice");
    }
}
