pub mod app_state;
pub mod auth;
pub mod router;
pub mod scim_api;
pub mod sync_api;
