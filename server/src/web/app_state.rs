use std::sync::Arc;

use crate::matrix::client::MatrixClient;
use crate::scim::store::JsonStore;
use crate::sync::orchestrator::Orchestrator;

/// Shared state handed to every handler. Everything in here is either
/// immutable or internally synchronized; requests never coordinate with each
/// other beyond this.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub matrix: Arc<dyn MatrixClient>,
    pub store: JsonStore,
    /// Shared secret, doubling as the SCIM bearer token.
    pub scim_bearer_token: String,
    /// Server name used to derive Matrix ids for provisioned accounts.
    pub server_name: String,
}
