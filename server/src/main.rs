use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use groupsync_server::config::ServerConfig;
use groupsync_server::matrix::client::{HttpMatrixClient, MatrixClient};
use groupsync_server::scim::store::JsonStore;
use groupsync_server::sync::orchestrator::Orchestrator;
use groupsync_server::web::app_state::AppState;
use groupsync_server::web::router::build_router;

#[derive(Parser)]
#[command(
    name = "groupsync-server",
    about = "IdP group membership to Matrix room provisioning bridge"
)]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = "groupsync.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config);

    info!("Starting group sync bridge");
    for (group, rooms) in &config.mappings {
        info!("Group: {} -> Rooms: {:?}", group, rooms);
    }

    let matrix: Arc<dyn MatrixClient> = Arc::new(
        HttpMatrixClient::new(
            &config.matrix.base_url,
            &config.matrix.admin_token,
            &config.matrix.admin_user_id,
            &config.scim.idp_name,
            Duration::from_secs(config.matrix.request_timeout_secs),
        )
        .expect("failed to build homeserver client"),
    );

    let store = JsonStore::open(&config.scim.store_path).expect("failed to open SCIM store");

    let orchestrator = Orchestrator::new(
        config.mappings.clone(),
        config.webhook.secret.clone(),
        config.matrix.server_name.clone(),
        config.matrix.admin_user_id.clone(),
        matrix.clone(),
    );

    let app_state = Arc::new(AppState {
        orchestrator,
        matrix,
        store,
        scim_bearer_token: config.webhook.secret.clone(),
        server_name: config.matrix.server_name.clone(),
    });

    let app = build_router(app_state);

    info!(
        "Group sync bridge starting — listening on {}",
        config.server.listen_address
    );

    let listener = tokio::net::TcpListener::bind(&config.server.listen_address)
        .await
        .expect("failed to bind listener");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
