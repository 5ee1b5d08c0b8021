use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use super::app_state::AppState;
use super::{scim_api, sync_api};

/// Build the axum router with the webhook and SCIM routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Webhook sync endpoints — the shared secret travels in the body, so no
    // extractor-level auth here.
    let sync_routes = Router::new()
        .route("/", axum::routing::get(sync_api::health))
        .route("/health", axum::routing::get(sync_api::health))
        .route("/sync/matrix", axum::routing::post(sync_api::matrix_sync))
        .route(
            "/sync/matrix/remove",
            axum::routing::post(sync_api::matrix_sync_remove),
        );

    // SCIM v2 endpoints — bearer-token protected via the ScimAuth extractor.
    let scim_routes = Router::new()
        .route(
            "/ServiceProviderConfig",
            axum::routing::get(scim_api::service_provider_config),
        )
        .route(
            "/Users",
            axum::routing::get(scim_api::list_users).post(scim_api::create_user),
        )
        .route(
            "/Users/{id}",
            axum::routing::get(scim_api::get_user)
                .put(scim_api::put_user)
                .delete(scim_api::delete_user),
        )
        .route(
            "/Groups",
            axum::routing::get(scim_api::list_groups).post(scim_api::create_group),
        )
        .route(
            "/Groups/{id}",
            axum::routing::get(scim_api::get_group)
                .patch(scim_api::patch_group)
                .delete(scim_api::delete_group),
        );

    Router::new()
        .merge(sync_routes)
        .nest("/scim/v2", scim_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
