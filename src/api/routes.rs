use axum::{routing::get, Router};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Instances
        .route("/instances", get(handlers::list_instances))
        .route(
            "/instances/:id",
            get(handlers::get_instance)
                .put(handlers::register_instance)
                .delete(handlers::delete_instance),
        )
        .with_state(state)
}
