use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::core::registry::ObjectRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ObjectRegistry>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Arc<ObjectRegistry>) -> Self {
        Self {
            registry,
            started_at: Utc::now(),
        }
    }
}

/// Build the resource API router
pub fn create_api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/objects", get(handlers::list_objects))
        .route(
            "/api/v1/objects/{object_id}/{instance_id}/{resource_id}",
            get(handlers::read_resource).put(handlers::write_resource),
        )
        .route(
            "/api/v1/admin/log-level",
            get(handlers::get_log_level).put(handlers::set_log_level),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
