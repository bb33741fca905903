use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{assets, handlers, middleware::metrics_middleware, stages, status};
use crate::metrics::metrics_handler;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Ingestion and asset reads
        .route("/assets", post(assets::register_asset))
        .route("/assets/{id}", get(assets::get_asset))
        .route("/assets/{id}/metadata", get(assets::get_asset_metadata))
        // Stages
        .route("/thumbnail", post(stages::generate_thumbnail))
        .route("/process", post(stages::extract_metadata))
        .route("/transcode", post(stages::start_transcode))
        .route("/transcode/{id}", delete(stages::cancel_transcode))
        .route("/transcodes", get(stages::list_transcodes))
        // Registry status contract
        .route("/update-stream-status", post(status::update_stream_status))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
