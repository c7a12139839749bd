use super::handlers;
use super::state::ControlState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

pub fn create_router(state: ControlState) -> Router {
    let api_routes = Router::new()
        // Usage
        .route("/app-usage", get(handlers::app_usage))
        .route("/mock-app-usage", get(handlers::mock_app_usage))
        .route("/reset-app-usage", post(handlers::reset_app_usage))
        .route("/save-app-usage", post(handlers::save_app_usage))
        // Tracking control
        .route("/pause-tracking", post(handlers::pause_tracking))
        .route("/resume-tracking", post(handlers::resume_tracking))
        .route("/tracking-status", get(handlers::tracking_status))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api", api_routes)
        .route("/shutdown", post(handlers::shutdown))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
