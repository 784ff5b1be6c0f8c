//! REST host for the geo-analytics engines
//!
//! Validates dashboard query parameters, loads collaborator data per request
//! and serves the engine results as JSON.

pub mod handlers;
pub mod service;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use service::{AnalyticsService, DataSource};

/// Build the REST router over a shared service.
pub fn router(service: Arc<AnalyticsService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/stats", get(handlers::get_stats))
        .route("/api/v1/clusters", get(handlers::get_clusters))
        .route("/api/v1/forecast", get(handlers::get_forecast))
        .route("/api/v1/coverage", get(handlers::get_coverage))
        .route("/api/v1/dashboard", get(handlers::get_dashboard))
        .with_state(service)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
