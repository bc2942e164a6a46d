//! Amazon Buy Box Scanner
//!
//! This library provides the core of the buybox-scanner service: a
//! rate-limited batch scanner that polls the Selling-Partner API for
//! competitive pricing, tracks each scan as a job in PostgreSQL, and exposes
//! start/status/cancel endpoints over HTTP.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod scanner;
pub mod services;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use app_state::AppState;

/// Build the HTTP router with all API routes and middleware.
pub fn build_router(state: AppState, prometheus: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/buybox/start", post(routes::scan::start_scan))
        .route("/api/v1/buybox/jobs", get(routes::scan::list_jobs))
        .route(
            "/api/v1/buybox/status/{job_id}",
            get(routes::scan::get_job_status),
        )
        .route(
            "/api/v1/buybox/{job_id}/cancel",
            post(routes::scan::cancel_scan),
        )
        .route(
            "/api/v1/buybox/{job_id}/failures",
            get(routes::scan::list_failures),
        )
        .route(
            "/api/v1/buybox/{job_id}/results",
            get(routes::scan::list_results),
        )
        .route("/api/v1/buybox/asin/{asin}", get(routes::scan::lookup_asin))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // custom ASIN lists stay well under 1 MB
}
