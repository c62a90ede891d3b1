//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `devices` - Ring discovery for onboarding
//! - `session` - Session lifecycle: connect, disconnect, status, SSE events
//! - `metrics` - Latest metric values and manual refresh
//! - `readings` - Persisted aggregate snapshots
//! - `config` - Tracked ring and sampling configuration
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod config;
pub mod devices;
pub mod error;
pub mod health;
pub mod metrics;
pub mod openapi;
pub mod readings;
pub mod session;

// Re-export commonly used types
#[allow(unused_imports)]
pub use error::{ApiError, ApiResult, ErrorResponse};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                      - Health check
/// /docs                        - Swagger UI
/// /api
/// ├── /devices                 - Ring discovery scan
/// ├── /session                 - Session status
/// │   ├── /connect             - Connect intent
/// │   ├── /disconnect          - Disconnect intent
/// │   └── /events              - SSE notification stream
/// ├── /metrics                 - Latest values
/// │   └── /{kind}/refresh      - Manual refresh
/// ├── /readings                - Stored snapshot query
/// ├── /config                  - Configuration view and device update
/// └── /openapi.json            - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                // Ring discovery at /api/devices
                .route("/devices", get(devices::scan_devices))
                // Session lifecycle
                .route("/session", get(session::get_session))
                .route("/session/connect", post(session::connect))
                .route("/session/disconnect", post(session::disconnect))
                .route("/session/events", get(session::session_events))
                // Metric values
                .route("/metrics", get(metrics::get_metrics))
                .route("/metrics/{kind}/refresh", post(metrics::refresh_metric))
                // Stored readings
                .route("/readings", get(readings::get_readings))
                // OpenAPI spec at /api/openapi.json
                .route("/openapi.json", get(openapi::get_openapi_spec))
                // Configuration management
                .nest("/config", config::router()),
        )
        // The UI serves its own copy of the spec; /api/openapi.json stays a
        // plain handler for non-browser clients.
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
