//! OpenAPI specification generation for the ringd API.
//!
//! Descriptions are written to be understood by both human developers and
//! automated clients.

use axum::Json;
use utoipa::OpenApi;

use super::config::{
    ConfigResponse, DeviceConfigResponse, SamplingConfigResponse, UpdateDeviceRequest,
};
use super::devices::{DiscoveredDevice, ScanDevicesResponse};
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::metrics::MetricsResponse;
use super::readings::{ReadingResponse, ReadingsResponse};
use super::session::{ConnectRequest, MetricValue, SessionIntentResponse, SessionStatusResponse};

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json` and returns the
/// complete OpenAPI 3.0 specification for the ringd API.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Main OpenAPI document structure for ringd.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ringd API",
        version = "0.1.0",
        description = r#"
# ringd API

ringd pairs with a BLE smart ring, polls it for biometric readings
(heart rate, steps, blood oxygen), and logs aggregated snapshots.

## Overview

1. **Discovery**: scan for nearby rings and pick one
2. **Session**: connect to the ring; while connected, every metric is
   polled periodically and readings are flushed to storage
3. **Readings**: query the persisted history by timestamp

## Typical flow

- `GET /api/devices` to find the ring, then `PUT /api/config/device`
- `POST /api/session/connect` and watch `GET /api/session/events` (SSE)
- `GET /api/readings?from=...` for history; `POST /api/metrics/{kind}/refresh`
  for an immediate reading
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local ringd server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks and system status"
        ),
        (
            name = "devices",
            description = "Ring discovery for onboarding"
        ),
        (
            name = "session",
            description = "Device session lifecycle: connect, disconnect, status, notifications"
        ),
        (
            name = "metrics",
            description = "Latest metric values and manual refresh"
        ),
        (
            name = "readings",
            description = "Persisted aggregate snapshots"
        ),
        (
            name = "config",
            description = "Tracked ring and sampling configuration"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Device endpoints
        super::devices::scan_devices,
        // Session endpoints
        super::session::get_session,
        super::session::connect,
        super::session::disconnect,
        super::session::session_events,
        // Metric endpoints
        super::metrics::get_metrics,
        super::metrics::refresh_metric,
        // Reading endpoints
        super::readings::get_readings,
        // Config endpoints
        super::config::get_config,
        super::config::update_device,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Device types
            DiscoveredDevice,
            ScanDevicesResponse,
            // Session types
            SessionStatusResponse,
            ConnectRequest,
            SessionIntentResponse,
            MetricValue,
            // Metric types
            MetricsResponse,
            // Reading types
            ReadingResponse,
            ReadingsResponse,
            // Config types
            ConfigResponse,
            DeviceConfigResponse,
            SamplingConfigResponse,
            UpdateDeviceRequest,
        )
    )
)]
pub struct ApiDoc;
