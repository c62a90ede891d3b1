//! Configuration API endpoints.
//!
//! Lets the UI inspect the active configuration and change which ring is
//! tracked. Sampling intervals are file/environment configuration only; a
//! cadence change requires a restart.

use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use ringd_core::is_valid_address;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Configured device view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "name": "QRing R3"
}))]
pub struct DeviceConfigResponse {
    /// Configured ring address, if any.
    pub address: Option<String>,
    /// Configured ring name, if any.
    pub name: Option<String>,
}

/// Sampling cadence view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "poll_interval_secs": 30,
    "flush_interval_secs": 300,
    "request_timeout_secs": 5,
    "connect_timeout_secs": 20
}))]
pub struct SamplingConfigResponse {
    /// Seconds between polls of each tracked metric.
    pub poll_interval_secs: u64,
    /// Seconds between flushes to storage.
    pub flush_interval_secs: u64,
    /// Deadline in seconds for a single metric request.
    pub request_timeout_secs: u64,
    /// Deadline in seconds for a connect attempt.
    pub connect_timeout_secs: u64,
}

/// Full configuration response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigResponse {
    /// The ring being tracked.
    pub device: DeviceConfigResponse,
    /// Sampling cadence.
    pub sampling: SamplingConfigResponse,
}

/// Update-device request body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "name": "QRing R3"
}))]
pub struct UpdateDeviceRequest {
    /// Ring address to track.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,
    /// Display name, as discovered.
    #[schema(example = "QRing R3")]
    pub name: Option<String>,
}

/// Creates the config router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_config))
        .route("/device", put(update_device))
}

/// Get the active configuration.
#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get active configuration",
    responses(
        (status = 200, description = "Active configuration", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let config = state.config.read().await;
    Json(ConfigResponse {
        device: DeviceConfigResponse {
            address: config.device.address.clone(),
            name: config.device.name.clone(),
        },
        sampling: SamplingConfigResponse {
            poll_interval_secs: config.sampling.poll_interval_secs,
            flush_interval_secs: config.sampling.flush_interval_secs,
            request_timeout_secs: config.sampling.request_timeout_secs,
            connect_timeout_secs: config.sampling.connect_timeout_secs,
        },
    })
}

/// Set the tracked ring.
#[utoipa::path(
    put,
    path = "/config/device",
    tag = "config",
    operation_id = "updateDevice",
    summary = "Set the tracked ring",
    description = "Stores the ring address (and optional name) that connect \
        intents without an explicit address will use.",
    request_body = UpdateDeviceRequest,
    responses(
        (status = 200, description = "Device updated", body = DeviceConfigResponse),
        (status = 400, description = "Invalid device address")
    )
)]
pub async fn update_device(
    State(state): State<SharedState>,
    Json(request): Json<UpdateDeviceRequest>,
) -> ApiResult<Json<DeviceConfigResponse>> {
    if !is_valid_address(&request.address) {
        return Err(ApiError::BadRequest {
            error_code: "invalid_device_address".to_string(),
            message: format!("'{}' is not a Bluetooth MAC address", request.address),
        });
    }

    let mut config = state.config.write().await;
    config.device.address = Some(request.address.clone());
    config.device.name = request.name.clone();

    if let Err(err) = config.save() {
        // The in-memory update stands; losing it on restart beats
        // rejecting the intent.
        warn!(%err, "failed to persist configuration");
    }

    Ok(Json(DeviceConfigResponse {
        address: config.device.address.clone(),
        name: config.device.name.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_response_serialization() {
        let response = ConfigResponse {
            device: DeviceConfigResponse {
                address: Some("AA:BB:CC:DD:EE:FF".to_string()),
                name: None,
            },
            sampling: SamplingConfigResponse {
                poll_interval_secs: 30,
                flush_interval_secs: 300,
                request_timeout_secs: 5,
                connect_timeout_secs: 20,
            },
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("AA:BB:CC:DD:EE:FF"));
        assert!(json.contains("\"poll_interval_secs\":30"));
    }

    #[test]
    fn test_update_request_deserialization() {
        let request: UpdateDeviceRequest =
            serde_json::from_str(r#"{"address": "AA:BB:CC:DD:EE:FF"}"#).unwrap();
        assert_eq!(request.address, "AA:BB:CC:DD:EE:FF");
        assert!(request.name.is_none());
    }
}
