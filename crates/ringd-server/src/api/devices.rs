//! Device discovery API endpoints.
//!
//! Discovery is an opaque producer of candidate device addresses; the UI
//! uses it during onboarding to let the user pick their ring.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Default scan duration in seconds.
const DEFAULT_SCAN_DURATION_SECS: u64 = 10;

/// A discovered ring.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "name": "QRing R3",
    "rssi_dbm": -45
}))]
pub struct DiscoveredDevice {
    /// Bluetooth MAC address.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// Device name (if broadcast).
    #[schema(example = "QRing R3")]
    pub name: Option<String>,

    /// Signal strength in dBm.
    #[schema(example = -45)]
    pub rssi_dbm: Option<i16>,
}

/// Device scan response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "devices": [
        {
            "address": "AA:BB:CC:DD:EE:FF",
            "name": "QRing R3",
            "rssi_dbm": -45
        }
    ],
    "scan_duration_secs": 10,
    "scanned_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct ScanDevicesResponse {
    /// List of discovered devices.
    pub devices: Vec<DiscoveredDevice>,

    /// How long the scan took.
    #[schema(example = 10)]
    pub scan_duration_secs: u64,

    /// When the scan completed.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub scanned_at_utc: String,
}

/// Scan for nearby rings.
///
/// Performs a brief Bluetooth scan and returns all discovered devices.
/// Used during onboarding to help users select their ring.
#[utoipa::path(
    get,
    path = "/devices",
    tag = "devices",
    operation_id = "scanDevices",
    summary = "Scan for nearby rings",
    description = "Performs a Bluetooth scan and returns all discovered devices. \
        Use this during onboarding to find the user's ring, then configure its \
        address or pass it directly to the connect endpoint.",
    responses(
        (status = 200, description = "Scan completed", body = ScanDevicesResponse),
        (status = 503, description = "Bluetooth service unavailable")
    )
)]
pub async fn scan_devices(State(_state): State<SharedState>) -> ApiResult<Json<ScanDevicesResponse>> {
    #[cfg(feature = "bluetooth")]
    {
        let scan_duration = std::time::Duration::from_secs(DEFAULT_SCAN_DURATION_SECS);
        let discovered = ringd_core::discover(scan_duration).await?;

        let devices: Vec<DiscoveredDevice> = discovered
            .into_iter()
            .map(|ring| DiscoveredDevice {
                address: ring.address,
                name: ring.name,
                rssi_dbm: ring.rssi,
            })
            .collect();

        Ok(Json(ScanDevicesResponse {
            devices,
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
            scanned_at_utc: Utc::now().to_rfc3339(),
        }))
    }

    #[cfg(not(feature = "bluetooth"))]
    {
        Err(crate::api::error::ApiError::ServiceUnavailable {
            error_code: "bluetooth_unavailable".to_string(),
            message: "This build has no Bluetooth support".to_string(),
            details: None,
        })
    }
}
