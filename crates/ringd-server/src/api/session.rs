//! Session API endpoints: connect/disconnect intents, status, and the
//! notification stream.
//!
//! These handlers are the UI-facing surface of the session state machine.
//! Intents are idempotent: connecting while already connected or
//! disconnecting while disconnected are no-ops that report the current
//! state.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use ringd_core::{is_valid_address, DeviceIdentity, SessionEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Latest known value for one metric.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MetricValue {
    /// Metric kind (`heart_rate`, `steps`, `blood_oxygen`).
    #[schema(example = "heart_rate")]
    pub kind: String,

    /// The most recent decoded value.
    #[schema(example = 72)]
    pub value: u32,

    /// When the value was observed (UTC, RFC 3339).
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub observed_at_utc: String,
}

/// Session status response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "link_state": "connected",
    "device_address": "AA:BB:CC:DD:EE:FF",
    "latest": [
        { "kind": "heart_rate", "value": 72, "observed_at_utc": "2025-01-15T03:30:00Z" }
    ]
}))]
pub struct SessionStatusResponse {
    /// Current link state.
    #[schema(example = "connected")]
    pub link_state: String,

    /// Address of the ring this session targets, if any.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub device_address: Option<String>,

    /// Latest known value per metric kind.
    pub latest: Vec<MetricValue>,
}

/// Connect request body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "address": "AA:BB:CC:DD:EE:FF" }))]
pub struct ConnectRequest {
    /// Ring to connect to. Falls back to the configured address when
    /// omitted.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: Option<String>,
}

/// Connect/disconnect response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "link_state": "connected" }))]
pub struct SessionIntentResponse {
    /// Link state after the intent completed.
    #[schema(example = "connected")]
    pub link_state: String,
}

/// Get session status.
#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    operation_id = "getSession",
    summary = "Get session status",
    description = "Returns the current link state, the targeted ring, and the \
        latest known value per metric.",
    responses(
        (status = 200, description = "Session status", body = SessionStatusResponse)
    )
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<SessionStatusResponse> {
    Json(SessionStatusResponse {
        link_state: state.session.state().to_string(),
        device_address: state.session.device().map(|d| d.address().to_string()),
        latest: state
            .session
            .latest()
            .into_iter()
            .map(|sample| MetricValue {
                kind: sample.kind.to_string(),
                value: sample.value,
                observed_at_utc: sample.observed_at.to_rfc3339(),
            })
            .collect(),
    })
}

/// Connect to a ring.
///
/// Idempotent: a connect intent while already connecting or connected is a
/// no-op reporting the current state.
#[utoipa::path(
    post,
    path = "/session/connect",
    tag = "session",
    operation_id = "connectSession",
    summary = "Connect to a ring",
    description = "Starts a connection to the given ring (or the configured one \
        when the body omits an address) and waits until the link is up. While \
        connected, the ring is polled periodically and readings are logged.",
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "Connected", body = SessionIntentResponse),
        (status = 400, description = "Invalid or missing device address"),
        (status = 502, description = "The ring refused or dropped the connection"),
        (status = 503, description = "Bluetooth service unavailable")
    )
)]
pub async fn connect(
    State(state): State<SharedState>,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<Json<SessionIntentResponse>> {
    let address = match request.address {
        Some(address) => address,
        None => state.config.read().await.device.address.clone().ok_or_else(|| {
            ApiError::BadRequest {
                error_code: "device_not_configured".to_string(),
                message: "No address given and no ring has been configured".to_string(),
            }
        })?,
    };
    if !is_valid_address(&address) {
        return Err(ApiError::BadRequest {
            error_code: "invalid_device_address".to_string(),
            message: format!("'{address}' is not a Bluetooth MAC address"),
        });
    }

    state.session.connect(DeviceIdentity::new(address)).await?;

    Ok(Json(SessionIntentResponse {
        link_state: state.session.state().to_string(),
    }))
}

/// Disconnect from the ring.
#[utoipa::path(
    post,
    path = "/session/disconnect",
    tag = "session",
    operation_id = "disconnectSession",
    summary = "Disconnect from the ring",
    description = "Tears down the connection. Sampling stops; in-flight metric \
        requests resolve as link-lost. A disconnect intent while not connected \
        is a no-op.",
    responses(
        (status = 200, description = "Disconnected", body = SessionIntentResponse)
    )
)]
pub async fn disconnect(State(state): State<SharedState>) -> ApiResult<Json<SessionIntentResponse>> {
    state.session.disconnect().await?;

    Ok(Json(SessionIntentResponse {
        link_state: state.session.state().to_string(),
    }))
}

/// Stream session notifications as server-sent events.
///
/// Emits state changes, per-metric value updates, stored-snapshot
/// confirmations, and failures, each as one SSE event whose name is the
/// notification type.
#[utoipa::path(
    get,
    path = "/session/events",
    tag = "session",
    operation_id = "sessionEvents",
    summary = "Stream session notifications (SSE)",
    description = "Server-sent event stream of session notifications: \
        `state_changed`, `connect_failed`, `metric_updated`, \
        `snapshot_stored`, and `store_failed`.",
    responses(
        (status = 200, description = "SSE stream of session notifications")
    )
)]
pub async fn session_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.session.subscribe();
    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event_name(&event))
                        .json_data(&event)
                        .unwrap_or_default();
                    return Some((Ok::<_, Infallible>(sse), receiver));
                }
                // A lagged UI just misses old notifications; keep streaming.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::StateChanged { .. } => "state_changed",
        SessionEvent::ConnectFailed { .. } => "connect_failed",
        SessionEvent::MetricUpdated { .. } => "metric_updated",
        SessionEvent::SnapshotStored { .. } => "snapshot_stored",
        SessionEvent::StoreFailed { .. } => "store_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_serialization() {
        let response = SessionStatusResponse {
            link_state: "connected".to_string(),
            device_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            latest: vec![MetricValue {
                kind: "heart_rate".to_string(),
                value: 72,
                observed_at_utc: "2025-01-15T03:30:00Z".to_string(),
            }],
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"link_state\":\"connected\""));
        assert!(json.contains("heart_rate"));
    }

    #[test]
    fn test_connect_request_allows_missing_address() {
        let request: ConnectRequest = serde_json::from_str("{}").unwrap();
        assert!(request.address.is_none());
    }

    #[test]
    fn test_event_names() {
        let event = SessionEvent::StateChanged {
            state: ringd_core::LinkState::Connected,
        };
        assert_eq!(event_name(&event), "state_changed");
    }
}
