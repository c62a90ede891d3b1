//! Metric API endpoints: latest values and manual refresh.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::Json;
use ringd_core::MetricKind;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::session::MetricValue;
use crate::state::SharedState;

/// Latest known values response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "metrics": [
        { "kind": "heart_rate", "value": 72, "observed_at_utc": "2025-01-15T03:30:00Z" }
    ]
}))]
pub struct MetricsResponse {
    /// Latest known value per metric kind; kinds never observed are absent.
    pub metrics: Vec<MetricValue>,
}

/// Get the latest known value per metric.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    operation_id = "getMetrics",
    summary = "Latest known metric values",
    description = "Returns the most recent value observed for each metric kind \
        in the current session. Values update as the sampling scheduler polls \
        the ring.",
    responses(
        (status = 200, description = "Latest values", body = MetricsResponse)
    )
)]
pub async fn get_metrics(State(state): State<SharedState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        metrics: state
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

/// Refresh one metric right now.
///
/// Reuses the same request path as the sampling scheduler; a refresh issued
/// while the scheduler's poll for the same metric is outstanding coalesces
/// with it instead of sending another frame.
#[utoipa::path(
    post,
    path = "/metrics/{kind}/refresh",
    tag = "metrics",
    operation_id = "refreshMetric",
    summary = "Poll one metric immediately",
    description = "Requests a fresh reading of the given metric kind \
        (`heart_rate`, `steps`, or `blood_oxygen`) from the ring and returns \
        the decoded value.",
    params(
        ("kind" = String, Path, description = "Metric kind to refresh")
    ),
    responses(
        (status = 200, description = "Fresh reading", body = MetricValue),
        (status = 400, description = "Unknown metric kind"),
        (status = 409, description = "Not connected to a ring"),
        (status = 502, description = "Link lost mid-request"),
        (status = 504, description = "The ring did not answer in time")
    )
)]
pub async fn refresh_metric(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<MetricValue>> {
    let kind = MetricKind::from_str(&kind).map_err(|message| ApiError::BadRequest {
        error_code: "unknown_metric_kind".to_string(),
        message,
    })?;

    let sample = state.session.request_metric(kind).await?;

    Ok(Json(MetricValue {
        kind: sample.kind.to_string(),
        value: sample.value,
        observed_at_utc: sample.observed_at.to_rfc3339(),
    }))
}
