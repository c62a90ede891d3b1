//! Stored readings API endpoint.
//!
//! The read path for persisted snapshots. The core never reads these back
//! itself; this endpoint exists for the UI's history views.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use ringd_core::SnapshotStore;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Query parameters for the readings endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ReadingsQuery {
    /// Earliest timestamp to include (RFC 3339). Defaults to the beginning
    /// of time.
    pub from: Option<String>,
}

/// One stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "timestamp_utc": "2025-01-15T03:30:00Z",
    "heart_rate": 72,
    "steps": 10432,
    "blood_oxygen": null
}))]
pub struct ReadingResponse {
    /// When the snapshot was taken.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub timestamp_utc: String,

    /// Heart rate in bpm, if observed in the window.
    #[schema(example = 72)]
    pub heart_rate: Option<u32>,

    /// Step count, if observed in the window.
    #[schema(example = 10_432)]
    pub steps: Option<u32>,

    /// Blood oxygen in percent, if observed in the window.
    #[schema(nullable)]
    pub blood_oxygen: Option<u32>,
}

/// Stored readings response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReadingsResponse {
    /// Matching snapshots, ascending by timestamp.
    pub readings: Vec<ReadingResponse>,

    /// The effective lower bound of the query.
    #[schema(example = "2025-01-15T00:00:00Z")]
    pub from_utc: String,
}

/// Query stored readings from a timestamp.
#[utoipa::path(
    get,
    path = "/readings",
    tag = "readings",
    operation_id = "getReadings",
    summary = "Query stored readings",
    description = "Returns persisted aggregate snapshots with timestamps at or \
        after `from`, ascending. Each snapshot holds the most recent reading \
        per metric observed in its flush window; metrics the ring did not \
        answer for are null.",
    params(ReadingsQuery),
    responses(
        (status = 200, description = "Stored readings", body = ReadingsResponse),
        (status = 400, description = "Malformed `from` timestamp")
    )
)]
pub async fn get_readings(
    State(state): State<SharedState>,
    Query(query): Query<ReadingsQuery>,
) -> ApiResult<Json<ReadingsResponse>> {
    let from: DateTime<Utc> = match &query.from {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|err| ApiError::BadRequest {
                error_code: "invalid_timestamp".to_string(),
                message: format!("'{raw}' is not an RFC 3339 timestamp: {err}"),
            })?
            .with_timezone(&Utc),
        None => Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now),
    };

    let snapshots = state.storage.query_from(from)?;

    Ok(Json(ReadingsResponse {
        readings: snapshots
            .into_iter()
            .map(|snapshot| ReadingResponse {
                timestamp_utc: snapshot.timestamp.to_rfc3339(),
                heart_rate: snapshot.heart_rate,
                steps: snapshot.steps,
                blood_oxygen: snapshot.blood_oxygen,
            })
            .collect(),
        from_utc: from.to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_response_serialization() {
        let response = ReadingResponse {
            timestamp_utc: "2025-01-15T03:30:00Z".to_string(),
            heart_rate: Some(72),
            steps: None,
            blood_oxygen: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"heart_rate\":72"));
        assert!(json.contains("\"steps\":null"));
    }

    #[test]
    fn test_from_parameter_parses_rfc3339() {
        assert!(DateTime::parse_from_rfc3339("2025-01-15T00:00:00Z").is_ok());
        assert!(DateTime::parse_from_rfc3339("yesterday").is_err());
    }
}
