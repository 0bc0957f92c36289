//! REST API handlers

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use fusiond_core::{DeviceRecord, IngestError, SensorFusionFrame, SequenceStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new("Device not found")),
    )
        .into_response()
}

/// Accept one frame from a producer
///
/// Unparseable bodies are a transport error (400, no acknowledgement). Every
/// parseable frame gets an acknowledgement: 200 when accepted, 422 when it
/// failed validation, 409 when the sequencer refused it.
pub async fn ingest_frame(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SensorFusionFrame>, JsonRejection>,
) -> Response {
    let Json(frame) = match payload {
        Ok(frame) => frame,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Malformed frame");
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(format!(
                    "Malformed frame: {}",
                    rejection.body_text()
                ))),
            )
                .into_response();
        }
    };

    let (ack, err) = state.ingest(frame).await;
    let status = match err {
        None => StatusCode::OK,
        Some(IngestError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(IngestError::Sequence(_)) => StatusCode::CONFLICT,
    };
    (status, Json(ack)).into_response()
}

/// Device list filter
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// Only devices with a frame accepted within this many milliseconds
    pub active_within_ms: Option<u64>,
}

/// List tracked devices, optionally only the recently active ones
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let ids = match params.active_within_ms {
        Some(ms) => {
            state
                .store
                .list_active(Utc::now(), Duration::from_millis(ms))
                .await
        }
        None => state.store.list_devices().await,
    };
    Json(ids)
}

/// Device record as served to query consumers
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub device_id: String,
    pub last_sequence_id: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub history_len: usize,
    pub stats: SequenceStats,
    pub latest_frame: Arc<SensorFusionFrame>,
}

impl From<DeviceRecord> for DeviceView {
    fn from(record: DeviceRecord) -> Self {
        Self {
            history_len: record.recent_history.len(),
            device_id: record.device_id,
            last_sequence_id: record.last_sequence_id,
            first_seen_at: record.first_seen_at,
            last_seen_at: record.last_seen_at,
            stats: record.stats,
            latest_frame: record.latest_frame,
        }
    }
}

/// Latest state for a device
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get(&id).await {
        Some(record) => Json(DeviceView::from(record)).into_response(),
        None => not_found(),
    }
}

/// Recent frames for a device, oldest first
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.history(&id).await {
        Some(frames) => Json(frames).into_response(),
        None => not_found(),
    }
}

/// Remove a device from the store
pub async fn remove_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    info!(device = %id, "Remove device requested");

    if state.remove_device(&id).await {
        Json(serde_json::json!({
            "status": "removed",
            "deviceId": id
        }))
        .into_response()
    } else {
        not_found()
    }
}

/// Get current configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.clone())
}

/// Liveness probe
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = Utc::now() - state.started_at;
    Json(serde_json::json!({
        "status": "ok",
        "devices": state.store.len().await,
        "uptimeSecs": uptime.num_seconds(),
    }))
}
