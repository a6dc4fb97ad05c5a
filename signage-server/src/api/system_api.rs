use crate::error::ApiResult;
use crate::services::{device_registry, media_service};
use crate::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LastUpdate {
    pub version: u64,
    pub last_update: DateTime<Utc>,
    pub server_time: DateTime<Utc>,
}

/// Cheap staleness check for pollers; never touches the database.
pub async fn last_update(State(state): State<AppState>) -> Json<LastUpdate> {
    let version = state.store.version();
    Json(LastUpdate {
        version: version.current(),
        last_update: version.changed_at(),
        server_time: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub server_url: String,
    pub status: &'static str,
    pub active_devices: i64,
    pub total_media: i64,
    pub storage_used_mb: f64,
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<SystemStatus>> {
    let active_devices = device_registry::count_active(&state.store)?;
    let total_media = media_service::count(&state.store)?;
    let used_bytes = state
        .files
        .total_size()
        .await
        .map_err(crate::error::ServiceError::from)?;

    Ok(Json(SystemStatus {
        server_url: state.base_url.to_string(),
        status: "running",
        active_devices,
        total_media,
        storage_used_mb: (used_bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0,
    }))
}
