use crate::error::ApiResult;
use crate::models::NewPlaybackEvent;
use crate::services::analytics_service;
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

pub async fn record_playback(
    State(state): State<AppState>,
    Json(event): Json<NewPlaybackEvent>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let id = analytics_service::record_playback(&state.store, event)?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}
