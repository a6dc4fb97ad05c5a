use crate::error::{ApiResult, ServiceError};
use crate::models::Device;
use crate::services::assignment_service::{self, DeviceContentItem};
use crate::services::device_registry::{self, DeviceMetaUpdate, DeviceSummary};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub device_id: Option<String>,
    pub media_id: Option<i32>,
    pub display_duration: Option<i32>,
}

pub async fn assign_content(
    State(state): State<AppState>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (device_id, media_id) = match (req.device_id, req.media_id) {
        (Some(device_id), Some(media_id)) if !device_id.trim().is_empty() => {
            (device_id, media_id)
        }
        _ => {
            return Err(ServiceError::validation("Device ID and Media ID required").into());
        }
    };
    let duration = req
        .display_duration
        .or(Some(state.config.playlist.default_display_duration));

    let rule_id = assignment_service::assign(&state.store, &device_id, media_id, duration)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": "Content assigned successfully",
            "assignment_id": rule_id,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AssignAllRequest {
    pub media_id: Option<i32>,
    pub display_duration: Option<i32>,
}

pub async fn assign_all_devices(
    State(state): State<AppState>,
    Json(req): Json<AssignAllRequest>,
) -> ApiResult<Json<Value>> {
    let media_id = req
        .media_id
        .ok_or_else(|| ServiceError::validation("Media ID required"))?;
    let duration = req
        .display_duration
        .or(Some(state.config.playlist.default_display_duration));

    let created = assignment_service::assign_to_all(&state.store, media_id, duration)?;

    Ok(Json(json!({
        "success": format!("Content assigned to {} devices", created),
        "assigned_count": created,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateContentRequest {
    pub display_duration: Option<i32>,
}

pub async fn update_device_content(
    State(state): State<AppState>,
    Path(rule_id): Path<i32>,
    Json(req): Json<UpdateContentRequest>,
) -> ApiResult<Json<Value>> {
    let seconds = req
        .display_duration
        .ok_or_else(|| ServiceError::validation("display_duration required"))?;

    let stored = assignment_service::update_rule_duration(&state.store, rule_id, seconds)?;

    Ok(Json(json!({
        "success": "Content updated successfully",
        "display_duration": stored,
    })))
}

pub async fn remove_content(
    State(state): State<AppState>,
    Path(rule_id): Path<i32>,
) -> ApiResult<Json<Value>> {
    assignment_service::remove(&state.store, rule_id)?;
    Ok(Json(json!({ "success": "Content assignment removed" })))
}

#[derive(Debug, Deserialize)]
pub struct OrderItem {
    pub assignment_id: i32,
    pub play_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub device_id: Option<String>,
    #[serde(default)]
    pub content_order: Vec<OrderItem>,
}

pub async fn reorder_content(
    State(state): State<AppState>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<Json<Value>> {
    let device_id = req
        .device_id
        .ok_or_else(|| ServiceError::validation("device_id required"))?;
    let orders: Vec<(i32, i32)> = req
        .content_order
        .iter()
        .map(|item| (item.assignment_id, item.play_order))
        .collect();

    let reordered = assignment_service::reorder(&state.store, &device_id, &orders)?;

    Ok(Json(json!({
        "success": "Content reordered successfully",
        "reordered": reordered,
    })))
}

pub async fn list_devices(State(state): State<AppState>) -> ApiResult<Json<Vec<DeviceSummary>>> {
    Ok(Json(device_registry::list_devices(&state.store)?))
}

pub async fn get_device_content(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Vec<DeviceContentItem>>> {
    Ok(Json(assignment_service::list_device_content(
        &state.store,
        &device_id,
        state.config.playlist.default_display_duration,
    )?))
}

pub async fn update_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(update): Json<DeviceMetaUpdate>,
) -> ApiResult<Json<Device>> {
    Ok(Json(device_registry::update_meta(
        &state.store,
        &device_id,
        update,
    )?))
}
