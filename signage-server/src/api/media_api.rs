use crate::error::{ApiResult, ServiceError};
use crate::models::Media;
use crate::schedule::{RuleScope, ScheduleRequest, ScheduleTemplate};
use crate::services::assignment_service::{self, DeletedMedia};
use crate::services::media_service::{
    self, AssignmentTarget, MediaDetail, MediaSummary, UploadRequest, UploadScheduling,
};
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;

/// JSON carried in the `scheduling` form field of an upload.
#[derive(Debug, Default, Deserialize)]
pub struct UploadSchedulingForm {
    pub device_assignment: Option<String>,
    /// Seconds; fractional lengths are rounded up.
    pub video_duration: Option<f64>,
    #[serde(flatten)]
    pub schedule: ScheduleRequest,
}

fn multipart_error(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::validation(format!("invalid upload body: {}", e))
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut form = UploadSchedulingForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or("") {
            "file" => {
                let name = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((name, bytes.to_vec()));
            }
            "scheduling" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    form = serde_json::from_str(&text).map_err(|e| {
                        ServiceError::validation(format!("invalid scheduling data: {}", e))
                    })?;
                }
            }
            other => tracing::debug!("Ignoring upload field {:?}", other),
        }
    }

    let (original_name, bytes) =
        file.ok_or_else(|| ServiceError::validation("no file selected"))?;

    let mut schedule = form.schedule;
    if schedule.display_duration.is_none() {
        schedule.display_duration = Some(state.config.playlist.default_display_duration);
    }
    let scheduling = form
        .device_assignment
        .as_deref()
        .and_then(AssignmentTarget::parse)
        .map(|target| UploadScheduling { target, schedule });

    let request = UploadRequest {
        original_name,
        bytes,
        origin: super::client_address(&headers, connect_info.as_ref()),
        video_duration: form.video_duration.map(|d| d.ceil() as i32),
        scheduling,
    };

    let outcome = media_service::upload(&state.store, state.files.as_ref(), request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": "File uploaded and scheduled successfully",
            "media": outcome.media,
            "assignments_created": outcome.assignments_created,
        })),
    ))
}

pub async fn list_media(State(state): State<AppState>) -> ApiResult<Json<Vec<MediaSummary>>> {
    Ok(Json(media_service::list(&state.store)?))
}

pub async fn list_media_detailed(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<MediaDetail>>> {
    Ok(Json(media_service::list_detailed(&state.store)?))
}

pub async fn get_media(
    State(state): State<AppState>,
    Path(media_id): Path<i32>,
) -> ApiResult<Json<Media>> {
    Ok(Json(media_service::get(&state.store, media_id)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    /// Restricts the update to one device; every device otherwise.
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub schedule: ScheduleRequest,
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(media_id): Path<i32>,
    Json(req): Json<UpdateScheduleRequest>,
) -> ApiResult<Json<Value>> {
    let mut schedule = req.schedule;
    if schedule.display_duration.is_none() {
        schedule.display_duration = Some(state.config.playlist.default_display_duration);
    }
    let template = ScheduleTemplate::from_request(&schedule)?;
    let scope = RuleScope::from_device(req.device_id);

    let updated = assignment_service::update_schedule(&state.store, media_id, &template, &scope)?;

    Ok(Json(json!({
        "success": "Schedule updated successfully",
        "updated": updated,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub device_id: Option<String>,
}

fn default_active() -> bool {
    true
}

pub async fn toggle_media(
    State(state): State<AppState>,
    Path(media_id): Path<i32>,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<Json<Value>> {
    let scope = RuleScope::from_device(req.device_id);
    let changed = assignment_service::toggle(&state.store, media_id, req.is_active, &scope)?;

    Ok(Json(json!({
        "success": "Media status updated",
        "changed": changed,
    })))
}

pub async fn delete_media(
    State(state): State<AppState>,
    Path(media_id): Path<i32>,
) -> ApiResult<Json<DeletedMedia>> {
    let deleted =
        assignment_service::delete_media(&state.store, state.files.as_ref(), media_id).await?;
    Ok(Json(deleted))
}
